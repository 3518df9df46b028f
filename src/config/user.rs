//! User-wide configuration from the XDG config directory.
//!
//! Location: `$XDG_CONFIG_HOME/utsushi/utsushi.toml`, falling back to the
//! platform config directory.

use std::fs;
use std::path::PathBuf;

use super::settings::SettingsFile;
use crate::error::{UtsushiError, UtsushiResult};

pub const CONFIG_DIR_NAME: &str = "utsushi";
pub const CONFIG_FILE_NAME: &str = "utsushi.toml";

/// Path of the user configuration file, if a config directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME")
        && !xdg_config.is_empty()
    {
        return Some(
            PathBuf::from(xdg_config)
                .join(CONFIG_DIR_NAME)
                .join(CONFIG_FILE_NAME),
        );
    }

    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Load the user configuration.
///
/// A missing file is `Ok(None)`; unreadable or malformed files are errors.
pub fn load_user_config() -> UtsushiResult<Option<SettingsFile>> {
    let Some(path) = user_config_path() else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(&path)?;
    toml::from_str(&contents)
        .map(Some)
        .map_err(|err| UtsushiError::config(format!("{}: {}", path.display(), err)))
}
