//! Programmed defaults, the lowest-precedence settings layer.

use super::settings::{DelegationSection, SettingsFile, SyncSection};

pub const DEFAULT_DELEGATION_ENABLED: bool = true;
pub const DEFAULT_DELEGATION_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;
pub const DEFAULT_MAX_DELAY_MS: u64 = 1000;
pub const DEFAULT_UPDATE_BUFFERS_FOR_CLOSED_DOCUMENTS: bool = false;
pub const DEFAULT_INCLUDE_PROJECT_KEY_IN_GENERATED_PATH: bool = false;

/// Every field set to its default, so a merged result is always complete.
pub fn default_settings() -> SettingsFile {
    SettingsFile {
        delegation: Some(DelegationSection {
            enabled: Some(DEFAULT_DELEGATION_ENABLED),
            timeout_ms: Some(DEFAULT_DELEGATION_TIMEOUT_MS),
        }),
        sync: Some(SyncSection {
            debounce_ms: Some(DEFAULT_DEBOUNCE_MS),
            max_delay_ms: Some(DEFAULT_MAX_DELAY_MS),
            update_buffers_for_closed_documents: Some(
                DEFAULT_UPDATE_BUFFERS_FOR_CLOSED_DOCUMENTS,
            ),
            include_project_key_in_generated_path: Some(
                DEFAULT_INCLUDE_PROJECT_KEY_IN_GENERATED_PATH,
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkspaceSettings;

    #[test]
    fn explicit_defaults_match_implicit_defaults() {
        assert_eq!(
            WorkspaceSettings::from(default_settings()),
            WorkspaceSettings::default()
        );
    }
}
