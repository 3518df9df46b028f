//! Lock-free access to the current settings and workspace layout.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;

use super::settings::WorkspaceSettings;
use crate::document::ProjectKey;

/// Holds the active [`WorkspaceSettings`] and the workspace folders that
/// determine each document's project.
///
/// Readers load a snapshot with [`SettingsManager::load_settings`]; updates
/// replace it atomically.
pub struct SettingsManager {
    settings: ArcSwap<WorkspaceSettings>,
    root_path: ArcSwap<Option<PathBuf>>,
    workspace_folders: ArcSwap<Vec<PathBuf>>,
}

impl std::fmt::Debug for SettingsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsManager")
            .field("settings", &self.settings.load())
            .field("root_path", &self.root_path.load())
            .field("workspace_folders", &self.workspace_folders.load())
            .finish()
    }
}

impl Default for SettingsManager {
    fn default() -> Self {
        Self::new(WorkspaceSettings::default())
    }
}

impl SettingsManager {
    pub fn new(settings: WorkspaceSettings) -> Self {
        Self {
            settings: ArcSwap::new(Arc::new(settings)),
            root_path: ArcSwap::new(Arc::new(None)),
            workspace_folders: ArcSwap::new(Arc::new(Vec::new())),
        }
    }

    pub fn load_settings(&self) -> Arc<WorkspaceSettings> {
        self.settings.load_full()
    }

    pub fn apply_settings(&self, settings: WorkspaceSettings) {
        self.settings.store(Arc::new(settings));
    }

    pub fn set_root_path(&self, path: Option<PathBuf>) {
        self.root_path.store(Arc::new(path));
    }

    pub fn root_path(&self) -> Arc<Option<PathBuf>> {
        self.root_path.load_full()
    }

    pub fn set_workspace_folders(&self, folders: Vec<PathBuf>) {
        self.workspace_folders.store(Arc::new(folders));
    }

    pub fn workspace_folders(&self) -> Arc<Vec<PathBuf>> {
        self.workspace_folders.load_full()
    }

    /// The project owning `file_path`: the innermost workspace folder
    /// containing it, or the miscellaneous project.
    pub fn project_for(&self, file_path: &Path) -> ProjectKey {
        self.workspace_folders
            .load()
            .iter()
            .filter(|folder| file_path.starts_with(folder))
            .max_by_key(|folder| folder.components().count())
            .map(|folder| ProjectKey::new(folder.to_string_lossy()))
            .unwrap_or_default()
    }
}
