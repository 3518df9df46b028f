use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults::{
    DEFAULT_DEBOUNCE_MS, DEFAULT_DELEGATION_ENABLED, DEFAULT_DELEGATION_TIMEOUT_MS,
    DEFAULT_INCLUDE_PROJECT_KEY_IN_GENERATED_PATH, DEFAULT_MAX_DELAY_MS,
    DEFAULT_UPDATE_BUFFERS_FOR_CLOSED_DOCUMENTS,
};

/// On-disk / over-the-wire settings. Every field is optional so layers can be
/// merged field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SettingsFile {
    pub delegation: Option<DelegationSection>,
    pub sync: Option<SyncSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DelegationSection {
    pub enabled: Option<bool>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SyncSection {
    pub debounce_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub update_buffers_for_closed_documents: Option<bool>,
    pub include_project_key_in_generated_path: Option<bool>,
}

/// Resolved settings used at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceSettings {
    pub delegation_enabled: bool,
    pub delegation_timeout: Duration,
    /// Quiet period before queued documents are regenerated.
    pub debounce: Duration,
    /// Upper bound on how long the oldest queued document can wait.
    pub max_delay: Duration,
    pub update_buffers_for_closed_documents: bool,
    pub include_project_key_in_generated_path: bool,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self::from(SettingsFile::default())
    }
}

impl From<SettingsFile> for WorkspaceSettings {
    fn from(file: SettingsFile) -> Self {
        let delegation = file.delegation.unwrap_or_default();
        let sync = file.sync.unwrap_or_default();

        let debounce = Duration::from_millis(sync.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS));
        let max_delay = Duration::from_millis(sync.max_delay_ms.unwrap_or(DEFAULT_MAX_DELAY_MS));

        Self {
            delegation_enabled: delegation.enabled.unwrap_or(DEFAULT_DELEGATION_ENABLED),
            delegation_timeout: Duration::from_millis(
                delegation
                    .timeout_ms
                    .unwrap_or(DEFAULT_DELEGATION_TIMEOUT_MS),
            ),
            debounce,
            // A cap below the quiet period would defeat debouncing entirely.
            max_delay: max_delay.max(debounce),
            update_buffers_for_closed_documents: sync
                .update_buffers_for_closed_documents
                .unwrap_or(DEFAULT_UPDATE_BUFFERS_FOR_CLOSED_DOCUMENTS),
            include_project_key_in_generated_path: sync
                .include_project_key_in_generated_path
                .unwrap_or(DEFAULT_INCLUDE_PROJECT_KEY_IN_GENERATED_PATH),
        }
    }
}

/// Merge two layers, preferring values from `primary` over `fallback`.
pub fn merge_settings(
    fallback: Option<SettingsFile>,
    primary: Option<SettingsFile>,
) -> Option<SettingsFile> {
    match (fallback, primary) {
        (None, None) => None,
        (Some(settings), None) | (None, Some(settings)) => Some(settings),
        (Some(fallback), Some(primary)) => Some(SettingsFile {
            delegation: merge_section(fallback.delegation, primary.delegation, |f, p| {
                DelegationSection {
                    enabled: p.enabled.or(f.enabled),
                    timeout_ms: p.timeout_ms.or(f.timeout_ms),
                }
            }),
            sync: merge_section(fallback.sync, primary.sync, |f, p| SyncSection {
                debounce_ms: p.debounce_ms.or(f.debounce_ms),
                max_delay_ms: p.max_delay_ms.or(f.max_delay_ms),
                update_buffers_for_closed_documents: p
                    .update_buffers_for_closed_documents
                    .or(f.update_buffers_for_closed_documents),
                include_project_key_in_generated_path: p
                    .include_project_key_in_generated_path
                    .or(f.include_project_key_in_generated_path),
            }),
        }),
    }
}

fn merge_section<T>(
    fallback: Option<T>,
    primary: Option<T>,
    merge: impl FnOnce(T, T) -> T,
) -> Option<T> {
    match (fallback, primary) {
        (Some(fallback), Some(primary)) => Some(merge(fallback, primary)),
        (fallback, primary) => primary.or(fallback),
    }
}

/// Merge layers in order; later layers take precedence.
pub fn merge_all(layers: &[Option<SettingsFile>]) -> Option<SettingsFile> {
    layers.iter().cloned().reduce(merge_settings).flatten()
}
