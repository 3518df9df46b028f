//! Configuration: layered settings files, client overrides, and the runtime
//! settings snapshot.

pub mod defaults;
pub mod loader;
pub mod manager;
pub mod settings;
pub mod user;

pub use loader::{
    SettingsEvent, SettingsEventKind, SettingsLoadOutcome, SettingsSource, load_settings,
};
pub use manager::SettingsManager;
pub use settings::{
    DelegationSection, SettingsFile, SyncSection, WorkspaceSettings, merge_all, merge_settings,
};
