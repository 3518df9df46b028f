//! Diff-and-notify publishing of generated documents to backend buffers.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::diff::minimal_text_changes;
use crate::document::{DocumentKey, ProjectKey, ProjectionKind, TextChange};

/// Wire payload keeping one backend buffer in sync.
///
/// `changes` must be applied in list order against the backend's current
/// text for the buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferUpdate {
    pub host_document_file_path: String,
    pub project_key_id: Option<String>,
    pub host_document_version: i32,
    pub changes: Vec<TextChange>,
    pub previous_was_empty: bool,
}

/// Receives buffer updates in publish order.
pub trait BufferUpdateSink: Send + Sync + 'static {
    fn publish(&self, kind: ProjectionKind, update: BufferUpdate);
}

/// What the backend was last told for one buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishedBufferState {
    pub last_published_text: String,
    pub last_published_version: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PublishKey {
    kind: ProjectionKind,
    project: Option<ProjectKey>,
    file_path: PathBuf,
}

/// Per-buffer publish state. Owned by the dispatch task.
#[derive(Debug, Default)]
pub struct GeneratedDocumentPublisher {
    states: HashMap<PublishKey, PublishedBufferState>,
    include_project_key_in_generated_path: bool,
}

impl GeneratedDocumentPublisher {
    pub fn new(include_project_key_in_generated_path: bool) -> Self {
        Self {
            states: HashMap::new(),
            include_project_key_in_generated_path,
        }
    }

    /// Applies to buffers first published after the change.
    pub fn set_include_project_key_in_generated_path(&mut self, include: bool) {
        self.include_project_key_in_generated_path = include;
    }

    fn publish_key(&self, kind: ProjectionKind, key: &DocumentKey) -> PublishKey {
        // The markup backend has no notion of projects.
        let scoped = kind == ProjectionKind::Code && self.include_project_key_in_generated_path;
        PublishKey {
            kind,
            project: scoped.then(|| key.project.clone()),
            file_path: key.file_path.clone(),
        }
    }

    /// Diff `text` against what was last published for this buffer.
    ///
    /// Returns None when neither the text nor the version changed, or when
    /// `version` is older than the last published one.
    pub fn publish(
        &mut self,
        kind: ProjectionKind,
        key: &DocumentKey,
        text: &str,
        version: i32,
    ) -> Option<BufferUpdate> {
        let publish_key = self.publish_key(kind, key);
        let state = self.states.entry(publish_key).or_default();

        if let Some(last) = state.last_published_version.filter(|last| version < *last) {
            log::debug!(
                target: "utsushi::publisher",
                "Skipping {} buffer for {} at version {}; already published {}",
                kind,
                key,
                version,
                last
            );
            return None;
        }

        let changes = minimal_text_changes(&state.last_published_text, text);
        if changes.is_empty() && state.last_published_version == Some(version) {
            log::trace!(
                target: "utsushi::publisher",
                "{} buffer for {} already at version {}",
                kind,
                key,
                version
            );
            return None;
        }

        let previous_was_empty = state.last_published_text.is_empty();
        state.last_published_text = text.to_string();
        state.last_published_version = Some(version);

        log::debug!(
            target: "utsushi::publisher",
            "Publishing {} change(s) to {} buffer for {} at version {}",
            changes.len(),
            kind,
            key,
            version
        );

        Some(BufferUpdate {
            host_document_file_path: key.file_path.to_string_lossy().into_owned(),
            project_key_id: (!key.project.is_miscellaneous()).then(|| key.project.id().to_string()),
            host_document_version: version,
            changes,
            previous_was_empty,
        })
    }

    pub fn published_state(
        &self,
        kind: ProjectionKind,
        key: &DocumentKey,
    ) -> Option<&PublishedBufferState> {
        self.states.get(&self.publish_key(kind, key))
    }

    /// Forget both buffers of `key`; the next publish starts from empty.
    pub fn evict(&mut self, key: &DocumentKey) {
        for kind in ProjectionKind::ALL {
            let publish_key = self.publish_key(kind, key);
            self.states.remove(&publish_key);
        }
    }
}
