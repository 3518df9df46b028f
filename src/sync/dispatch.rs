//! The dispatch task: single writer of all document state.
//!
//! Every mutation of the document store, the version cache and the published
//! buffer state happens inside one task that processes [`DispatchCommand`]s
//! in order. Other tasks talk to it through the cloneable [`Dispatcher`]
//! handle; the regeneration queue hands compiled batches back over the same
//! channel.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard};
use tower_lsp_server::ls_types::Range;

use super::debounce::{GeneratedOutput, RegenerationQueue};
use super::publisher::{BufferUpdateSink, GeneratedDocumentPublisher};
use super::version_cache::VersionCache;
use crate::config::SettingsManager;
use crate::document::{
    CodeDocument, DocumentCompiler, DocumentKey, DocumentSnapshot, ProjectKey, ProjectionKind,
    SourceText,
};
use crate::error::{UtsushiError, UtsushiResult};

const LOG_TARGET: &str = "utsushi::dispatch";

/// One LSP content change: a full replacement when `range` is None.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChange {
    pub range: Option<Range>,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    Added,
    Removed,
    Changed,
}

/// What changed, handed to every [`DocumentObserver`].
#[derive(Debug, Clone)]
pub enum DocumentChange {
    Opened(Arc<DocumentSnapshot>),
    Changed(Arc<DocumentSnapshot>),
    /// A new snapshot with unchanged text, after a project or import change.
    Invalidated(Arc<DocumentSnapshot>),
    Regenerated {
        snapshot: Arc<DocumentSnapshot>,
        code_document: Arc<CodeDocument>,
    },
    Closed(DocumentKey),
    ProjectChanged(ProjectKey),
}

/// Observer invoked synchronously inside the dispatch task.
///
/// Implementations must not block; anything slow should be handed off to
/// another task.
pub trait DocumentObserver: Send + 'static {
    fn on_document_change(&mut self, change: &DocumentChange);
}

/// A document as seen by a request: its current snapshot and the most recent
/// code document generated for it, which may belong to an older snapshot.
#[derive(Debug, Clone)]
pub struct ResolvedDocument {
    pub snapshot: Arc<DocumentSnapshot>,
    pub code_document: Option<Arc<CodeDocument>>,
}

pub enum DispatchCommand {
    Open {
        key: DocumentKey,
        version: i32,
        text: String,
    },
    Change {
        key: DocumentKey,
        version: i32,
        changes: Vec<ContentChange>,
    },
    Close {
        key: DocumentKey,
    },
    ProjectChanged {
        project: ProjectKey,
    },
    FileChanged {
        path: PathBuf,
        kind: FileChangeKind,
    },
    Flush(Vec<GeneratedOutput>),
    Resolve {
        key: DocumentKey,
        reply: oneshot::Sender<Option<ResolvedDocument>>,
    },
    Subscribe(Box<dyn DocumentObserver>),
    Shutdown,
}

impl fmt::Debug for DispatchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { key, version, .. } => write!(f, "Open({key}, v{version})"),
            Self::Change {
                key,
                version,
                changes,
            } => write!(f, "Change({key}, v{version}, {} change(s))", changes.len()),
            Self::Close { key } => write!(f, "Close({key})"),
            Self::ProjectChanged { project } => write!(f, "ProjectChanged({project})"),
            Self::FileChanged { path, kind } => {
                write!(f, "FileChanged({}, {kind:?})", path.display())
            }
            Self::Flush(outputs) => write!(f, "Flush({} document(s))", outputs.len()),
            Self::Resolve { key, .. } => write!(f, "Resolve({key})"),
            Self::Subscribe(_) => f.write_str("Subscribe"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Cloneable handle to the dispatch task. The task stops when the last handle
/// is dropped or [`Dispatcher::shutdown`] is called.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    sender: mpsc::UnboundedSender<DispatchCommand>,
    _cancel_guard: Arc<DropGuard>,
}

impl Dispatcher {
    /// Spawn the dispatch task and its regeneration queue.
    pub fn spawn<C: DocumentCompiler>(
        compiler: Arc<C>,
        settings: Arc<SettingsManager>,
        sink: Arc<dyn BufferUpdateSink>,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();

        let queue = RegenerationQueue::spawn(compiler, Arc::clone(&settings), sender.clone());
        let state = DispatchState::new(queue, settings, sink);
        tokio::spawn(dispatch_loop(receiver, state, cancel_token.clone()));

        Self {
            sender,
            _cancel_guard: Arc::new(cancel_token.drop_guard()),
        }
    }

    fn send(&self, command: DispatchCommand) -> UtsushiResult<()> {
        self.sender
            .send(command)
            .map_err(|_| UtsushiError::DispatchClosed)
    }

    pub fn open(&self, key: DocumentKey, version: i32, text: String) -> UtsushiResult<()> {
        self.send(DispatchCommand::Open { key, version, text })
    }

    pub fn change(
        &self,
        key: DocumentKey,
        version: i32,
        changes: Vec<ContentChange>,
    ) -> UtsushiResult<()> {
        self.send(DispatchCommand::Change {
            key,
            version,
            changes,
        })
    }

    pub fn close(&self, key: DocumentKey) -> UtsushiResult<()> {
        self.send(DispatchCommand::Close { key })
    }

    pub fn project_changed(&self, project: ProjectKey) -> UtsushiResult<()> {
        self.send(DispatchCommand::ProjectChanged { project })
    }

    pub fn file_changed(&self, path: PathBuf, kind: FileChangeKind) -> UtsushiResult<()> {
        self.send(DispatchCommand::FileChanged { path, kind })
    }

    pub fn subscribe(&self, observer: Box<dyn DocumentObserver>) -> UtsushiResult<()> {
        self.send(DispatchCommand::Subscribe(observer))
    }

    /// Current state of `key`, or None if it is not tracked.
    pub async fn resolve(&self, key: DocumentKey) -> Option<ResolvedDocument> {
        let (reply, receiver) = oneshot::channel();
        self.send(DispatchCommand::Resolve { key, reply }).ok()?;
        receiver.await.ok().flatten()
    }

    pub fn shutdown(&self) -> UtsushiResult<()> {
        self.send(DispatchCommand::Shutdown)
    }
}

struct DocumentState {
    snapshot: Arc<DocumentSnapshot>,
    latest_generated: Option<Arc<CodeDocument>>,
    /// Version `latest_generated` was compiled at.
    generated_version: Option<i32>,
    is_open: bool,
}

struct DispatchState {
    documents: HashMap<DocumentKey, DocumentState>,
    version_cache: VersionCache,
    publisher: GeneratedDocumentPublisher,
    observers: Vec<Box<dyn DocumentObserver>>,
    queue: RegenerationQueue,
    settings: Arc<SettingsManager>,
    sink: Arc<dyn BufferUpdateSink>,
}

async fn dispatch_loop(
    mut receiver: mpsc::UnboundedReceiver<DispatchCommand>,
    mut state: DispatchState,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                log::debug!(target: LOG_TARGET, "Dispatch task cancelled");
                break;
            }

            command = receiver.recv() => {
                let Some(command) = command else {
                    break;
                };
                log::trace!(target: LOG_TARGET, "{:?}", command);
                if matches!(command, DispatchCommand::Shutdown) {
                    log::info!(target: LOG_TARGET, "Dispatch task shutting down");
                    break;
                }
                state.handle(command);
            }
        }
    }
}

impl DispatchState {
    fn new(
        queue: RegenerationQueue,
        settings: Arc<SettingsManager>,
        sink: Arc<dyn BufferUpdateSink>,
    ) -> Self {
        let include_project_key = settings.load_settings().include_project_key_in_generated_path;
        Self {
            documents: HashMap::new(),
            version_cache: VersionCache::new(),
            publisher: GeneratedDocumentPublisher::new(include_project_key),
            observers: Vec::new(),
            queue,
            settings,
            sink,
        }
    }

    fn handle(&mut self, command: DispatchCommand) {
        match command {
            DispatchCommand::Open { key, version, text } => self.open(key, version, text),
            DispatchCommand::Change {
                key,
                version,
                changes,
            } => self.change(key, version, changes),
            DispatchCommand::Close { key } => self.close(key),
            DispatchCommand::ProjectChanged { project } => self.project_changed(project),
            DispatchCommand::FileChanged { path, kind } => self.file_changed(&path, kind),
            DispatchCommand::Flush(outputs) => self.flush(outputs),
            DispatchCommand::Resolve { key, reply } => {
                let resolved = self.documents.get(&key).map(|doc| ResolvedDocument {
                    snapshot: Arc::clone(&doc.snapshot),
                    code_document: doc.latest_generated.clone(),
                });
                // The requester may have been cancelled.
                let _ = reply.send(resolved);
            }
            DispatchCommand::Subscribe(observer) => self.observers.push(observer),
            DispatchCommand::Shutdown => {}
        }
    }

    fn notify(&mut self, change: DocumentChange) {
        for observer in &mut self.observers {
            observer.on_document_change(&change);
        }
    }

    /// Versions never go backwards for a key, whatever the client sends.
    fn next_version(&self, key: &DocumentKey, client_version: i32) -> i32 {
        match self.version_cache.latest_version(key) {
            Some(previous) => client_version.max(previous + 1),
            None => client_version,
        }
    }

    fn new_snapshot(
        &mut self,
        key: &DocumentKey,
        version: i32,
        text: impl Into<Arc<str>>,
    ) -> Arc<DocumentSnapshot> {
        let id = self.version_cache.allocate(key);
        Arc::new(DocumentSnapshot::new(id, key.clone(), version, text))
    }

    fn open(&mut self, key: DocumentKey, client_version: i32, text: String) {
        let version = self.next_version(&key, client_version);
        let snapshot = self.new_snapshot(&key, version, text);
        self.version_cache.track_version(&snapshot, version);

        let (latest_generated, generated_version) = self
            .documents
            .remove(&key)
            .map_or((None, None), |previous| {
                (previous.latest_generated, previous.generated_version)
            });
        self.documents.insert(
            key.clone(),
            DocumentState {
                snapshot: Arc::clone(&snapshot),
                latest_generated,
                generated_version,
                is_open: true,
            },
        );
        log::debug!(target: LOG_TARGET, "Opened {} at version {}", key, version);

        self.queue.enqueue(Arc::clone(&snapshot));
        self.notify(DocumentChange::Opened(snapshot));
        self.invalidate_dependents(key.file_path());
    }

    fn change(&mut self, key: DocumentKey, client_version: i32, changes: Vec<ContentChange>) {
        let Some(current) = self.documents.get(&key).map(|doc| Arc::clone(&doc.snapshot)) else {
            log::warn!(target: LOG_TARGET, "Change for untracked document {}", key);
            return;
        };

        let text = apply_content_changes(current.text(), changes, &key);
        let version = self.next_version(&key, client_version);
        let snapshot = self.new_snapshot(&key, version, text);
        self.version_cache.track_version(&snapshot, version);

        if let Some(doc) = self.documents.get_mut(&key) {
            doc.snapshot = Arc::clone(&snapshot);
        }

        self.queue.enqueue(Arc::clone(&snapshot));
        self.notify(DocumentChange::Changed(snapshot));
        self.invalidate_dependents(key.file_path());
    }

    fn close(&mut self, key: DocumentKey) {
        let keep = self.settings.load_settings().update_buffers_for_closed_documents;
        if keep {
            if let Some(doc) = self.documents.get_mut(&key) {
                doc.is_open = false;
            }
        } else {
            self.forget(&key);
        }
        log::debug!(target: LOG_TARGET, "Closed {} (kept: {})", key, keep);
        self.notify(DocumentChange::Closed(key));
    }

    fn forget(&mut self, key: &DocumentKey) {
        self.documents.remove(key);
        self.version_cache.remove(key);
        self.publisher.evict(key);
    }

    /// Re-snapshot a document with unchanged text under its latest version and
    /// schedule regeneration.
    fn invalidate(&mut self, key: &DocumentKey) {
        let Some(current) = self.documents.get(key).map(|doc| Arc::clone(&doc.snapshot)) else {
            return;
        };
        let version = self
            .version_cache
            .latest_version(key)
            .unwrap_or_else(|| current.version());
        let snapshot = self.new_snapshot(key, version, current.shared_text());
        self.version_cache.mark_as_latest_version(&snapshot);

        if let Some(doc) = self.documents.get_mut(key) {
            doc.snapshot = Arc::clone(&snapshot);
        }
        self.queue.enqueue(Arc::clone(&snapshot));
        self.notify(DocumentChange::Invalidated(snapshot));
    }

    fn project_changed(&mut self, project: ProjectKey) {
        let keys = self.version_cache.keys_in_project(&project);
        log::debug!(
            target: LOG_TARGET,
            "Project {} changed; invalidating {} document(s)",
            project,
            keys.len()
        );
        for key in &keys {
            self.invalidate(key);
        }
        self.notify(DocumentChange::ProjectChanged(project));
    }

    /// Documents whose last generated output imports `path`.
    fn dependents_of(&self, path: &Path) -> Vec<DocumentKey> {
        let mut keys: Vec<DocumentKey> = self
            .documents
            .iter()
            .filter(|(key, doc)| {
                key.file_path() != path
                    && doc
                        .latest_generated
                        .as_ref()
                        .is_some_and(|code| code.imports().iter().any(|import| import == path))
            })
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    fn invalidate_dependents(&mut self, path: &Path) {
        for key in self.dependents_of(path) {
            log::debug!(
                target: LOG_TARGET,
                "{} imports {}; regenerating",
                key,
                path.display()
            );
            self.invalidate(&key);
        }
    }

    fn file_changed(&mut self, path: &Path, kind: FileChangeKind) {
        if kind == FileChangeKind::Removed {
            let closed: Vec<DocumentKey> = self
                .documents
                .iter()
                .filter(|(key, doc)| !doc.is_open && key.file_path() == path)
                .map(|(key, _)| key.clone())
                .collect();
            for key in closed {
                self.forget(&key);
            }
        }
        self.invalidate_dependents(path);
    }

    /// Publish compiled outputs.
    ///
    /// An output compiled from a snapshot the document has since moved past
    /// is still published as long as its version is not older than what was
    /// last generated, so a document under continuous editing keeps its
    /// buffers moving forward. Outputs whose version is no longer tracked or
    /// is older than the latest generated one are dropped.
    fn flush(&mut self, outputs: Vec<GeneratedOutput>) {
        let settings = self.settings.load_settings();
        self.publisher.set_include_project_key_in_generated_path(
            settings.include_project_key_in_generated_path,
        );

        for output in outputs {
            let key = output.snapshot.key().clone();
            let Some(doc) = self.documents.get_mut(&key) else {
                log::debug!(target: LOG_TARGET, "Dropping output for untracked {}", key);
                continue;
            };
            let Some(version) = self.version_cache.try_get_version(&output.snapshot) else {
                log::debug!(target: LOG_TARGET, "No version for output of {}; skipping", key);
                continue;
            };
            if doc.generated_version.is_some_and(|latest| version < latest) {
                log::debug!(
                    target: LOG_TARGET,
                    "Dropping out-of-order output for {} at version {}",
                    key,
                    version
                );
                continue;
            }
            if !doc.snapshot.is_same_snapshot(&output.snapshot) {
                log::trace!(
                    target: LOG_TARGET,
                    "Publishing superseded output for {} at version {}",
                    key,
                    version
                );
            }

            doc.latest_generated = Some(Arc::clone(&output.code_document));
            doc.generated_version = Some(version);
            let publish = doc.is_open || settings.update_buffers_for_closed_documents;

            if publish {
                for kind in ProjectionKind::ALL {
                    let text = output.code_document.generated(kind).text().as_str();
                    if let Some(update) = self.publisher.publish(kind, &key, text, version) {
                        self.sink.publish(kind, update);
                    }
                }
            }

            self.notify(DocumentChange::Regenerated {
                snapshot: output.snapshot,
                code_document: output.code_document,
            });
        }
    }
}

/// Apply LSP content changes in order. Changes with a range that does not fit
/// the current text are skipped.
fn apply_content_changes(text: &str, changes: Vec<ContentChange>, key: &DocumentKey) -> String {
    let mut current = text.to_string();
    for change in changes {
        match change.range {
            None => current = change.text,
            Some(range) => {
                let source = SourceText::new(current.as_str());
                match source.range_to_span(range) {
                    Some(span) => {
                        current.replace_range(span.start..span.end(), &change.text);
                    }
                    _ => log::warn!(
                        target: LOG_TARGET,
                        "Skipping out-of-range change {:?} for {}",
                        range,
                        key
                    ),
                }
            }
        }
    }
    current
}
