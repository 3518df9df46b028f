//! The `LanguageServer` implementation: text sync into the dispatch task,
//! settings reloads and workspace events.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tower_lsp_server::jsonrpc::Result;
use tower_lsp_server::ls_types::*;
use tower_lsp_server::{Client, LanguageServer};

use super::notifications::ClientBufferSink;
use super::transport::LspClientTransport;
use crate::config::{SettingsEventKind, SettingsManager, SettingsSource, load_settings};
use crate::delegation::RequestDelegator;
use crate::document::{DocumentCompiler, DocumentKey, ProjectKey};
use crate::error::{UtsushiError, UtsushiResult};
use crate::sync::{ContentChange, Dispatcher, FileChangeKind};

const LOG_TARGET: &str = "utsushi::lsp";

/// Turn a `file:` URI into a filesystem path.
pub(crate) fn uri_to_path(uri: &Uri) -> UtsushiResult<PathBuf> {
    url::Url::parse(uri.as_str())
        .ok()
        .and_then(|url| url.to_file_path().ok())
        .ok_or_else(|| UtsushiError::invalid_uri(uri.as_str()))
}

/// Language server front end: feeds text synchronization into the dispatch
/// task and exposes the delegation protocol to embedders.
pub struct Utsushi<C: DocumentCompiler> {
    client: Client,
    compiler: Arc<C>,
    settings: Arc<SettingsManager>,
    dispatcher: Dispatcher,
    /// Keys are fixed when a document is opened.
    keys: DashMap<String, DocumentKey>,
}

impl<C: DocumentCompiler> std::fmt::Debug for Utsushi<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Utsushi")
            .field("settings", &self.settings)
            .field("dispatcher", &self.dispatcher)
            .field("open_documents", &self.keys.len())
            .finish_non_exhaustive()
    }
}

impl<C: DocumentCompiler> Utsushi<C> {
    /// Must be called inside a tokio runtime; spawns the dispatch task.
    pub fn new(client: Client, compiler: Arc<C>) -> Self {
        let settings = Arc::new(SettingsManager::default());
        let sink = Arc::new(ClientBufferSink::spawn(client.clone()));
        let dispatcher = Dispatcher::spawn(Arc::clone(&compiler), Arc::clone(&settings), sink);

        Self {
            client,
            compiler,
            settings,
            dispatcher,
            keys: DashMap::new(),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn settings(&self) -> &Arc<SettingsManager> {
        &self.settings
    }

    /// A delegator that sends backend requests through this server's client.
    pub fn delegator(&self) -> RequestDelegator<Dispatcher, LspClientTransport, C> {
        RequestDelegator::new(
            self.dispatcher.clone(),
            LspClientTransport::new(self.client.clone()),
            Arc::clone(&self.compiler),
            Arc::clone(&self.settings),
        )
    }

    /// The key of an open document.
    pub fn document_key(&self, uri: &Uri) -> Option<DocumentKey> {
        self.keys.get(uri.as_str()).map(|entry| entry.value().clone())
    }

    async fn reload_settings(&self, override_settings: Option<(SettingsSource, Value)>) {
        let root_path = self.settings.root_path();
        let outcome = load_settings(root_path.as_deref(), override_settings);

        for event in outcome.events {
            let level = match event.kind {
                SettingsEventKind::Info => MessageType::INFO,
                SettingsEventKind::Warning => MessageType::WARNING,
            };
            self.client.log_message(level, event.message).await;
        }

        self.settings.apply_settings(outcome.settings);
    }

    fn open_projects(&self) -> BTreeSet<ProjectKey> {
        self.keys
            .iter()
            .map(|entry| entry.value().project.clone())
            .collect()
    }

    fn invalidate_open_projects(&self) {
        for project in self.open_projects() {
            if let Err(err) = self.dispatcher.project_changed(project) {
                log::error!(target: LOG_TARGET, "Failed to invalidate project: {}", err);
            }
        }
    }

    fn report(&self, result: UtsushiResult<()>, what: &str) {
        if let Err(err) = result {
            log::error!(target: LOG_TARGET, "{} failed: {}", what, err);
        }
    }
}

fn folder_paths(folders: &[WorkspaceFolder]) -> Vec<PathBuf> {
    folders
        .iter()
        .filter_map(|folder| uri_to_path(&folder.uri).ok())
        .collect()
}

fn content_change(event: TextDocumentContentChangeEvent) -> ContentChange {
    ContentChange {
        range: event.range,
        text: event.text,
    }
}

fn file_change_kind(kind: FileChangeType) -> FileChangeKind {
    if kind == FileChangeType::CREATED {
        FileChangeKind::Added
    } else if kind == FileChangeType::DELETED {
        FileChangeKind::Removed
    } else {
        FileChangeKind::Changed
    }
}

impl<C: DocumentCompiler> LanguageServer for Utsushi<C> {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let folders = params
            .workspace_folders
            .as_deref()
            .map(folder_paths)
            .unwrap_or_default();

        #[allow(deprecated)]
        let root_path = folders
            .first()
            .cloned()
            .or_else(|| params.root_uri.as_ref().and_then(|uri| uri_to_path(uri).ok()))
            .or_else(|| std::env::current_dir().ok());

        match &root_path {
            Some(path) => {
                self.client
                    .log_message(
                        MessageType::INFO,
                        format!("Using workspace root {}", path.display()),
                    )
                    .await;
            }
            None => {
                self.client
                    .log_message(
                        MessageType::WARNING,
                        "Failed to determine workspace root - project config will not be loaded",
                    )
                    .await;
            }
        }

        self.settings.set_root_path(root_path);
        self.settings.set_workspace_folders(folders);

        let override_settings = params
            .initialization_options
            .map(|value| (SettingsSource::InitializationOptions, value));
        self.reload_settings(override_settings).await;

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::INCREMENTAL),
                        ..Default::default()
                    },
                )),
                workspace: Some(WorkspaceServerCapabilities {
                    workspace_folders: Some(WorkspaceFoldersServerCapabilities {
                        supported: Some(true),
                        change_notifications: Some(OneOf::Left(true)),
                    }),
                    ..Default::default()
                }),
                ..ServerCapabilities::default()
            },
            server_info: Some(ServerInfo {
                name: "utsushi".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            ..InitializeResult::default()
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "server is ready")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        self.report(self.dispatcher.shutdown(), "Shutdown");
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let document = params.text_document;
        let path = match uri_to_path(&document.uri) {
            Ok(path) => path,
            Err(err) => {
                log::warn!(target: LOG_TARGET, "Ignoring didOpen: {}", err);
                return;
            }
        };

        let key = DocumentKey::new(self.settings.project_for(&path), path);
        self.keys.insert(document.uri.as_str().to_string(), key.clone());
        self.report(
            self.dispatcher.open(key, document.version, document.text),
            "didOpen",
        );
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let Some(key) = self.document_key(&params.text_document.uri) else {
            log::warn!(
                target: LOG_TARGET,
                "didChange for unopened document {}",
                params.text_document.uri.as_str()
            );
            return;
        };

        let changes = params
            .content_changes
            .into_iter()
            .map(content_change)
            .collect();
        self.report(
            self.dispatcher
                .change(key, params.text_document.version, changes),
            "didChange",
        );
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let Some((_, key)) = self.keys.remove(params.text_document.uri.as_str()) else {
            return;
        };
        self.report(self.dispatcher.close(key), "didClose");
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        let override_settings = match params.settings {
            Value::Null => None,
            value => Some((SettingsSource::ClientConfiguration, value)),
        };
        self.reload_settings(override_settings).await;
        self.invalidate_open_projects();
    }

    async fn did_change_workspace_folders(&self, params: DidChangeWorkspaceFoldersParams) {
        let removed = folder_paths(&params.event.removed);
        let mut folders: Vec<PathBuf> = self
            .settings
            .workspace_folders()
            .iter()
            .filter(|folder| !removed.contains(folder))
            .cloned()
            .collect();
        for added in folder_paths(&params.event.added) {
            if !folders.contains(&added) {
                folders.push(added);
            }
        }

        log::info!(target: LOG_TARGET, "Workspace folders now {:?}", folders);
        self.settings.set_workspace_folders(folders);
        self.invalidate_open_projects();
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        for event in params.changes {
            match uri_to_path(&event.uri) {
                Ok(path) => self.report(
                    self.dispatcher
                        .file_changed(path, file_change_kind(event.typ)),
                    "didChangeWatchedFiles",
                ),
                Err(err) => log::debug!(target: LOG_TARGET, "Ignoring watched file: {}", err),
            }
        }
    }
}
