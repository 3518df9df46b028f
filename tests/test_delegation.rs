//! The delegation protocol against an in-memory resolver and backend.

mod helpers;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use helpers::TemplateCompiler;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower_lsp_server::ls_types::request::{HoverRequest, Request};
use tower_lsp_server::ls_types::{
    Hover, HoverContents, HoverParams, MarkedString, Position, Range, TextDocumentIdentifier,
    TextDocumentPositionParams, Uri,
};
use utsushi::config::{SettingsManager, WorkspaceSettings};
use utsushi::delegation::{
    BackendTransport, DelegatedRequestHandler, DocumentResolver, RequestContext,
    RequestDelegator,
};
use utsushi::document::{DocumentKey, DocumentSnapshot, ProjectKey, ProjectionKind};
use utsushi::mapping::MappingBehavior;
use utsushi::sync::{ResolvedDocument, VersionCache};

const PAGE: &str = "@import /work/layout.tmpl\n<p>@name</p>";

#[derive(Default)]
struct StaticResolver {
    documents: HashMap<DocumentKey, ResolvedDocument>,
}

impl DocumentResolver for StaticResolver {
    async fn resolve(&self, key: DocumentKey) -> Option<ResolvedDocument> {
        self.documents.get(&key).cloned()
    }
}

#[derive(Clone, Copy)]
enum Backend {
    Answers,
    Hangs,
}

/// Records every request and answers with a canned JSON value.
struct StubTransport {
    backend: Backend,
    answer: Value,
    sent: Arc<Mutex<Vec<(&'static str, Value)>>>,
}

impl BackendTransport for StubTransport {
    async fn send_request<R: Request>(
        &self,
        params: R::Params,
        _token: &CancellationToken,
    ) -> Option<R::Result> {
        self.sent
            .lock()
            .unwrap()
            .push((R::METHOD, serde_json::to_value(&params).unwrap()));
        match self.backend {
            Backend::Answers => serde_json::from_value(self.answer.clone()).ok(),
            Backend::Hangs => std::future::pending().await,
        }
    }
}

/// Hover delegated to whichever projection owns the position.
struct HoverHandler {
    local_answer: Option<String>,
}

fn buffer_uri(kind: ProjectionKind) -> Uri {
    Uri::from_str(&format!("file:///work/page.tmpl.{kind}")).unwrap()
}

impl DelegatedRequestHandler for HoverHandler {
    type Params = HoverParams;
    type Delegated = HoverRequest;

    fn position(&self, params: &HoverParams) -> Position {
        params.text_document_position_params.position
    }

    async fn try_handle(
        &self,
        _params: &HoverParams,
        _context: &RequestContext,
    ) -> Option<Option<Hover>> {
        self.local_answer.clone().map(|text| {
            Some(Hover {
                contents: HoverContents::Scalar(MarkedString::String(text)),
                range: None,
            })
        })
    }

    fn create_delegated_params(
        &self,
        params: &HoverParams,
        context: &RequestContext,
    ) -> Option<HoverParams> {
        let kind = context.projection.projection_kind()?;
        Some(HoverParams {
            text_document_position_params: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier {
                    uri: buffer_uri(kind),
                },
                position: context.projection.generated_position,
            },
            work_done_progress_params: params.work_done_progress_params.clone(),
        })
    }

    fn remap_response(
        &self,
        response: Option<Hover>,
        context: &RequestContext,
    ) -> Option<Option<Hover>> {
        let Some(mut hover) = response else {
            return Some(None);
        };
        hover.range = match hover.range {
            Some(range) => Some(context.map_range_to_host(range, MappingBehavior::Inclusive)?),
            None => None,
        };
        Some(Some(hover))
    }
}

fn page_key() -> DocumentKey {
    DocumentKey::new(ProjectKey::new("/work"), "/work/page.tmpl")
}

fn hover_at(line: u32, character: u32) -> HoverParams {
    HoverParams {
        text_document_position_params: TextDocumentPositionParams {
            text_document: TextDocumentIdentifier {
                uri: Uri::from_str("file:///work/page.tmpl").unwrap(),
            },
            position: Position::new(line, character),
        },
        work_done_progress_params: Default::default(),
    }
}

struct Setup {
    delegator: RequestDelegator<StaticResolver, StubTransport, TemplateCompiler>,
    compiler: Arc<TemplateCompiler>,
    sent: Arc<Mutex<Vec<(&'static str, Value)>>>,
}

fn setup(backend: Backend, answer: Value, settings: WorkspaceSettings) -> Setup {
    let key = page_key();
    let mut versions = VersionCache::new();
    let snapshot = Arc::new(DocumentSnapshot::new(
        versions.allocate(&key),
        key.clone(),
        1,
        PAGE,
    ));
    let mut resolver = StaticResolver::default();
    resolver.documents.insert(
        key,
        ResolvedDocument {
            snapshot,
            code_document: None,
        },
    );

    let compiler = Arc::new(TemplateCompiler::default());
    let sent = Arc::new(Mutex::new(Vec::new()));
    let transport = StubTransport {
        backend,
        answer,
        sent: Arc::clone(&sent),
    };
    let delegator = RequestDelegator::new(
        resolver,
        transport,
        Arc::clone(&compiler),
        Arc::new(SettingsManager::new(settings)),
    );
    Setup {
        delegator,
        compiler,
        sent,
    }
}

fn hover_answer(range: Range) -> Value {
    json!({
        "contents": "string name",
        "range": range,
    })
}

fn handler() -> HoverHandler {
    HoverHandler { local_answer: None }
}

#[tokio::test]
async fn code_position_is_delegated_and_range_remapped() {
    // `name` sits at host 30..34 on line 1 and at generated 6..10 on line 0.
    let generated_name = Range::new(Position::new(0, 6), Position::new(0, 10));
    let setup = setup(
        Backend::Answers,
        hover_answer(generated_name),
        WorkspaceSettings::default(),
    );

    let hover = setup
        .delegator
        .delegate(&handler(), page_key(), hover_at(1, 6), &CancellationToken::new())
        .await
        .expect("delegated")
        .expect("backend answered");

    assert_eq!(
        hover.range,
        Some(Range::new(Position::new(1, 4), Position::new(1, 8)))
    );

    let sent = setup.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, HoverRequest::METHOD);
    assert_eq!(sent[0].1["position"], json!({ "line": 0, "character": 8 }));
    assert_eq!(sent[0].1["textDocument"]["uri"], "file:///work/page.tmpl.code");
    assert_eq!(setup.compiler.compile_count(), 1, "compiled on demand");
}

#[tokio::test]
async fn markup_position_goes_to_the_markup_buffer() {
    let setup = setup(Backend::Answers, json!(null), WorkspaceSettings::default());

    let hover = setup
        .delegator
        .delegate(&handler(), page_key(), hover_at(1, 1), &CancellationToken::new())
        .await;
    assert_eq!(hover, Some(None));

    let sent = setup.sent.lock().unwrap();
    assert_eq!(sent[0].1["textDocument"]["uri"], "file:///work/page.tmpl.markup");
    assert_eq!(sent[0].1["position"], json!({ "line": 1, "character": 1 }));
}

#[tokio::test]
async fn host_language_position_is_never_delegated() {
    let setup = setup(Backend::Answers, json!(null), WorkspaceSettings::default());

    let hover = setup
        .delegator
        .delegate(&handler(), page_key(), hover_at(0, 3), &CancellationToken::new())
        .await;

    assert_eq!(hover, None);
    assert!(setup.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn disabled_delegation_answers_nothing() {
    let setup = setup(
        Backend::Answers,
        json!(null),
        WorkspaceSettings {
            delegation_enabled: false,
            ..WorkspaceSettings::default()
        },
    );

    let hover = setup
        .delegator
        .delegate(&handler(), page_key(), hover_at(1, 6), &CancellationToken::new())
        .await;

    assert_eq!(hover, None);
    assert!(setup.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn local_answer_skips_the_backend() {
    let setup = setup(Backend::Answers, json!(null), WorkspaceSettings::default());
    let handler = HoverHandler {
        local_answer: Some("directive".to_string()),
    };

    let hover = setup
        .delegator
        .delegate(&handler, page_key(), hover_at(0, 3), &CancellationToken::new())
        .await
        .flatten()
        .unwrap();

    assert_eq!(
        hover.contents,
        HoverContents::Scalar(MarkedString::String("directive".to_string()))
    );
    assert!(setup.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_document_answers_nothing() {
    let setup = setup(Backend::Answers, json!(null), WorkspaceSettings::default());
    let other = DocumentKey::new(ProjectKey::new("/work"), "/work/other.tmpl");

    let hover = setup
        .delegator
        .delegate(&handler(), other, hover_at(0, 0), &CancellationToken::new())
        .await;

    assert_eq!(hover, None);
}

#[tokio::test(start_paused = true)]
async fn unresponsive_backend_times_out() {
    let setup = setup(
        Backend::Hangs,
        json!(null),
        WorkspaceSettings {
            delegation_timeout: Duration::from_millis(250),
            ..WorkspaceSettings::default()
        },
    );
    let started = tokio::time::Instant::now();

    let hover = setup
        .delegator
        .delegate(&handler(), page_key(), hover_at(1, 6), &CancellationToken::new())
        .await;

    assert_eq!(hover, None);
    assert!(started.elapsed() >= Duration::from_millis(250));
    assert_eq!(setup.sent.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_wins_over_a_pending_backend() {
    let setup = setup(Backend::Hangs, json!(null), WorkspaceSettings::default());
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        canceller.cancel();
    });
    let started = tokio::time::Instant::now();

    let hover = setup
        .delegator
        .delegate(&handler(), page_key(), hover_at(1, 6), &token)
        .await;

    assert_eq!(hover, None);
    assert!(started.elapsed() < WorkspaceSettings::default().delegation_timeout);
}

#[tokio::test]
async fn unmappable_response_range_drops_the_answer() {
    // Generated 0..3 is `__o` glue with no host counterpart.
    let setup = setup(
        Backend::Answers,
        hover_answer(Range::new(Position::new(0, 0), Position::new(0, 3))),
        WorkspaceSettings::default(),
    );

    let hover = setup
        .delegator
        .delegate(&handler(), page_key(), hover_at(1, 6), &CancellationToken::new())
        .await;

    assert_eq!(hover, None);
}
