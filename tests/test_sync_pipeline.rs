//! End-to-end behavior of the dispatch task, regeneration queue and publisher.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::{RecordingSink, TemplateCompiler, compile_template};
use proptest::prelude::*;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};
use tower_lsp_server::ls_types::{Position, Range};
use utsushi::config::{SettingsManager, WorkspaceSettings};
use utsushi::document::{
    CodeDocument, DocumentCompiler, DocumentKey, DocumentSnapshot, ProjectKey, ProjectionKind,
    TextSpan, apply_text_changes,
};
use utsushi::sync::{
    BufferUpdate, ContentChange, Dispatcher, DocumentChange, DocumentObserver,
    GeneratedDocumentPublisher, MAX_TRACKING_COUNT, VersionCache, minimal_text_changes,
};

struct ChannelObserver(mpsc::UnboundedSender<DocumentChange>);

impl DocumentObserver for ChannelObserver {
    fn on_document_change(&mut self, change: &DocumentChange) {
        let _ = self.0.send(change.clone());
    }
}

struct Pipeline {
    dispatcher: Dispatcher,
    sink: Arc<RecordingSink>,
    compiler: Arc<TemplateCompiler>,
    events: mpsc::UnboundedReceiver<DocumentChange>,
}

fn pipeline(settings: WorkspaceSettings) -> Pipeline {
    let sink = Arc::new(RecordingSink::default());
    let compiler = Arc::new(TemplateCompiler::default());
    let dispatcher = Dispatcher::spawn(
        Arc::clone(&compiler),
        Arc::new(SettingsManager::new(settings)),
        sink.clone(),
    );
    let (sender, events) = mpsc::unbounded_channel();
    assert_ok!(dispatcher.subscribe(Box::new(ChannelObserver(sender))));
    Pipeline {
        dispatcher,
        sink,
        compiler,
        events,
    }
}

fn key(path: &str) -> DocumentKey {
    DocumentKey::new(ProjectKey::new("/work"), path)
}

/// Wait for the next event matching `pick`, skipping others.
async fn next_event<T>(
    events: &mut mpsc::UnboundedReceiver<DocumentChange>,
    mut pick: impl FnMut(DocumentChange) -> Option<T>,
) -> T {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(30), events.recv())
            .await
            .expect("timed out waiting for a document event")
            .expect("dispatch task stopped");
        if let Some(found) = pick(event) {
            return found;
        }
    }
}

async fn regenerated(
    events: &mut mpsc::UnboundedReceiver<DocumentChange>,
    key: &DocumentKey,
) -> Arc<DocumentSnapshot> {
    next_event(events, |event| match event {
        DocumentChange::Regenerated { snapshot, .. } if snapshot.key() == key => Some(snapshot),
        _ => None,
    })
    .await
}

/// Replay buffer updates the way a backend would.
fn replay(updates: &[BufferUpdate]) -> String {
    updates.iter().fold(String::new(), |text, update| {
        apply_text_changes(&text, &update.changes).expect("changes fit the buffer")
    })
}

fn insert(line: u32, character: u32, text: &str) -> ContentChange {
    let at = Position::new(line, character);
    ContentChange {
        range: Some(Range::new(at, at)),
        text: text.to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn opening_a_document_publishes_both_projections() {
    let mut pipeline = pipeline(WorkspaceSettings::default());
    let page = key("/work/page.tmpl");
    let text = "<h1>@title</h1>";

    pipeline
        .dispatcher
        .open(page.clone(), 1, text.to_string())
        .unwrap();
    regenerated(&mut pipeline.events, &page).await;

    let expected = compile_template(text);
    let code = pipeline.sink.updates_for(ProjectionKind::Code);
    assert_eq!(code.len(), 1);
    assert!(code[0].previous_was_empty);
    assert_eq!(code[0].host_document_version, 1);
    assert_eq!(code[0].host_document_file_path, "/work/page.tmpl");
    assert_eq!(replay(&code), expected.code().text().as_str());

    let markup = pipeline.sink.updates_for(ProjectionKind::Markup);
    assert_eq!(markup.len(), 1);
    assert_eq!(markup[0].project_key_id.as_deref(), Some("/work"));
    assert_eq!(replay(&markup), expected.markup().text().as_str());
}

#[tokio::test(start_paused = true)]
async fn burst_of_edits_regenerates_once_and_backend_converges() {
    let mut pipeline = pipeline(WorkspaceSettings::default());
    let page = key("/work/page.tmpl");
    pipeline
        .dispatcher
        .open(page.clone(), 1, "<p>@name</p>".to_string())
        .unwrap();
    regenerated(&mut pipeline.events, &page).await;
    let compiles_after_open = pipeline.compiler.compile_count();

    for (version, character, text) in [(2, 8, "x"), (3, 9, "y"), (4, 10, "z")] {
        pipeline
            .dispatcher
            .change(page.clone(), version, vec![insert(0, character, text)])
            .unwrap();
    }
    let snapshot = regenerated(&mut pipeline.events, &page).await;

    assert_eq!(snapshot.version(), 4);
    assert_eq!(snapshot.text(), "<p>@namexyz</p>");
    assert_eq!(pipeline.compiler.compile_count(), compiles_after_open + 1);

    let code = pipeline.sink.updates_for(ProjectionKind::Code);
    assert_eq!(code.len(), 2);
    assert!(!code[1].previous_was_empty);
    assert_eq!(
        replay(&code),
        compile_template("<p>@namexyz</p>").code().text().as_str()
    );
}

#[tokio::test(start_paused = true)]
async fn versions_never_go_backwards() {
    let mut pipeline = pipeline(WorkspaceSettings::default());
    let page = key("/work/page.tmpl");
    pipeline
        .dispatcher
        .open(page.clone(), 5, "a".to_string())
        .unwrap();
    pipeline
        .dispatcher
        .change(page.clone(), 3, vec![insert(0, 1, "b")])
        .unwrap();

    let version = next_event(&mut pipeline.events, |event| match event {
        DocumentChange::Changed(snapshot) => Some(snapshot.version()),
        _ => None,
    })
    .await;
    assert_eq!(version, 6);
}

#[tokio::test(start_paused = true)]
async fn closing_forgets_the_document_by_default() {
    let mut pipeline = pipeline(WorkspaceSettings::default());
    let page = key("/work/page.tmpl");
    pipeline
        .dispatcher
        .open(page.clone(), 1, "<p></p>".to_string())
        .unwrap();
    regenerated(&mut pipeline.events, &page).await;

    assert_ok!(pipeline.dispatcher.close(page.clone()));
    assert!(pipeline.dispatcher.resolve(page.clone()).await.is_none());

    // Reopening starts the backend buffers from scratch.
    pipeline
        .dispatcher
        .open(page.clone(), 1, "<p></p>".to_string())
        .unwrap();
    regenerated(&mut pipeline.events, &page).await;
    let markup = pipeline.sink.updates_for(ProjectionKind::Markup);
    assert_eq!(markup.len(), 2);
    assert!(markup[1].previous_was_empty);
}

#[tokio::test(start_paused = true)]
async fn closed_documents_can_stay_tracked() {
    let mut pipeline = pipeline(WorkspaceSettings {
        update_buffers_for_closed_documents: true,
        ..WorkspaceSettings::default()
    });
    let page = key("/work/page.tmpl");
    pipeline
        .dispatcher
        .open(page.clone(), 1, "<p>@a</p>".to_string())
        .unwrap();
    regenerated(&mut pipeline.events, &page).await;
    pipeline.dispatcher.close(page.clone()).unwrap();

    let resolved = pipeline.dispatcher.resolve(page.clone()).await.unwrap();
    assert_eq!(resolved.snapshot.text(), "<p>@a</p>");
    assert!(resolved.code_document.is_some());
}

#[tokio::test(start_paused = true)]
async fn editing_an_import_regenerates_its_dependents() {
    let mut pipeline = pipeline(WorkspaceSettings::default());
    let page = key("/work/page.tmpl");
    let layout = key("/work/layout.tmpl");

    pipeline
        .dispatcher
        .open(
            page.clone(),
            1,
            "@import /work/layout.tmpl\n<p>@title</p>".to_string(),
        )
        .unwrap();
    regenerated(&mut pipeline.events, &page).await;

    pipeline
        .dispatcher
        .open(layout.clone(), 1, "<main></main>".to_string())
        .unwrap();
    let invalidated = next_event(&mut pipeline.events, |event| match event {
        DocumentChange::Invalidated(snapshot) => Some(snapshot),
        _ => None,
    })
    .await;
    assert_eq!(invalidated.key(), &page);
    assert_eq!(invalidated.version(), 1, "invalidation keeps the version");

    regenerated(&mut pipeline.events, &page).await;
    // Same text and version: nothing new for the page's buffers.
    let page_updates: Vec<_> = pipeline
        .sink
        .updates_for(ProjectionKind::Code)
        .into_iter()
        .filter(|update| update.host_document_file_path == "/work/page.tmpl")
        .collect();
    assert_eq!(page_updates.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn project_change_invalidates_every_document_in_it() {
    let mut pipeline = pipeline(WorkspaceSettings::default());
    let first = key("/work/a.tmpl");
    let second = key("/work/b.tmpl");
    let other = DocumentKey::new(ProjectKey::new("/other"), "/other/c.tmpl");
    for document in [&first, &second, &other] {
        pipeline
            .dispatcher
            .open(document.clone(), 1, "<p></p>".to_string())
            .unwrap();
    }

    pipeline
        .dispatcher
        .project_changed(ProjectKey::new("/work"))
        .unwrap();

    let mut invalidated = Vec::new();
    while invalidated.len() < 2 {
        let snapshot = next_event(&mut pipeline.events, |event| match event {
            DocumentChange::Invalidated(snapshot) => Some(snapshot),
            _ => None,
        })
        .await;
        invalidated.push(snapshot.key().clone());
    }
    invalidated.sort();
    assert_eq!(invalidated, vec![first, second]);
}

/// Compiles like [`TemplateCompiler`] but takes longer than the debounce.
struct SlowCompiler {
    delay: Duration,
}

impl DocumentCompiler for SlowCompiler {
    fn compile(&self, snapshot: &DocumentSnapshot) -> CodeDocument {
        std::thread::sleep(self.delay);
        compile_template(snapshot.text())
    }
}

// Real clock: compiles run on the blocking pool and must overlap with edits.
#[tokio::test]
async fn slow_compiles_under_continuous_typing_still_publish() {
    let sink = Arc::new(RecordingSink::default());
    let dispatcher = Dispatcher::spawn(
        Arc::new(SlowCompiler {
            delay: Duration::from_millis(40),
        }),
        Arc::new(SettingsManager::new(WorkspaceSettings {
            debounce: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            ..WorkspaceSettings::default()
        })),
        sink.clone(),
    );
    let page = key("/work/page.tmpl");
    let mut text = String::from("@name");
    assert_ok!(dispatcher.open(page.clone(), 1, text.clone()));

    let mut ticker = tokio::time::interval(Duration::from_millis(15));
    for i in 0..60u32 {
        ticker.tick().await;
        text.push('x');
        assert_ok!(dispatcher.change(page.clone(), i as i32 + 2, vec![insert(0, 5 + i, "x")]));
    }

    let while_typing = sink.updates_for(ProjectionKind::Code);
    assert!(
        while_typing.len() >= 2,
        "only {} code update(s) while typing",
        while_typing.len()
    );
    let versions: Vec<i32> = while_typing.iter().map(|u| u.host_document_version).collect();
    assert!(versions.windows(2).all(|pair| pair[0] < pair[1]), "{versions:?}");
    assert!(versions.iter().any(|version| *version > 1));

    let expected = compile_template(&text);
    tokio::time::timeout(Duration::from_secs(5), async {
        while replay(&sink.updates_for(ProjectionKind::Code)) != expected.code().text().as_str() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("code buffer converges once typing stops");

    let resolved = dispatcher.resolve(page).await.expect("tracked");
    let generated = resolved.code_document.expect("generated output recorded");
    assert_eq!(generated.source().as_str(), text);
}

#[tokio::test]
async fn commands_after_shutdown_report_a_closed_dispatcher() {
    let pipeline = pipeline(WorkspaceSettings::default());
    let page = key("/work/page.tmpl");
    assert_ok!(pipeline.dispatcher.shutdown());

    assert!(pipeline.dispatcher.resolve(page.clone()).await.is_none());
    assert_err!(pipeline.dispatcher.open(page, 1, String::new()));
}

#[test]
fn publishing_a_one_character_edit_sends_one_change() {
    let mut publisher = GeneratedDocumentPublisher::new(false);
    let page = key("/work/page.tmpl");

    publisher
        .publish(ProjectionKind::Code, &page, "abc", 1)
        .unwrap();
    let update = publisher
        .publish(ProjectionKind::Code, &page, "abd", 2)
        .unwrap();
    assert_eq!(update.changes.len(), 1);
    assert_eq!(update.changes[0].span, TextSpan::new(2, 1));
    assert_eq!(update.changes[0].new_text, "d");

    let unchanged = publisher
        .publish(ProjectionKind::Code, &page, "abd", 3)
        .unwrap();
    assert!(unchanged.changes.is_empty());
    assert!(
        publisher
            .publish(ProjectionKind::Code, &page, "abd", 3)
            .is_none()
    );
    assert!(
        publisher
            .publish(ProjectionKind::Code, &page, "ab", 2)
            .is_none(),
        "an output older than the buffer is skipped"
    );
}

#[test]
fn version_history_is_bounded() {
    let mut cache = VersionCache::new();
    let page = key("/work/page.tmpl");
    let first = cache.allocate(&page);
    let first_snapshot = DocumentSnapshot::new(first, page.clone(), 1, "");
    cache.track_version(&first_snapshot, 1);

    let mut last = None;
    for version in 2..=(MAX_TRACKING_COUNT as i32 + 5) {
        let id = cache.allocate(&page);
        let snapshot = DocumentSnapshot::new(id, page.clone(), version, "");
        cache.track_version(&snapshot, version);
        last = Some(snapshot);
    }

    assert_eq!(cache.tracked_count(&page), MAX_TRACKING_COUNT);
    assert_eq!(cache.try_get_version(&first_snapshot), None);
    assert_eq!(
        cache.try_get_version(&last.unwrap()),
        Some(MAX_TRACKING_COUNT as i32 + 5)
    );
}

proptest! {
    #[test]
    fn minimal_changes_rebuild_the_new_text(old in "[a-c\n é]{0,24}", new in "[a-c\n é]{0,24}") {
        let changes = minimal_text_changes(&old, &new);
        prop_assert_eq!(apply_text_changes(&old, &changes), Some(new.clone()));
        if old == new {
            prop_assert!(changes.is_empty());
        }
    }
}
