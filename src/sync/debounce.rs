//! Debounced regeneration queue.
//!
//! A background task owning a last-write-wins map of pending snapshots and a
//! single deadline:
//!
//! ```text
//! enqueue(snapshot) ──► pending[key] = snapshot
//!                       deadline = min(now + debounce, oldest + max_delay)
//!        ...
//! deadline fires ──► drain pending
//!                    compile each snapshot on the blocking pool
//!                    send DispatchCommand::Flush(batch) to dispatch
//! ```
//!
//! Each arrival pushes the deadline back, but never past `max_delay` after the
//! oldest pending arrival, so a continuous stream of edits still flushes.
//! Snapshots arriving while a batch compiles wait in the channel and start the
//! next cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::dispatch::DispatchCommand;
use crate::config::SettingsManager;
use crate::document::{CodeDocument, DocumentCompiler, DocumentKey, DocumentSnapshot};

const LOG_TARGET: &str = "utsushi::debounce";

/// Stand-in deadline while nothing is pending; the timer branch is disabled
/// then, but `select!` still evaluates its future.
const IDLE_DEADLINE: Duration = Duration::from_secs(60 * 60 * 24);

/// A compiled snapshot ready to be published.
#[derive(Debug, Clone)]
pub struct GeneratedOutput {
    pub snapshot: Arc<DocumentSnapshot>,
    pub code_document: Arc<CodeDocument>,
}

/// Handle to the regeneration task. Dropping it stops the task.
#[derive(Debug)]
pub struct RegenerationQueue {
    sender: mpsc::UnboundedSender<Arc<DocumentSnapshot>>,
    _cancel_guard: DropGuard,
}

impl RegenerationQueue {
    /// Spawn the queue task. Compiled batches are sent to `flush_target`.
    pub fn spawn<C: DocumentCompiler>(
        compiler: Arc<C>,
        settings: Arc<SettingsManager>,
        flush_target: mpsc::UnboundedSender<DispatchCommand>,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();

        tokio::spawn(queue_loop(
            receiver,
            compiler,
            settings,
            flush_target,
            cancel_token.clone(),
        ));

        Self {
            sender,
            _cancel_guard: cancel_token.drop_guard(),
        }
    }

    /// Schedule regeneration of `snapshot`, replacing any pending snapshot of
    /// the same document.
    pub fn enqueue(&self, snapshot: Arc<DocumentSnapshot>) {
        if self.sender.send(snapshot).is_err() {
            log::warn!(target: LOG_TARGET, "Regeneration task is gone; dropping work item");
        }
    }
}

async fn queue_loop<C: DocumentCompiler>(
    mut receiver: mpsc::UnboundedReceiver<Arc<DocumentSnapshot>>,
    compiler: Arc<C>,
    settings: Arc<SettingsManager>,
    flush_target: mpsc::UnboundedSender<DispatchCommand>,
    cancel_token: CancellationToken,
) {
    let mut pending: HashMap<DocumentKey, Arc<DocumentSnapshot>> = HashMap::new();
    let mut oldest_arrival: Option<Instant> = None;
    let mut deadline: Option<Instant> = None;

    loop {
        let wake_at = deadline.unwrap_or_else(|| Instant::now() + IDLE_DEADLINE);

        tokio::select! {
            _ = cancel_token.cancelled() => {
                log::debug!(target: LOG_TARGET, "Regeneration task cancelled");
                break;
            }

            message = receiver.recv() => {
                let Some(snapshot) = message else {
                    break;
                };
                let timing = settings.load_settings();
                let now = Instant::now();
                let oldest = *oldest_arrival.get_or_insert(now);
                pending.insert(snapshot.key().clone(), snapshot);
                deadline = Some((now + timing.debounce).min(oldest + timing.max_delay));
            }

            _ = tokio::time::sleep_until(wake_at), if deadline.is_some() => {
                deadline = None;
                oldest_arrival = None;
                let batch: Vec<_> = pending.drain().map(|(_, snapshot)| snapshot).collect();
                let outputs = compile_batch(&compiler, batch).await;
                if outputs.is_empty() {
                    continue;
                }
                if flush_target.send(DispatchCommand::Flush(outputs)).is_err() {
                    log::debug!(target: LOG_TARGET, "Dispatch task is gone; stopping");
                    break;
                }
            }
        }
    }
}

/// Compile every snapshot on the blocking pool. A compile that panics is
/// logged and left out of the batch.
async fn compile_batch<C: DocumentCompiler>(
    compiler: &Arc<C>,
    batch: Vec<Arc<DocumentSnapshot>>,
) -> Vec<GeneratedOutput> {
    let handles: Vec<_> = batch
        .into_iter()
        .map(|snapshot| {
            let compiler = Arc::clone(compiler);
            let key = snapshot.key().clone();
            let handle = tokio::task::spawn_blocking(move || {
                let code_document = snapshot.code_document(compiler.as_ref());
                GeneratedOutput {
                    snapshot,
                    code_document,
                }
            });
            (key, handle)
        })
        .collect();

    let mut outputs = Vec::with_capacity(handles.len());
    for (key, handle) in handles {
        match handle.await {
            Ok(output) => outputs.push(output),
            Err(err) => log::error!(
                target: LOG_TARGET,
                "Compiling {} failed: {}",
                key,
                err
            ),
        }
    }
    outputs
}
