//! Server-to-client notifications carrying generated buffer updates.

use tokio::sync::mpsc;
use tower_lsp_server::Client;
use tower_lsp_server::ls_types::notification::Notification;

use crate::document::ProjectionKind;
use crate::sync::{BufferUpdate, BufferUpdateSink};

const LOG_TARGET: &str = "utsushi::lsp::notifications";

/// `utsushi/updateCodeBuffer`: the code projection of a host document changed.
#[derive(Debug)]
pub enum UpdateCodeBuffer {}

impl Notification for UpdateCodeBuffer {
    type Params = BufferUpdate;
    const METHOD: &'static str = "utsushi/updateCodeBuffer";
}

/// `utsushi/updateMarkupBuffer`: the markup projection of a host document changed.
#[derive(Debug)]
pub enum UpdateMarkupBuffer {}

impl Notification for UpdateMarkupBuffer {
    type Params = BufferUpdate;
    const METHOD: &'static str = "utsushi/updateMarkupBuffer";
}

/// Forwards buffer updates to the client in publish order.
///
/// [`BufferUpdateSink::publish`] runs inside the dispatch task and must not
/// block, so updates go through a channel to a single writer task that awaits
/// each notification before sending the next.
pub(crate) struct ClientBufferSink {
    sender: mpsc::UnboundedSender<(ProjectionKind, BufferUpdate)>,
}

impl ClientBufferSink {
    pub(crate) fn spawn(client: Client) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<(ProjectionKind, BufferUpdate)>();

        tokio::spawn(async move {
            while let Some((kind, update)) = receiver.recv().await {
                match kind {
                    ProjectionKind::Code => {
                        client.send_notification::<UpdateCodeBuffer>(update).await
                    }
                    ProjectionKind::Markup => {
                        client.send_notification::<UpdateMarkupBuffer>(update).await
                    }
                }
            }
            log::debug!(target: LOG_TARGET, "Buffer update writer stopped");
        });

        Self { sender }
    }
}

impl BufferUpdateSink for ClientBufferSink {
    fn publish(&self, kind: ProjectionKind, update: BufferUpdate) {
        if self.sender.send((kind, update)).is_err() {
            log::warn!(
                target: LOG_TARGET,
                "Dropping {} buffer update: writer task is gone",
                kind
            );
        }
    }
}
