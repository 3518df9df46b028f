//! Delegated requests travel back through the client, which owns the
//! connections to the embedded-language servers.

use tokio_util::sync::CancellationToken;
use tower_lsp_server::Client;
use tower_lsp_server::ls_types::request::Request;

use crate::delegation::BackendTransport;

const LOG_TARGET: &str = "utsushi::lsp::transport";

/// [`BackendTransport`] over the LSP client connection.
#[derive(Debug, Clone)]
pub struct LspClientTransport {
    client: Client,
}

impl LspClientTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl BackendTransport for LspClientTransport {
    async fn send_request<R: Request>(
        &self,
        params: R::Params,
        token: &CancellationToken,
    ) -> Option<R::Result> {
        tokio::select! {
            _ = token.cancelled() => None,
            result = self.client.send_request::<R>(params) => match result {
                Ok(response) => Some(response),
                Err(err) => {
                    log::debug!(target: LOG_TARGET, "{} failed: {}", R::METHOD, err);
                    None
                }
            },
        }
    }
}
