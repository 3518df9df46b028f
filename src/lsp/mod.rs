//! LSP front end: text synchronization in, buffer updates and delegated
//! requests out.

mod notifications;
mod server;
mod transport;

use std::sync::Arc;

use tokio::io::{stdin, stdout};
use tower_lsp_server::{LspService, Server};

use crate::document::DocumentCompiler;

pub use notifications::{UpdateCodeBuffer, UpdateMarkupBuffer};
pub use server::Utsushi;
pub use transport::LspClientTransport;

/// Run a [`Utsushi`] server over stdin/stdout until the client disconnects.
///
/// Logging goes to stderr; see [`init_logging`](crate::init_logging).
pub async fn serve_stdio<C: DocumentCompiler>(compiler: Arc<C>) {
    crate::init_logging();
    let (service, socket) = LspService::new(move |client| Utsushi::new(client, compiler));
    Server::new(stdin(), stdout(), socket).serve(service).await;
}
