//! Request delegation: resolve a host position, forward the request to the
//! backend that owns it and map the answer back.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tower_lsp_server::ls_types::request::Request;

use super::handler::{DelegatedRequestHandler, RequestContext, Response};
use super::projection::compute_projection;
use crate::config::SettingsManager;
use crate::document::{DocumentCompiler, DocumentKey, LanguageKind};
use crate::sync::{Dispatcher, ResolvedDocument};

const LOG_TARGET: &str = "utsushi::delegation";

/// Request/response channel to the embedded-language backends.
///
/// Responses are correlated by awaiting the call. None means the backend had
/// no answer, failed, or was cancelled through `token`.
pub trait BackendTransport: Send + Sync + 'static {
    fn send_request<R: Request>(
        &self,
        params: R::Params,
        token: &CancellationToken,
    ) -> impl Future<Output = Option<R::Result>> + Send;
}

/// Looks up the current state of a document.
pub trait DocumentResolver: Send + Sync + 'static {
    fn resolve(&self, key: DocumentKey) -> impl Future<Output = Option<ResolvedDocument>> + Send;
}

impl DocumentResolver for Dispatcher {
    async fn resolve(&self, key: DocumentKey) -> Option<ResolvedDocument> {
        Dispatcher::resolve(self, key).await
    }
}

/// Runs the delegation protocol for any [`DelegatedRequestHandler`].
///
/// Every failure along the way yields None; delegation never surfaces an
/// error to the caller.
pub struct RequestDelegator<D, T, C> {
    resolver: D,
    transport: T,
    compiler: Arc<C>,
    settings: Arc<SettingsManager>,
}

impl<D, T, C> RequestDelegator<D, T, C>
where
    D: DocumentResolver,
    T: BackendTransport,
    C: DocumentCompiler,
{
    pub fn new(
        resolver: D,
        transport: T,
        compiler: Arc<C>,
        settings: Arc<SettingsManager>,
    ) -> Self {
        Self {
            resolver,
            transport,
            compiler,
            settings,
        }
    }

    pub async fn delegate<H: DelegatedRequestHandler>(
        &self,
        handler: &H,
        key: DocumentKey,
        params: H::Params,
        token: &CancellationToken,
    ) -> Option<Response<H>> {
        let context = self.request_context(handler, key, &params).await?;

        if let Some(local) = handler.try_handle(&params, &context).await {
            return Some(local);
        }

        let settings = self.settings.load_settings();
        if !settings.delegation_enabled {
            log::trace!(target: LOG_TARGET, "Delegation disabled; no answer for {}", context.key);
            return None;
        }
        if context.projection.language_kind == LanguageKind::Host {
            return None;
        }

        let delegated = handler.create_delegated_params(&params, &context)?;
        let method = <H::Delegated as Request>::METHOD;

        let response: Option<Response<H>> = tokio::select! {
            _ = token.cancelled() => {
                log::debug!(target: LOG_TARGET, "{} cancelled for {}", method, context.key);
                None
            }
            result = tokio::time::timeout(
                settings.delegation_timeout,
                self.transport.send_request::<H::Delegated>(delegated, token),
            ) => match result {
                Ok(response) => response,
                Err(_) => {
                    log::debug!(
                        target: LOG_TARGET,
                        "{} timed out after {:?} for {}",
                        method,
                        settings.delegation_timeout,
                        context.key
                    );
                    None
                }
            },
        };

        handler.remap_response(response?, &context)
    }

    async fn request_context<H: DelegatedRequestHandler>(
        &self,
        handler: &H,
        key: DocumentKey,
        params: &H::Params,
    ) -> Option<RequestContext> {
        let Some(resolved) = self.resolver.resolve(key.clone()).await else {
            log::debug!(target: LOG_TARGET, "{} is not open; no answer", key);
            return None;
        };

        let code_document = match resolved.code_document {
            Some(code_document) => code_document,
            None => {
                // Not generated yet: compile this snapshot now. The result is
                // memoized on the snapshot, so the queue will not compile it
                // again.
                let snapshot = Arc::clone(&resolved.snapshot);
                let compiler = Arc::clone(&self.compiler);
                match tokio::task::spawn_blocking(move || snapshot.code_document(compiler.as_ref()))
                    .await
                {
                    Ok(code_document) => code_document,
                    Err(err) => {
                        log::error!(target: LOG_TARGET, "Compiling {} failed: {}", key, err);
                        return None;
                    }
                }
            }
        };

        let projection = compute_projection(
            &code_document,
            handler.position(params),
            H::RIGHT_ASSOCIATIVE,
            H::NEXT_POSITION_ON_FAILURE,
        )?;

        Some(RequestContext {
            key,
            snapshot: resolved.snapshot,
            code_document,
            projection,
        })
    }
}
