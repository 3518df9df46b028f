use std::future::Future;
use std::sync::Arc;

use tower_lsp_server::ls_types::request::Request;
use tower_lsp_server::ls_types::{Position, Range, TextEdit};

use super::projection::Projection;
use crate::document::{CodeDocument, DocumentKey, DocumentSnapshot, GeneratedDocument};
use crate::mapping::{MappingBehavior, get_host_document_text_edits, try_map_to_host_range};

/// Everything a handler hook may need about the document behind a request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub key: DocumentKey,
    pub snapshot: Arc<DocumentSnapshot>,
    pub code_document: Arc<CodeDocument>,
    pub projection: Projection,
}

impl RequestContext {
    /// The projection owning the request position, if not the host language.
    pub fn generated(&self) -> Option<&GeneratedDocument> {
        self.projection
            .projection_kind()
            .map(|kind| self.code_document.generated(kind))
    }

    /// Map a range reported by the backend back to the host document.
    pub fn map_range_to_host(&self, range: Range, behavior: MappingBehavior) -> Option<Range> {
        try_map_to_host_range(self.generated()?, range, behavior)
    }

    /// Map a position reported by the backend back to the host document.
    pub fn map_position_to_host(&self, position: Position) -> Option<Position> {
        crate::mapping::map_position_to_host(self.generated()?, position).map(|(_, host)| host)
    }

    /// Map backend edits back to the host document, dropping the unmappable.
    pub fn map_edits_to_host(&self, edits: &[TextEdit]) -> Vec<TextEdit> {
        self.generated()
            .map(|generated| get_host_document_text_edits(generated, edits))
            .unwrap_or_default()
    }
}

/// The backend result type of a handler.
pub type Response<H> = <<H as DelegatedRequestHandler>::Delegated as Request>::Result;

/// A request that is answered locally or forwarded to the backend owning the
/// request position.
///
/// Only [`position`](Self::position) and
/// [`create_delegated_params`](Self::create_delegated_params) are required;
/// the other hooks default to "no local answer" and "response needs no
/// remapping".
pub trait DelegatedRequestHandler: Send + Sync {
    type Params: Send + Sync;
    /// The request sent to the backend.
    type Delegated: Request;

    /// Prefer the span starting at the position over the one ending there.
    const RIGHT_ASSOCIATIVE: bool = false;
    /// Accept the next mapping on the same line when the position itself is
    /// unmapped.
    const NEXT_POSITION_ON_FAILURE: bool = false;

    fn position(&self, params: &Self::Params) -> Position;

    /// Answer without a backend round trip. `Some` short-circuits delegation.
    fn try_handle(
        &self,
        _params: &Self::Params,
        _context: &RequestContext,
    ) -> impl Future<Output = Option<<Self::Delegated as Request>::Result>> + Send {
        async { None }
    }

    /// Build the backend request, or decline with None.
    fn create_delegated_params(
        &self,
        params: &Self::Params,
        context: &RequestContext,
    ) -> Option<<Self::Delegated as Request>::Params>;

    /// Translate the backend's answer into host coordinates.
    fn remap_response(
        &self,
        response: <Self::Delegated as Request>::Result,
        _context: &RequestContext,
    ) -> Option<<Self::Delegated as Request>::Result> {
        Some(response)
    }
}
