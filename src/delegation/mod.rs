//! Delegation protocol.
//!
//! Each request goes through the same steps:
//!
//! 1. resolve the document through the dispatch task
//! 2. compute the [`Projection`] of the request position
//! 3. let the handler answer locally
//! 4. stop if delegation is disabled or the host language owns the position
//! 5. let the handler build the backend request
//! 6. send it, racing cancellation and a timeout
//! 7. let the handler remap the response into host coordinates

mod delegator;
mod handler;
mod projection;

pub use delegator::{BackendTransport, DocumentResolver, RequestDelegator};
pub use handler::{DelegatedRequestHandler, RequestContext, Response};
pub use projection::{Projection, compute_projection};
