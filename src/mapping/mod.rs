//! Document mapping service.
//!
//! Translates positions, ranges and edits between a host document and its
//! generated projections, and classifies host positions by owning language.
//! Every function here is pure over an immutable [`CodeDocument`] or
//! [`GeneratedDocument`]; failure to map is `None`, never an error.
//!
//! [`CodeDocument`]: crate::document::CodeDocument
//! [`GeneratedDocument`]: crate::document::GeneratedDocument

mod edits;
mod language_kind;
mod position;
mod range;

pub use edits::{get_host_document_edits, get_host_document_text_edits};
pub use language_kind::get_language_kind;
pub use position::{
    map_position_to_generated, map_position_to_host, try_map_to_generated_or_next_position,
    try_map_to_generated_position, try_map_to_host_position,
};
pub use range::{MappingBehavior, try_map_to_host_range};
