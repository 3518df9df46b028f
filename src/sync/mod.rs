//! Synchronization pipeline.
//!
//! ```text
//! edit ─► Dispatcher ─► version cache ─► RegenerationQueue (debounce)
//!                                            │ compile off-task
//!              publisher ◄─ Flush batch ◄────┘
//!                  │
//!                  └─► BufferUpdateSink (one update per changed buffer)
//! ```

pub mod debounce;
pub mod diff;
pub mod dispatch;
pub mod publisher;
pub mod version_cache;

pub use debounce::{GeneratedOutput, RegenerationQueue};
pub use diff::minimal_text_changes;
pub use dispatch::{
    ContentChange, DispatchCommand, Dispatcher, DocumentChange, DocumentObserver, FileChangeKind,
    ResolvedDocument,
};
pub use publisher::{
    BufferUpdate, BufferUpdateSink, GeneratedDocumentPublisher, PublishedBufferState,
};
pub use version_cache::{MAX_TRACKING_COUNT, VersionCache, VersionCacheEntry};
