//! Document identity, snapshots and the compiler seam.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use super::code_document::CodeDocument;

/// Opaque identifier of the project a document is compiled in.
///
/// The empty key is the miscellaneous project for files outside every
/// workspace folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ProjectKey(String);

impl ProjectKey {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn miscellaneous() -> Self {
        Self::default()
    }

    pub fn id(&self) -> &str {
        &self.0
    }

    pub fn is_miscellaneous(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_miscellaneous() {
            f.write_str("<misc>")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// A host document within a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey {
    pub project: ProjectKey,
    pub file_path: PathBuf,
}

impl DocumentKey {
    pub fn new(project: ProjectKey, file_path: impl Into<PathBuf>) -> Self {
        Self {
            project,
            file_path: file_path.into(),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.file_path.display(), self.project)
    }
}

/// Identity of one snapshot instance.
///
/// `slot` indexes the per-key row of the version cache; `generation` comes
/// from a process-wide counter and is never reused, so an id stays unique even
/// after its slot is recycled for another document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnapshotId {
    pub(crate) slot: u32,
    pub(crate) generation: u64,
}

impl SnapshotId {
    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Produces the compiled projections of a host document.
///
/// Implementations must be deterministic for a given text and project
/// configuration. Compilation can be expensive; [`DocumentSnapshot`] memoizes
/// the result so it runs at most once per snapshot.
pub trait DocumentCompiler: Send + Sync + 'static {
    fn compile(&self, snapshot: &DocumentSnapshot) -> CodeDocument;
}

/// One version of a host document's text.
///
/// Identity is the [`SnapshotId`], not the text: two snapshots with equal text
/// are still different points in history.
#[derive(Debug)]
pub struct DocumentSnapshot {
    id: SnapshotId,
    key: DocumentKey,
    version: i32,
    text: Arc<str>,
    code_document: OnceLock<Arc<CodeDocument>>,
}

impl DocumentSnapshot {
    /// Create a snapshot. Ids come from
    /// [`VersionCache::allocate`](crate::sync::VersionCache::allocate).
    pub fn new(id: SnapshotId, key: DocumentKey, version: i32, text: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            key,
            version,
            text: text.into(),
            code_document: OnceLock::new(),
        }
    }

    pub fn id(&self) -> SnapshotId {
        self.id
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn shared_text(&self) -> Arc<str> {
        Arc::clone(&self.text)
    }

    /// The compiled document, compiling on first use.
    pub fn code_document<C: DocumentCompiler + ?Sized>(&self, compiler: &C) -> Arc<CodeDocument> {
        Arc::clone(
            self.code_document
                .get_or_init(|| Arc::new(compiler.compile(self))),
        )
    }

    /// The compiled document if it has already been produced.
    pub fn compiled(&self) -> Option<Arc<CodeDocument>> {
        self.code_document.get().cloned()
    }

    pub fn is_same_snapshot(&self, other: &DocumentSnapshot) -> bool {
        self.id == other.id
    }
}
