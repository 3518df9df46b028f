//! Bounded per-document version history.
//!
//! Entries hold [`SnapshotId`]s rather than snapshots, so history never keeps
//! document text alive. Each document key owns one row in a slot arena; a
//! removed key's slot is recycled, and the process-wide generation counter
//! keeps ids from a recycled slot distinct.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::document::{DocumentKey, DocumentSnapshot, ProjectKey, SnapshotId};

/// Versions retained per document key; older entries become unresolvable.
pub const MAX_TRACKING_COUNT: usize = 20;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionCacheEntry {
    pub snapshot: SnapshotId,
    pub version: i32,
}

#[derive(Debug)]
struct Row {
    key: DocumentKey,
    entries: VecDeque<VersionCacheEntry>,
}

/// Version history for every tracked document.
///
/// Owned by the dispatch task; not shared.
#[derive(Debug, Default)]
pub struct VersionCache {
    rows: Vec<Option<Row>>,
    free_slots: Vec<u32>,
    slots: HashMap<DocumentKey, u32>,
}

impl VersionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh snapshot id for `key`, creating its row if needed.
    pub fn allocate(&mut self, key: &DocumentKey) -> SnapshotId {
        let slot = match self.slots.get(key) {
            Some(&slot) => slot,
            None => self.open_row(key.clone()),
        };
        SnapshotId {
            slot,
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
        }
    }

    fn open_row(&mut self, key: DocumentKey) -> u32 {
        let row = Row {
            key: key.clone(),
            entries: VecDeque::with_capacity(MAX_TRACKING_COUNT),
        };
        let slot = match self.free_slots.pop() {
            Some(slot) => {
                self.rows[slot as usize] = Some(row);
                slot
            }
            None => {
                self.rows.push(Some(row));
                (self.rows.len() - 1) as u32
            }
        };
        self.slots.insert(key, slot);
        slot
    }

    fn row(&self, snapshot: &DocumentSnapshot) -> Option<&Row> {
        self.rows
            .get(snapshot.id().slot as usize)?
            .as_ref()
            .filter(|row| &row.key == snapshot.key())
    }

    fn row_mut(&mut self, snapshot: &DocumentSnapshot) -> Option<&mut Row> {
        self.rows
            .get_mut(snapshot.id().slot as usize)?
            .as_mut()
            .filter(|row| &row.key == snapshot.key())
    }

    /// Record that `snapshot` is at `version`, evicting the oldest entry once
    /// the row holds [`MAX_TRACKING_COUNT`].
    pub fn track_version(&mut self, snapshot: &DocumentSnapshot, version: i32) {
        let Some(row) = self.row_mut(snapshot) else {
            log::debug!(
                target: "utsushi::version_cache",
                "Ignoring version {} for untracked {}",
                version,
                snapshot.key()
            );
            return;
        };
        if row.entries.len() == MAX_TRACKING_COUNT {
            row.entries.pop_front();
        }
        row.entries.push_back(VersionCacheEntry {
            snapshot: snapshot.id(),
            version,
        });
    }

    /// The newest version this exact snapshot was tracked under.
    pub fn try_get_version(&self, snapshot: &DocumentSnapshot) -> Option<i32> {
        self.row(snapshot)?
            .entries
            .iter()
            .rev()
            .find(|entry| entry.snapshot == snapshot.id())
            .map(|entry| entry.version)
    }

    /// Newest version tracked for `key`.
    pub fn latest_version(&self, key: &DocumentKey) -> Option<i32> {
        let slot = *self.slots.get(key)?;
        let row = self.rows.get(slot as usize)?.as_ref()?;
        row.entries.back().map(|entry| entry.version)
    }

    /// Track a re-created snapshot under the newest known version of its key.
    ///
    /// Used when a project-wide or import change invalidates a document
    /// without changing its text.
    pub fn mark_as_latest_version(&mut self, snapshot: &DocumentSnapshot) {
        match self.latest_version(snapshot.key()) {
            Some(latest) => self.track_version(snapshot, latest),
            None => log::debug!(
                target: "utsushi::version_cache",
                "No version known for {}; not marking",
                snapshot.key()
            ),
        }
    }

    /// Number of retained entries for `key`.
    pub fn tracked_count(&self, key: &DocumentKey) -> usize {
        self.slots
            .get(key)
            .and_then(|&slot| self.rows.get(slot as usize))
            .and_then(Option::as_ref)
            .map_or(0, |row| row.entries.len())
    }

    /// Keys of every tracked document in `project`.
    pub fn keys_in_project(&self, project: &ProjectKey) -> Vec<DocumentKey> {
        let mut keys: Vec<DocumentKey> = self
            .slots
            .keys()
            .filter(|key| &key.project == project)
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Drop the history of `key` and recycle its slot.
    pub fn remove(&mut self, key: &DocumentKey) {
        if let Some(slot) = self.slots.remove(key) {
            self.rows[slot as usize] = None;
            self.free_slots.push(slot);
        }
    }
}
