use std::collections::HashMap;

use tracing::trace;
use weft_types::RevisionTag;

/// Retention hook for the trunk form of sequenced changes.
///
/// The edit manager calls [`capture`](Self::capture) when a commit lands on
/// the trunk and [`release`](Self::release) once the trunk has been trimmed
/// past it, so a store holds exactly the retained trunk. The manager never
/// reads from it; undo layers and constraint checks outside the manager read
/// through the concrete store type (see [`RecordingRepairStore::get`]).
/// Reverting a trimmed revision is not possible because the trunk commits
/// after it are gone.
pub trait RepairDataStoreProvider<C> {
    fn capture(&mut self, revision: RevisionTag, change: &C);

    fn release(&mut self, revisions: &[RevisionTag]);
}

/// A provider that keeps nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRepairData;

impl<C> RepairDataStoreProvider<C> for NoRepairData {
    fn capture(&mut self, _revision: RevisionTag, _change: &C) {}

    fn release(&mut self, _revisions: &[RevisionTag]) {}
}

/// A provider that records every captured change by revision.
#[derive(Clone, Debug)]
pub struct RecordingRepairStore<C> {
    entries: HashMap<RevisionTag, C>,
}

impl<C> Default for RecordingRepairStore<C> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<C> RecordingRepairStore<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, revision: &RevisionTag) -> Option<&C> {
        self.entries.get(revision)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<C: Clone> RepairDataStoreProvider<C> for RecordingRepairStore<C> {
    fn capture(&mut self, revision: RevisionTag, change: &C) {
        self.entries.insert(revision, change.clone());
    }

    fn release(&mut self, revisions: &[RevisionTag]) {
        for revision in revisions {
            self.entries.remove(revision);
        }
        trace!(
            released = revisions.len(),
            retained = self.entries.len(),
            "released repair data"
        );
    }
}
