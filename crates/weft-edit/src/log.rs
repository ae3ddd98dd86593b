//! Ordered store of trunk and local commits.
//!
//! # Invariants
//!
//! - Trunk sequence numbers are contiguous: the commit at index `i` carries
//!   sequence number `base + i + 1`.
//! - The trunk is append-only; only its oldest end is ever removed (trim).
//! - Local commits are removed only from the front, in submission order.

use std::collections::VecDeque;

use tracing::debug;
use weft_types::{Commit, RevisionTag, SequenceNumber, SequencedCommit};

use crate::error::{EditError, EditResult};

/// Trunk of sequenced commits plus the local branch awaiting sequencing.
#[derive(Clone, Debug)]
pub struct EditLog<C> {
    trunk: VecDeque<SequencedCommit<C>>,
    /// Sequence number of the newest commit no longer retained (or the
    /// initial sequence number if nothing was trimmed).
    base: SequenceNumber,
    local: VecDeque<Commit<C>>,
}

impl<C> EditLog<C> {
    /// Create an empty log whose trunk starts after `base`.
    pub fn new(base: SequenceNumber) -> Self {
        Self {
            trunk: VecDeque::new(),
            base,
            local: VecDeque::new(),
        }
    }

    // ---------------------------------------------------------------
    // Trunk
    // ---------------------------------------------------------------

    /// Sequence number of the newest trunk commit.
    pub fn head(&self) -> SequenceNumber {
        self.trunk
            .back()
            .map(|c| c.sequence_number)
            .unwrap_or(self.base)
    }

    /// Sequence number below which trunk history has been discarded.
    pub fn base(&self) -> SequenceNumber {
        self.base
    }

    pub fn trunk_len(&self) -> usize {
        self.trunk.len()
    }

    pub fn trunk(&self) -> impl DoubleEndedIterator<Item = &SequencedCommit<C>> {
        self.trunk.iter()
    }

    /// Trunk commits with `after < seq <= through`.
    ///
    /// Both bounds are clamped to the retained window.
    pub fn trunk_between(
        &self,
        after: SequenceNumber,
        through: SequenceNumber,
    ) -> impl Iterator<Item = &SequencedCommit<C>> {
        let start = self.offset(after);
        let end = self.offset(through).max(start);
        self.trunk.range(start..end)
    }

    /// Position of a trunk commit by revision.
    pub fn trunk_position(&self, revision: &RevisionTag) -> Option<usize> {
        self.trunk.iter().position(|c| &c.commit.revision == revision)
    }

    /// Trunk commits strictly after the given index.
    pub fn trunk_after_index(&self, index: usize) -> impl Iterator<Item = &SequencedCommit<C>> {
        self.trunk.iter().skip(index + 1)
    }

    pub fn trunk_at(&self, index: usize) -> Option<&SequencedCommit<C>> {
        self.trunk.get(index)
    }

    /// Append a commit to the trunk. Its sequence number must be exactly one
    /// past the current head.
    pub fn push_trunk(&mut self, commit: SequencedCommit<C>) -> EditResult<()> {
        let expected = self.head().next()?;
        if commit.sequence_number != expected {
            return Err(EditError::SequenceGap {
                expected,
                received: commit.sequence_number,
            });
        }
        self.trunk.push_back(commit);
        Ok(())
    }

    /// Discard trunk commits with sequence number `<= through`, returning
    /// their revisions oldest first.
    pub fn trim_through(&mut self, through: SequenceNumber) -> Vec<RevisionTag> {
        let head = self.head();
        let count = self.offset(through);
        let released: Vec<RevisionTag> = self
            .trunk
            .drain(..count)
            .map(|c| c.commit.revision)
            .collect();
        if through > self.base {
            self.base = through.min(head);
        }
        if !released.is_empty() {
            debug!(count = released.len(), base = %self.base, "trimmed trunk");
        }
        released
    }

    /// Number of retained trunk commits with sequence number `<= seq`.
    fn offset(&self, seq: SequenceNumber) -> usize {
        let distance = seq.get().saturating_sub(self.base.get());
        usize::try_from(distance)
            .unwrap_or(usize::MAX)
            .min(self.trunk.len())
    }

    // ---------------------------------------------------------------
    // Local branch
    // ---------------------------------------------------------------

    pub fn local(&self) -> impl DoubleEndedIterator<Item = &Commit<C>> + ExactSizeIterator {
        self.local.iter()
    }

    pub fn local_mut(&mut self) -> impl Iterator<Item = &mut Commit<C>> {
        self.local.iter_mut()
    }

    pub fn local_len(&self) -> usize {
        self.local.len()
    }

    pub fn push_local(&mut self, commit: Commit<C>) {
        self.local.push_back(commit);
    }

    pub fn oldest_local(&self) -> Option<&Commit<C>> {
        self.local.front()
    }

    pub fn pop_local(&mut self) -> Option<Commit<C>> {
        self.local.pop_front()
    }

    pub fn local_position(&self, revision: &RevisionTag) -> Option<usize> {
        self.local.iter().position(|c| &c.revision == revision)
    }
}

#[cfg(test)]
mod tests {
    use weft_types::SessionId;

    use super::*;

    fn sequenced(seq: u64, change: u32) -> SequencedCommit<u32> {
        SequencedCommit {
            commit: Commit::new(RevisionTag::mint(), SessionId::from_u128(1), change),
            sequence_number: SequenceNumber::new(seq),
            reference_sequence_number: SequenceNumber::new(seq - 1),
        }
    }

    #[test]
    fn push_trunk_requires_contiguous_sequence_numbers() {
        let mut log = EditLog::new(SequenceNumber::ZERO);
        log.push_trunk(sequenced(1, 10)).unwrap();
        log.push_trunk(sequenced(2, 20)).unwrap();
        assert_eq!(log.head(), SequenceNumber::new(2));

        let err = log.push_trunk(sequenced(4, 40)).unwrap_err();
        assert_eq!(
            err,
            EditError::SequenceGap {
                expected: SequenceNumber::new(3),
                received: SequenceNumber::new(4),
            }
        );

        let err = log.push_trunk(sequenced(2, 20)).unwrap_err();
        assert!(matches!(err, EditError::SequenceGap { .. }));
    }

    #[test]
    fn log_can_start_after_snapshot() {
        let mut log = EditLog::new(SequenceNumber::new(10));
        assert_eq!(log.head(), SequenceNumber::new(10));
        log.push_trunk(sequenced(11, 1)).unwrap();
        assert_eq!(log.trunk_len(), 1);
    }

    #[test]
    fn trunk_between_is_half_open() {
        let mut log = EditLog::new(SequenceNumber::ZERO);
        for seq in 1..=5 {
            log.push_trunk(sequenced(seq, seq as u32)).unwrap();
        }
        let changes: Vec<u32> = log
            .trunk_between(SequenceNumber::new(1), SequenceNumber::new(3))
            .map(|c| c.commit.change)
            .collect();
        assert_eq!(changes, vec![2, 3]);

        let none: Vec<_> = log
            .trunk_between(SequenceNumber::new(4), SequenceNumber::new(2))
            .collect();
        assert!(none.is_empty());
    }

    #[test]
    fn trim_discards_old_commits_and_moves_base() {
        let mut log = EditLog::new(SequenceNumber::ZERO);
        for seq in 1..=4 {
            log.push_trunk(sequenced(seq, seq as u32)).unwrap();
        }
        let released = log.trim_through(SequenceNumber::new(2));
        assert_eq!(released.len(), 2);
        assert_eq!(log.base(), SequenceNumber::new(2));
        assert_eq!(log.trunk_len(), 2);
        assert_eq!(log.head(), SequenceNumber::new(4));

        let changes: Vec<u32> = log
            .trunk_between(SequenceNumber::new(2), SequenceNumber::new(4))
            .map(|c| c.commit.change)
            .collect();
        assert_eq!(changes, vec![3, 4]);

        log.push_trunk(sequenced(5, 5)).unwrap();
    }

    #[test]
    fn trimming_everything_keeps_head() {
        let mut log = EditLog::new(SequenceNumber::ZERO);
        log.push_trunk(sequenced(1, 1)).unwrap();
        log.trim_through(SequenceNumber::new(1));
        assert_eq!(log.trunk_len(), 0);
        assert_eq!(log.head(), SequenceNumber::new(1));
        log.push_trunk(sequenced(2, 2)).unwrap();
    }

    #[test]
    fn local_branch_is_fifo() {
        let mut log: EditLog<u32> = EditLog::new(SequenceNumber::ZERO);
        let first = Commit::new(RevisionTag::mint(), SessionId::from_u128(1), 1);
        let second = Commit::new(RevisionTag::mint(), SessionId::from_u128(1), 2);
        log.push_local(first.clone());
        log.push_local(second.clone());

        assert_eq!(log.local_position(&second.revision), Some(1));
        assert_eq!(log.oldest_local(), Some(&first));
        assert_eq!(log.pop_local(), Some(first));
        assert_eq!(log.local_len(), 1);
    }
}
