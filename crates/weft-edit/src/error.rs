//! Error types for the edit manager.

use weft_types::{RevisionTag, SequenceNumber, SessionId, TypeError};

/// Errors produced by edit log and edit manager operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    /// A sequenced commit did not arrive exactly one past the trunk head.
    #[error("sequence gap: expected {expected}, received {received}")]
    SequenceGap {
        expected: SequenceNumber,
        received: SequenceNumber,
    },

    /// A reference sequence number points outside the retained trunk.
    #[error("reference sequence number {reference} outside trunk window [{base}, {head}]")]
    ReferenceOutOfRange {
        reference: SequenceNumber,
        base: SequenceNumber,
        head: SequenceNumber,
    },

    /// A peer's reference sequence number moved backwards.
    #[error("reference sequence number for session {session} regressed from {previous} to {reference}")]
    ReferenceRegressed {
        session: SessionId,
        previous: SequenceNumber,
        reference: SequenceNumber,
    },

    /// A local commit was acknowledged out of submission order.
    #[error("local commit {received} acknowledged out of order (expected {expected:?})")]
    LocalAckMismatch {
        expected: Option<RevisionTag>,
        received: RevisionTag,
    },

    /// The trunk disagrees with what a peer is known to have submitted.
    #[error("peer branch for session {session} diverged at revision {revision}")]
    PeerBranchDiverged {
        session: SessionId,
        revision: RevisionTag,
    },

    /// The minimum sequence number overtook the trunk head.
    #[error("minimum sequence number {minimum} is ahead of trunk head {head}")]
    MinimumAheadOfHead {
        minimum: SequenceNumber,
        head: SequenceNumber,
    },

    /// The revision is neither on the trunk nor on the local branch.
    #[error("unknown revision {0}")]
    UnknownRevision(RevisionTag),

    /// A local edit reused a revision already on the trunk or local branch.
    #[error("revision {0} is already known")]
    DuplicateRevision(RevisionTag),

    /// The manager was closed by an earlier fatal error.
    #[error("edit manager closed after a fatal consistency error")]
    Closed,

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl EditError {
    /// Returns `true` if the error breaks the single total order and the
    /// hosting session must close.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::UnknownRevision(_) | Self::DuplicateRevision(_))
    }
}

/// Convenience alias for edit manager results.
pub type EditResult<T> = Result<T, EditError>;
