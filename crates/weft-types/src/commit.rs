use serde::{Deserialize, Serialize};

use crate::identity::SessionId;
use crate::revision::RevisionTag;
use crate::sequence::SequenceNumber;

/// The atomic unit stored in a branch: a change paired with its identity.
///
/// The change itself is opaque to everything except the datatype's
/// rebaser. A commit's identity never changes; its change is rewritten
/// whenever the branch holding it is rebased.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit<C> {
    pub revision: RevisionTag,
    pub session_id: SessionId,
    pub change: C,
}

impl<C> Commit<C> {
    pub fn new(revision: RevisionTag, session_id: SessionId, change: C) -> Self {
        Self {
            revision,
            session_id,
            change,
        }
    }

    /// Replace the change, keeping the commit's identity.
    pub fn with_change<D>(self, change: D) -> Commit<D> {
        Commit {
            revision: self.revision,
            session_id: self.session_id,
            change,
        }
    }
}

/// A commit that has been accepted onto the trunk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencedCommit<C> {
    pub commit: Commit<C>,
    pub sequence_number: SequenceNumber,
    pub reference_sequence_number: SequenceNumber,
}

impl<C> SequencedCommit<C> {
    pub fn revision(&self) -> RevisionTag {
        self.commit.revision
    }

    pub fn session_id(&self) -> SessionId {
        self.commit.session_id
    }

    pub fn change(&self) -> &C {
        &self.commit.change
    }
}
