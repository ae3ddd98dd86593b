//! Branch rebasing helpers shared by the local branch and peer branches.

use std::collections::VecDeque;

use weft_rebase::ChangeRebaser;
use weft_types::{Commit, SequenceNumber, SequencedCommit, SessionId};

use crate::error::{EditError, EditResult};

/// Rebase every commit of a branch over `over`, returning `over` transformed
/// past the whole branch.
///
/// `over` and the branch's first commit must share an input state. After the
/// call each commit applies after `over`, and the returned change applies
/// after the (original) branch.
pub fn rebase_branch_over<'a, R, I>(rebaser: &R, commits: I, over: &R::Change) -> R::Change
where
    R: ChangeRebaser,
    R::Change: 'a,
    I: IntoIterator<Item = &'a mut Commit<R::Change>>,
{
    let mut over = over.clone();
    for commit in commits {
        let rebased = rebaser.rebase(&commit.change, &over);
        over = rebaser.rebase(&over, &commit.change);
        commit.change = rebased;
    }
    over
}

/// A remote session's view of the document: the trunk up to `base` plus the
/// commits that session had submitted but not yet seen sequenced.
#[derive(Clone, Debug)]
pub struct PeerBranch<C> {
    pub session: SessionId,
    pub base: SequenceNumber,
    pub commits: VecDeque<Commit<C>>,
}

impl<C: Clone> PeerBranch<C> {
    pub fn new(session: SessionId, base: SequenceNumber) -> Self {
        Self {
            session,
            base,
            commits: VecDeque::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    /// Move the branch base forward over the given trunk commits, which must
    /// be exactly those sequenced after `base`, in order.
    ///
    /// Trunk commits authored by this session must match the front of the
    /// branch and are removed from it; all others are rebased under the
    /// branch.
    pub fn advance<'a, R, I>(&mut self, rebaser: &R, trunk: I) -> EditResult<()>
    where
        R: ChangeRebaser<Change = C>,
        C: 'a,
        I: IntoIterator<Item = &'a SequencedCommit<C>>,
    {
        for sequenced in trunk {
            if sequenced.session_id() == self.session {
                match self.commits.front() {
                    Some(front) if front.revision == sequenced.revision() => {
                        self.commits.pop_front();
                    }
                    _ => {
                        return Err(EditError::PeerBranchDiverged {
                            session: self.session,
                            revision: sequenced.revision(),
                        })
                    }
                }
            } else {
                rebase_branch_over(rebaser, self.commits.iter_mut(), sequenced.change());
            }
            self.base = sequenced.sequence_number;
        }
        Ok(())
    }
}
