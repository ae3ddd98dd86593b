//! Rebase orchestration between the trunk, the local branch, and peers.
//!
//! The manager tracks three things:
//!
//! 1. The trunk: sequenced commits in their final (trunk) form.
//! 2. The local branch: this session's unsequenced commits, always rebased so
//!    their base is the trunk head.
//! 3. One peer branch per remote session: what that session's own local
//!    branch looked like when it submitted its latest commit. A peer commit
//!    is authored against `trunk[..=ref] ∘ peer_branch`; advancing a copy of
//!    the peer branch to the trunk head yields the commit's trunk form.
//!
//! Every sequenced commit either lands a local commit (no visible change) or
//! produces a delta: the trunk commit transformed past the whole local
//! branch, which is what the local view has to apply.

use std::collections::HashMap;

use tracing::{debug, error, info};
use weft_rebase::{ChangeRebaser, NoRepairData, RepairDataStoreProvider};
use weft_types::{Commit, RevisionTag, SequenceNumber, SequencedCommit, SessionId};

use crate::branch::{rebase_branch_over, PeerBranch};
use crate::config::EditManagerConfig;
use crate::error::{EditError, EditResult};
use crate::log::EditLog;

/// Maintains the trunk and local branch of one session.
pub struct EditManager<R, S = NoRepairData>
where
    R: ChangeRebaser,
{
    rebaser: R,
    session_id: SessionId,
    config: EditManagerConfig,
    log: EditLog<R::Change>,
    peers: HashMap<SessionId, PeerBranch<R::Change>>,
    minimum_sequence_number: SequenceNumber,
    repair: S,
    closed: bool,
}

impl<R: ChangeRebaser> EditManager<R, NoRepairData> {
    pub fn new(rebaser: R, session_id: SessionId, config: EditManagerConfig) -> Self {
        Self::with_repair_store(rebaser, session_id, config, NoRepairData)
    }
}

impl<R, S> EditManager<R, S>
where
    R: ChangeRebaser,
    S: RepairDataStoreProvider<R::Change>,
{
    pub fn with_repair_store(
        rebaser: R,
        session_id: SessionId,
        config: EditManagerConfig,
        repair: S,
    ) -> Self {
        let base = SequenceNumber::new(config.initial_sequence_number);
        Self {
            rebaser,
            session_id,
            log: EditLog::new(base),
            peers: HashMap::new(),
            minimum_sequence_number: base,
            repair,
            closed: false,
            config,
        }
    }

    // ---------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn rebaser(&self) -> &R {
        &self.rebaser
    }

    pub fn config(&self) -> &EditManagerConfig {
        &self.config
    }

    pub fn head_sequence_number(&self) -> SequenceNumber {
        self.log.head()
    }

    pub fn trunk_base(&self) -> SequenceNumber {
        self.log.base()
    }

    pub fn minimum_sequence_number(&self) -> SequenceNumber {
        self.minimum_sequence_number
    }

    pub fn log(&self) -> &EditLog<R::Change> {
        &self.log
    }

    pub fn trunk(&self) -> impl DoubleEndedIterator<Item = &SequencedCommit<R::Change>> {
        self.log.trunk()
    }

    pub fn local_commits(&self) -> impl DoubleEndedIterator<Item = &Commit<R::Change>> {
        self.log.local()
    }

    pub fn local_branch_len(&self) -> usize {
        self.log.local_len()
    }

    /// Composition of every local commit, relative to the trunk head.
    pub fn local_change(&self) -> R::Change {
        let changes: Vec<R::Change> = self.log.local().map(|c| c.change.clone()).collect();
        self.rebaser.compose(&changes)
    }

    /// Number of remote sessions with a tracked branch.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn repair_store(&self) -> &S {
        &self.repair
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // ---------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------

    /// Append a change, authored against the current local tip, to the local
    /// branch.
    pub fn apply_edit(&mut self, change: R::Change) -> EditResult<RevisionTag> {
        let revision = RevisionTag::mint();
        self.apply_edit_with_revision(revision, change)?;
        Ok(revision)
    }

    /// Append a local change under an existing revision, as when a stashed
    /// commit is re-applied after a restart. Its ack will carry that revision.
    pub fn apply_edit_with_revision(
        &mut self,
        revision: RevisionTag,
        change: R::Change,
    ) -> EditResult<()> {
        self.ensure_open()?;
        if self.log.local_position(&revision).is_some()
            || self.log.trunk_position(&revision).is_some()
        {
            return Err(EditError::DuplicateRevision(revision));
        }
        self.log
            .push_local(Commit::new(revision, self.session_id, change));
        debug!(
            revision = %revision,
            local = self.log.local_len(),
            "applied local edit"
        );
        Ok(())
    }

    /// Accept a commit confirmed by the ordering service.
    ///
    /// Returns the change the local view must apply, or `None` when the
    /// commit is this session's oldest local commit landing on the trunk.
    pub fn add_sequenced_change(
        &mut self,
        commit: Commit<R::Change>,
        sequence_number: SequenceNumber,
        reference_sequence_number: SequenceNumber,
    ) -> EditResult<Option<R::Change>> {
        self.ensure_open()?;
        let result = self.integrate(commit, sequence_number, reference_sequence_number);
        self.guard(result)
    }

    /// Record a new minimum sequence number.
    ///
    /// No session will submit a commit referencing anything older, so trunk
    /// history at or below it can be discarded.
    pub fn advance_minimum_sequence_number(&mut self, minimum: SequenceNumber) -> EditResult<()> {
        self.ensure_open()?;
        let result = self.trim(minimum);
        self.guard(result)
    }

    /// Undo a trunk or local commit by applying its inverse as a new local
    /// edit. Returns the new local commit.
    pub fn revert(&mut self, revision: RevisionTag) -> EditResult<Commit<R::Change>> {
        self.ensure_open()?;
        let inverse = if let Some(index) = self.log.local_position(&revision) {
            let target = self
                .log
                .local()
                .nth(index)
                .ok_or(EditError::UnknownRevision(revision))?;
            let inverse = self.rebaser.invert(&target.change);
            self.rebaser
                .rebase_over_all(&inverse, self.log.local().skip(index + 1).map(|c| &c.change))
        } else if let Some(index) = self.log.trunk_position(&revision) {
            let target = self
                .log
                .trunk_at(index)
                .ok_or(EditError::UnknownRevision(revision))?;
            let inverse = self.rebaser.invert(target.change());
            let after_trunk = self
                .rebaser
                .rebase_over_all(&inverse, self.log.trunk_after_index(index).map(|c| c.change()));
            self.rebaser
                .rebase_over_all(&after_trunk, self.log.local().map(|c| &c.change))
        } else {
            return Err(EditError::UnknownRevision(revision));
        };

        let new_revision = self.apply_edit(inverse.clone())?;
        info!(reverted = %revision, revision = %new_revision, "reverted commit");
        Ok(Commit::new(new_revision, self.session_id, inverse))
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    fn ensure_open(&self) -> EditResult<()> {
        if self.closed {
            return Err(EditError::Closed);
        }
        Ok(())
    }

    fn guard<T>(&mut self, result: EditResult<T>) -> EditResult<T> {
        if let Err(err) = &result {
            if err.is_fatal() {
                error!(session = %self.session_id, error = %err, "edit manager closed");
                self.closed = true;
            }
        }
        result
    }

    fn integrate(
        &mut self,
        commit: Commit<R::Change>,
        sequence_number: SequenceNumber,
        reference: SequenceNumber,
    ) -> EditResult<Option<R::Change>> {
        let head = self.log.head();
        let expected = head.next()?;
        if sequence_number != expected {
            return Err(EditError::SequenceGap {
                expected,
                received: sequence_number,
            });
        }
        if reference > head || reference < self.log.base() {
            return Err(EditError::ReferenceOutOfRange {
                reference,
                base: self.log.base(),
                head,
            });
        }

        if commit.session_id == self.session_id {
            return self.land_local(commit, sequence_number, reference);
        }

        let trunk_change = self.place_peer_commit(&commit, reference)?;
        let revision = commit.revision;
        self.log.push_trunk(SequencedCommit {
            commit: commit.with_change(trunk_change.clone()),
            sequence_number,
            reference_sequence_number: reference,
        })?;
        self.repair.capture(revision, &trunk_change);

        let delta = rebase_branch_over(&self.rebaser, self.log.local_mut(), &trunk_change);
        debug!(
            seq = %sequence_number,
            revision = %revision,
            local = self.log.local_len(),
            "rebased local branch over peer commit"
        );
        Ok(Some(delta))
    }

    fn land_local(
        &mut self,
        commit: Commit<R::Change>,
        sequence_number: SequenceNumber,
        reference: SequenceNumber,
    ) -> EditResult<Option<R::Change>> {
        let expected = self.log.oldest_local().map(|c| c.revision);
        if expected != Some(commit.revision) {
            return Err(EditError::LocalAckMismatch {
                expected,
                received: commit.revision,
            });
        }
        let landed = self.log.pop_local().ok_or(EditError::LocalAckMismatch {
            expected,
            received: commit.revision,
        })?;
        self.repair.capture(landed.revision, &landed.change);
        debug!(seq = %sequence_number, revision = %landed.revision, "local commit landed");
        self.log.push_trunk(SequencedCommit {
            commit: landed,
            sequence_number,
            reference_sequence_number: reference,
        })?;
        Ok(None)
    }

    /// Put a peer commit on its session's branch and compute its trunk form.
    fn place_peer_commit(
        &mut self,
        commit: &Commit<R::Change>,
        reference: SequenceNumber,
    ) -> EditResult<R::Change> {
        let session = commit.session_id;
        let branch = self
            .peers
            .entry(session)
            .or_insert_with(|| PeerBranch::new(session, reference));
        if reference < branch.base {
            return Err(EditError::ReferenceRegressed {
                session,
                previous: branch.base,
                reference,
            });
        }
        branch.advance(&self.rebaser, self.log.trunk_between(branch.base, reference))?;
        branch.commits.push_back(commit.clone());

        let mut catch_up = branch.clone();
        catch_up.advance(
            &self.rebaser,
            self.log.trunk_between(catch_up.base, self.log.head()),
        )?;
        match (catch_up.commits.pop_front(), catch_up.commits.is_empty()) {
            (Some(placed), true) if placed.revision == commit.revision => Ok(placed.change),
            _ => Err(EditError::PeerBranchDiverged {
                session,
                revision: commit.revision,
            }),
        }
    }

    fn trim(&mut self, minimum: SequenceNumber) -> EditResult<()> {
        if minimum <= self.minimum_sequence_number {
            return Ok(());
        }
        let head = self.log.head();
        if minimum > head {
            return Err(EditError::MinimumAheadOfHead { minimum, head });
        }

        if self.config.trim_trunk {
            for branch in self.peers.values_mut() {
                if branch.base < minimum {
                    branch.advance(&self.rebaser, self.log.trunk_between(branch.base, minimum))?;
                }
            }
            self.peers.retain(|_, branch| !branch.is_empty());
            let released = self.log.trim_through(minimum);
            self.repair.release(&released);
        }
        self.minimum_sequence_number = minimum;
        Ok(())
    }
}
