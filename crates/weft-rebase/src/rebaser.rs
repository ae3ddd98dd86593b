/// Capability supplied by a datatype: compose, invert, and rebase changes.
///
/// # Contract
///
/// - `compose(&[a, b])` applied to a state equals applying `a` then `b`.
///   `compose(&[])` is the identity change.
/// - `invert(a)` applied after `a` restores the state before `a`.
/// - For two changes `a` and `b` authored against the same state `s`,
///   `apply(apply(s, b), rebase(a, b)) == apply(apply(s, a), rebase(b, a))`.
///   Tie-breaks between truly concurrent effects (two inserts at one
///   position) must depend on the changes themselves, never on which
///   argument is being rebased. The edit manager transforms trunk commits
///   past local commits and local commits past trunk commits in one pass and
///   relies on both directions agreeing.
pub trait ChangeRebaser {
    type Change: Clone;

    fn compose(&self, changes: &[Self::Change]) -> Self::Change;

    fn invert(&self, change: &Self::Change) -> Self::Change;

    /// Rebase `change` so that it applies after `over`.
    fn rebase(&self, change: &Self::Change, over: &Self::Change) -> Self::Change;

    /// Rebase `change` over a sequence of changes applied one after another.
    fn rebase_over_all<'a, I>(&self, change: &Self::Change, overs: I) -> Self::Change
    where
        I: IntoIterator<Item = &'a Self::Change>,
        Self::Change: 'a,
    {
        overs
            .into_iter()
            .fold(change.clone(), |acc, over| self.rebase(&acc, over))
    }

    /// The identity change.
    fn identity(&self) -> Self::Change {
        self.compose(&[])
    }
}
