/// Errors produced when applying a change to a concrete document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RebaseError {
    #[error("position {pos} out of bounds for length {len}")]
    OutOfBounds { pos: usize, len: usize },

    #[error("delete at {pos} expected {expected:?}, found {found:?}")]
    DeleteMismatch {
        pos: usize,
        expected: char,
        found: char,
    },
}
