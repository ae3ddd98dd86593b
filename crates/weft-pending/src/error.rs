use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PendingStateError {
    /// An ack's client sequence number differs from the oldest pending op.
    #[error("data corruption: expected client sequence number {expected}, received {actual}")]
    DataCorruption { expected: u64, actual: u64 },

    #[error("batch framing violation: {0}")]
    BatchFraming(String),

    #[error("local ack with no pending message")]
    NoPendingMessage,

    #[error("stashed op references {reference} but resume point is {sequence}")]
    StashedOpTooOld { reference: u64, sequence: u64 },

    #[error("stashed op rejected: {0}")]
    StashedOpRejected(String),

    #[error("cannot replay while disconnected")]
    NotConnected,

    #[error("pending states already replayed for this client id")]
    ReplayedTwice,

    #[error("stashed states have not been applied yet")]
    InitialStatesPending,

    #[error("pending state manager closed after a fatal error")]
    Closed,

    #[error("pending state manager disposed")]
    Disposed,
}

impl PendingStateError {
    /// Returns `true` if local and authoritative history have diverged and
    /// the container must close.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DataCorruption { .. }
                | Self::BatchFraming(_)
                | Self::NoPendingMessage
                | Self::StashedOpTooOld { .. }
                | Self::StashedOpRejected(_)
        )
    }
}

pub type PendingResult<T> = Result<T, PendingStateError>;
