use thiserror::Error;
use weft_edit::EditError;
use weft_pending::PendingStateError;
use weft_rebase::RebaseError;
use weft_types::RevisionTag;
use weft_wire::WireError;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("edit manager: {0}")]
    Edit(#[from] EditError),

    #[error("pending state: {0}")]
    Pending(#[from] PendingStateError),

    #[error("wire: {0}")]
    Wire(#[from] WireError),

    #[error("document: {0}")]
    Rebase(#[from] RebaseError),

    #[error("ack for revision {received} returned metadata for {expected}")]
    AckMismatch {
        expected: RevisionTag,
        received: RevisionTag,
    },

    #[error("reference sequence number {reference} is ahead of sequence number {sequence}")]
    ReferenceAhead { reference: u64, sequence: u64 },

    #[error("client {0} has been closed")]
    ClientClosed(usize),

    #[error("simulation did not settle after {0} rounds")]
    NotSettled(usize),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SimResult<T> = Result<T, SimError>;
