use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("unsupported compression algorithm: {0}")]
    UnsupportedCompression(String),

    #[error("batch protocol violation: {0}")]
    BatchProtocol(String),

    #[error("decompression failed: {0}")]
    Decompression(String),

    #[error("chunk gap from client {client_id}: expected chunk {expected}, received {received}")]
    ChunkGap {
        client_id: String,
        expected: u32,
        received: u32,
    },

    #[error("invalid chunk: {0}")]
    InvalidChunk(String),

    #[error("batch too large: {size} bytes (max {max})")]
    BatchTooLarge { size: usize, max: usize },

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("framing error: {0}")]
    Framing(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),
}

impl WireError {
    /// Returns `true` for errors that mean inbound traffic can no longer be
    /// interpreted consistently.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedCompression(_)
                | Self::BatchProtocol(_)
                | Self::Decompression(_)
                | Self::ChunkGap { .. }
                | Self::InvalidChunk(_)
                | Self::Framing(_)
                | Self::Deserialization(_)
        )
    }
}

pub type WireResult<T> = Result<T, WireError>;
