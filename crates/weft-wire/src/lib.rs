//! Wire layer for weft.
//!
//! Ops travel between a client and the ordering service as JSON envelopes.
//! On the way out a batch is marked, optionally compressed, and oversized
//! single ops are split into chunks; on the way in chunks are reassembled and
//! compressed batches are unpacked so the layers above only ever see whole,
//! plain ops.
//!
//! - [`message`]: envelopes and the closed set of message types
//! - [`batch`]: batch marking and the outbound [`BatchPacker`]
//! - [`compression`]: [`OpCompressor`] and [`OpDecompressor`]
//! - [`chunking`]: [`split_op`] and [`ChunkedMessageProcessor`]
//! - [`codec`]: length-prefixed frames

pub mod batch;
pub mod chunking;
pub mod codec;
pub mod compression;
pub mod config;
pub mod error;
pub mod message;

pub use batch::{mark_batch, BatchPacker};
pub use chunking::{split_op, ChunkOutcome, ChunkedMessageProcessor, ChunkedOpContents};
pub use codec::{WireCodec, MAX_FRAME_SIZE};
pub use compression::{CompressionAlgorithm, OpCompressor, OpDecompressor};
pub use config::{CompressionConfig, WireConfig};
pub use error::{WireError, WireResult};
pub use message::{ContainerMessageType, MessageMetadata, OutboundMessage, SequencedMessage};
