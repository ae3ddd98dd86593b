use tracing::{debug, warn};

use crate::chunking::split_op;
use crate::compression::OpCompressor;
use crate::config::WireConfig;
use crate::error::{WireError, WireResult};
use crate::message::OutboundMessage;

/// Mark batch boundaries: first op `batch = true`, last op `batch = false`.
///
/// A single-op batch carries no batch flag at all.
pub fn mark_batch(batch: &mut [OutboundMessage]) {
    let len = batch.len();
    for (index, message) in batch.iter_mut().enumerate() {
        let flag = match index {
            _ if len < 2 => None,
            0 => Some(true),
            i if i == len - 1 => Some(false),
            _ => None,
        };
        message.set_batch_flag(flag);
    }
}

/// Prepares an outbound batch for submission.
#[derive(Clone, Debug)]
pub struct BatchPacker {
    config: WireConfig,
    compressor: OpCompressor,
}

impl BatchPacker {
    pub fn new(config: WireConfig) -> Self {
        let compressor = OpCompressor::from_config(&config.compression);
        Self { config, compressor }
    }

    pub fn config(&self) -> &WireConfig {
        &self.config
    }

    /// Mark, compress and size-check a batch.
    ///
    /// A single op that is still too large is split into chunks when
    /// chunking is enabled; any other oversized batch is rejected.
    pub fn pack(&self, mut batch: Vec<OutboundMessage>) -> WireResult<Vec<OutboundMessage>> {
        if batch.is_empty() {
            return Ok(batch);
        }
        mark_batch(&mut batch);
        if self.config.compression.enabled && self.compressor.should_compress(&batch)? {
            batch = self.compressor.compress_batch(batch)?;
        }

        let size = batch
            .iter()
            .try_fold(0usize, |total, m| Ok::<_, WireError>(total + m.encoded_len()?))?;
        if size <= self.config.max_batch_size_bytes {
            debug!(ops = batch.len(), size, "packed batch");
            return Ok(batch);
        }
        if batch.len() == 1 && self.config.chunking_enabled {
            let chunks = split_op(&batch[0], self.config.chunk_size_bytes)?;
            debug!(size, chunks = chunks.len(), "chunked oversized op");
            return Ok(chunks);
        }
        warn!(
            ops = batch.len(),
            size,
            max = self.config.max_batch_size_bytes,
            "batch rejected"
        );
        Err(WireError::BatchTooLarge {
            size,
            max: self.config.max_batch_size_bytes,
        })
    }
}
