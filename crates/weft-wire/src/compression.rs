//! Batch-level compression.
//!
//! A compressed batch keeps its op count so every op still receives its own
//! sequence number: the first op carries `{"packedContents": <base64>}` with
//! the LZ4-compressed JSON array of every op's contents, the remaining ops
//! carry `null`.

use std::collections::VecDeque;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::config::CompressionConfig;
use crate::error::{WireError, WireResult};
use crate::message::{OutboundMessage, SequencedMessage};

pub const PACKED_CONTENTS_KEY: &str = "packedContents";

/// Supported compression algorithms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionAlgorithm {
    Lz4,
}

impl CompressionAlgorithm {
    pub fn parse(name: &str) -> WireResult<Self> {
        match name {
            "lz4" => Ok(Self::Lz4),
            other => Err(WireError::UnsupportedCompression(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lz4 => "lz4",
        }
    }
}

fn pack(contents: &[&Value]) -> WireResult<Value> {
    let bytes =
        serde_json::to_vec(contents).map_err(|e| WireError::Serialization(e.to_string()))?;
    let compressed = lz4_flex::compress_prepend_size(&bytes);
    Ok(json!({ PACKED_CONTENTS_KEY: STANDARD.encode(compressed) }))
}

fn unpack(contents: &Value) -> WireResult<Vec<Value>> {
    let encoded = contents
        .get(PACKED_CONTENTS_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| WireError::Decompression("missing packed contents".into()))?;
    let compressed = STANDARD
        .decode(encoded)
        .map_err(|e| WireError::Decompression(e.to_string()))?;
    let bytes = lz4_flex::decompress_size_prepended(&compressed)
        .map_err(|e| WireError::Decompression(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| WireError::Decompression(e.to_string()))
}

/// Compresses outbound batches above a size threshold.
#[derive(Clone, Debug)]
pub struct OpCompressor {
    minimum_batch_size_bytes: usize,
}

impl OpCompressor {
    pub fn new(minimum_batch_size_bytes: usize) -> Self {
        Self {
            minimum_batch_size_bytes,
        }
    }

    pub fn from_config(config: &CompressionConfig) -> Self {
        Self::new(config.minimum_batch_size_bytes)
    }

    /// Serialized size of the batch's contents.
    pub fn contents_size(batch: &[OutboundMessage]) -> WireResult<usize> {
        batch.iter().try_fold(0usize, |total, m| {
            serde_json::to_vec(&m.contents)
                .map(|b| total + b.len())
                .map_err(|e| WireError::Serialization(e.to_string()))
        })
    }

    pub fn should_compress(&self, batch: &[OutboundMessage]) -> WireResult<bool> {
        Ok(!batch.is_empty() && Self::contents_size(batch)? > self.minimum_batch_size_bytes)
    }

    /// Pack every op's contents into the first op. Batch flags are kept.
    pub fn compress_batch(&self, mut batch: Vec<OutboundMessage>) -> WireResult<Vec<OutboundMessage>> {
        if batch.is_empty() {
            return Ok(batch);
        }
        let packed = {
            let contents: Vec<&Value> = batch.iter().map(|m| &m.contents).collect();
            pack(&contents)?
        };
        for (index, message) in batch.iter_mut().enumerate() {
            if index == 0 {
                message.contents = packed.clone();
                message.compression = Some(CompressionAlgorithm::Lz4.as_str().to_string());
            } else {
                message.contents = Value::Null;
            }
        }
        debug!(ops = batch.len(), "compressed batch");
        Ok(batch)
    }
}

#[derive(Debug)]
enum DecompressorState {
    Idle,
    InBatch { remaining: VecDeque<Value> },
}

/// Restores the contents of compressed batches as their ops arrive.
#[derive(Debug)]
pub struct OpDecompressor {
    state: DecompressorState,
}

impl Default for OpDecompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl OpDecompressor {
    pub fn new() -> Self {
        Self {
            state: DecompressorState::Idle,
        }
    }

    /// `true` while ops of a compressed batch are still expected.
    pub fn is_processing(&self) -> bool {
        matches!(self.state, DecompressorState::InBatch { .. })
    }

    /// Pass one inbound op through the decompressor.
    ///
    /// Uncompressed ops outside a compressed batch are returned unchanged.
    pub fn process(&mut self, message: SequencedMessage) -> WireResult<SequencedMessage> {
        let result = self.step(message);
        if let Err(err) = &result {
            error!(error = %err, "decompression failed");
            self.state = DecompressorState::Idle;
        }
        result
    }

    fn step(&mut self, mut message: SequencedMessage) -> WireResult<SequencedMessage> {
        if let Some(name) = message.compression.take() {
            CompressionAlgorithm::parse(&name)?;
            if self.is_processing() {
                return Err(WireError::BatchProtocol(format!(
                    "compressed op {} inside a compressed batch",
                    message.sequence_number
                )));
            }
            let mut contents: VecDeque<Value> = unpack(&message.contents)?.into();
            let first = contents
                .pop_front()
                .ok_or_else(|| WireError::Decompression("empty packed batch".into()))?;
            message.contents = first;
            match message.batch_flag() {
                Some(true) => {
                    debug!(
                        seq = message.sequence_number,
                        ops = contents.len() + 1,
                        "compressed batch started"
                    );
                    self.state = DecompressorState::InBatch {
                        remaining: contents,
                    };
                }
                None if contents.is_empty() => {}
                None => {
                    return Err(WireError::BatchProtocol(format!(
                        "single compressed op {} packs {} extra contents",
                        message.sequence_number,
                        contents.len()
                    )))
                }
                Some(false) => {
                    return Err(WireError::BatchProtocol(format!(
                        "compressed op {} marked as batch end",
                        message.sequence_number
                    )))
                }
            }
            return Ok(message);
        }

        let DecompressorState::InBatch { remaining } = &mut self.state else {
            return Ok(message);
        };
        if message.batch_flag() == Some(true) {
            return Err(WireError::BatchProtocol(format!(
                "batch start {} inside a compressed batch",
                message.sequence_number
            )));
        }
        message.contents = remaining.pop_front().ok_or_else(|| {
            WireError::BatchProtocol(format!(
                "op {} exceeds the compressed batch",
                message.sequence_number
            ))
        })?;
        if message.batch_flag() == Some(false) {
            if !remaining.is_empty() {
                return Err(WireError::BatchProtocol(format!(
                    "batch ended at {} with {} packed contents left",
                    message.sequence_number,
                    remaining.len()
                )));
            }
            debug!(seq = message.sequence_number, "compressed batch ended");
            self.state = DecompressorState::Idle;
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::batch::mark_batch;
    use crate::message::ContainerMessageType;

    fn batch(contents: &[Value]) -> Vec<OutboundMessage> {
        let mut ops: Vec<OutboundMessage> = contents
            .iter()
            .enumerate()
            .map(|(i, c)| {
                OutboundMessage::new(ContainerMessageType::DataStoreOp, i as u64 + 1, 0, c.clone())
            })
            .collect();
        mark_batch(&mut ops);
        ops
    }

    fn sequence(ops: Vec<OutboundMessage>) -> Vec<SequencedMessage> {
        ops.into_iter()
            .enumerate()
            .map(|(i, m)| SequencedMessage::sequence(Some("a".into()), i as u64 + 1, 0, m))
            .collect()
    }

    #[test]
    fn parse_algorithm() {
        assert_eq!(CompressionAlgorithm::parse("lz4"), Ok(CompressionAlgorithm::Lz4));
        let err = CompressionAlgorithm::parse("gzip").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn threshold_decides_compression() {
        let compressor = OpCompressor::new(16);
        assert!(!compressor.should_compress(&batch(&[json!("tiny")])).unwrap());
        assert!(compressor
            .should_compress(&batch(&[json!("a".repeat(32))]))
            .unwrap());
        assert!(!compressor.should_compress(&[]).unwrap());
    }

    #[test]
    fn compressed_batch_is_restored_in_order() {
        let contents = vec![json!({"n": 1}), json!({"n": 2}), json!("three")];
        let packed = OpCompressor::new(0).compress_batch(batch(&contents)).unwrap();
        assert_eq!(packed[0].compression.as_deref(), Some("lz4"));
        assert_eq!(packed[1].contents, Value::Null);
        assert_eq!(packed[0].batch_flag(), Some(true));
        assert_eq!(packed[2].batch_flag(), Some(false));

        let mut decompressor = OpDecompressor::new();
        let mut restored = Vec::new();
        for message in sequence(packed) {
            let out = decompressor.process(message).unwrap();
            assert!(out.compression.is_none());
            restored.push(out.contents);
        }
        assert_eq!(restored, contents);
        assert!(!decompressor.is_processing());
    }

    #[test]
    fn single_compressed_op_does_not_enter_batch() {
        let packed = OpCompressor::new(0)
            .compress_batch(batch(&[json!([1, 2, 3])]))
            .unwrap();
        assert!(packed[0].metadata.is_none());

        let mut decompressor = OpDecompressor::new();
        let out = decompressor.process(sequence(packed).remove(0)).unwrap();
        assert_eq!(out.contents, json!([1, 2, 3]));
        assert!(!decompressor.is_processing());
    }

    #[test]
    fn plain_ops_pass_through() {
        let mut decompressor = OpDecompressor::new();
        for message in sequence(batch(&[json!(1), json!(2)])) {
            let expected = message.clone();
            assert_eq!(decompressor.process(message).unwrap(), expected);
        }
    }

    #[test]
    fn unknown_algorithm_is_fatal() {
        let mut message = sequence(batch(&[json!(1)])).remove(0);
        message.compression = Some("brotli".into());
        let err = OpDecompressor::new().process(message).unwrap_err();
        assert_eq!(err, WireError::UnsupportedCompression("brotli".into()));
    }

    #[test]
    fn compressed_op_inside_batch_is_fatal() {
        let compressor = OpCompressor::new(0);
        let first = sequence(compressor.compress_batch(batch(&[json!(1), json!(2)])).unwrap());
        let single = sequence(compressor.compress_batch(batch(&[json!(3)])).unwrap());

        let mut decompressor = OpDecompressor::new();
        decompressor.process(first[0].clone()).unwrap();
        let err = decompressor.process(single[0].clone()).unwrap_err();
        assert!(matches!(err, WireError::BatchProtocol(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn corrupted_payload_is_fatal() {
        let mut message = sequence(batch(&[json!(1)])).remove(0);
        message.compression = Some("lz4".into());
        message.contents = json!({ PACKED_CONTENTS_KEY: "not base64!" });
        let err = OpDecompressor::new().process(message).unwrap_err();
        assert!(matches!(err, WireError::Decompression(_)));
    }
}
