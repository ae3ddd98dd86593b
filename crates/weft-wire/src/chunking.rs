//! Splitting oversized ops into chunks and reassembling them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{WireError, WireResult};
use crate::message::{ContainerMessageType, OutboundMessage, SequencedMessage};

/// Contents of a [`ContainerMessageType::ChunkedOp`] message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkedOpContents {
    /// 1-based index of this chunk.
    pub chunk_id: u32,
    pub total_chunks: u32,
    /// Slice of the original op's serialized contents.
    pub contents: String,
    pub original_type: ContainerMessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_compression: Option<String>,
}

/// Split an op into `ChunkedOp` messages of at most `chunk_size` content
/// bytes each.
///
/// Every chunk keeps the op's sequence numbers; the final chunk also carries
/// the op's metadata.
pub fn split_op(message: &OutboundMessage, chunk_size: usize) -> WireResult<Vec<OutboundMessage>> {
    if chunk_size == 0 {
        return Err(WireError::InvalidChunk("chunk size must be positive".into()));
    }
    let serialized = serde_json::to_string(&message.contents)
        .map_err(|e| WireError::Serialization(e.to_string()))?;
    let pieces = split_at_char_boundaries(&serialized, chunk_size);
    let total_chunks = u32::try_from(pieces.len())
        .map_err(|_| WireError::InvalidChunk(format!("{} chunks", pieces.len())))?;

    let mut chunks = Vec::with_capacity(pieces.len());
    for (index, piece) in pieces.into_iter().enumerate() {
        let chunk_id = index as u32 + 1;
        let contents = ChunkedOpContents {
            chunk_id,
            total_chunks,
            contents: piece.to_string(),
            original_type: message.message_type,
            original_compression: message.compression.clone(),
        };
        let value =
            serde_json::to_value(&contents).map_err(|e| WireError::Serialization(e.to_string()))?;
        let mut chunk = OutboundMessage::new(
            ContainerMessageType::ChunkedOp,
            message.client_sequence_number,
            message.reference_sequence_number,
            value,
        );
        if chunk_id == total_chunks {
            chunk.metadata = message.metadata.clone();
        }
        chunks.push(chunk);
    }
    debug!(
        csn = message.client_sequence_number,
        chunks = chunks.len(),
        "split op"
    );
    Ok(chunks)
}

fn split_at_char_boundaries(text: &str, max_bytes: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + max_bytes).min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            // A single character wider than the chunk size.
            end = start
                + text[start..]
                    .chars()
                    .next()
                    .map(char::len_utf8)
                    .unwrap_or(1);
        }
        pieces.push(&text[start..end]);
        start = end;
    }
    if pieces.is_empty() {
        pieces.push(text);
    }
    pieces
}

/// Result of feeding one message to the [`ChunkedMessageProcessor`].
#[derive(Clone, Debug, PartialEq)]
pub enum ChunkOutcome {
    /// A chunk was buffered; the op is not complete yet.
    Pending,
    /// A whole op, either reassembled or passed through unchanged.
    Complete(SequencedMessage),
}

#[derive(Debug)]
struct ChunkBuffer {
    total_chunks: u32,
    parts: Vec<String>,
}

/// Reassembles chunked ops per originating client.
#[derive(Debug, Default)]
pub struct ChunkedMessageProcessor {
    buffers: HashMap<String, ChunkBuffer>,
}

impl ChunkedMessageProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of clients with a partially received op.
    pub fn pending_clients(&self) -> usize {
        self.buffers.len()
    }

    /// Drop the partial op of a client that left.
    pub fn clear_client(&mut self, client_id: &str) {
        if self.buffers.remove(client_id).is_some() {
            warn!(client_id = %client_id, "dropped partial chunked op");
        }
    }

    pub fn process(&mut self, message: SequencedMessage) -> WireResult<ChunkOutcome> {
        if message.message_type != ContainerMessageType::ChunkedOp {
            return Ok(ChunkOutcome::Complete(message));
        }
        let chunk: ChunkedOpContents = serde_json::from_value(message.contents.clone())
            .map_err(|e| WireError::InvalidChunk(e.to_string()))?;
        let client_id = message.client_id.clone().unwrap_or_default();

        if chunk.total_chunks == 0 || chunk.chunk_id == 0 || chunk.chunk_id > chunk.total_chunks {
            self.buffers.remove(&client_id);
            return Err(WireError::InvalidChunk(format!(
                "chunk {} of {}",
                chunk.chunk_id, chunk.total_chunks
            )));
        }

        let buffer = self
            .buffers
            .entry(client_id.clone())
            .or_insert_with(|| ChunkBuffer {
                total_chunks: chunk.total_chunks,
                parts: Vec::new(),
            });
        let expected = buffer.parts.len() as u32 + 1;
        if chunk.chunk_id != expected {
            self.buffers.remove(&client_id);
            return Err(WireError::ChunkGap {
                client_id,
                expected,
                received: chunk.chunk_id,
            });
        }
        let known_total = buffer.total_chunks;
        if chunk.total_chunks != known_total {
            self.buffers.remove(&client_id);
            return Err(WireError::InvalidChunk(format!(
                "total changed from {} to {}",
                known_total, chunk.total_chunks
            )));
        }
        buffer.parts.push(chunk.contents);
        if chunk.chunk_id < chunk.total_chunks {
            return Ok(ChunkOutcome::Pending);
        }

        let parts = self
            .buffers
            .remove(&client_id)
            .map(|b| b.parts)
            .unwrap_or_default();
        let serialized: String = parts.concat();
        let contents = serde_json::from_str(&serialized)
            .map_err(|e| WireError::InvalidChunk(e.to_string()))?;
        debug!(
            client_id = %client_id,
            seq = message.sequence_number,
            chunks = chunk.total_chunks,
            "reassembled chunked op"
        );
        Ok(ChunkOutcome::Complete(SequencedMessage {
            message_type: chunk.original_type,
            contents,
            compression: chunk.original_compression,
            ..message
        }))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::{json, Value};

    use super::*;

    fn sequence(client: &str, ops: Vec<OutboundMessage>) -> Vec<SequencedMessage> {
        ops.into_iter()
            .enumerate()
            .map(|(i, m)| SequencedMessage::sequence(Some(client.into()), i as u64 + 1, 0, m))
            .collect()
    }

    fn op(contents: Value) -> OutboundMessage {
        OutboundMessage::new(ContainerMessageType::DataStoreOp, 9, 4, contents)
    }

    #[test]
    fn split_and_reassemble() {
        let original = op(json!({"text": "hello chunked world", "n": [1, 2, 3]}));
        let chunks = split_op(&original, 8).unwrap();
        assert!(chunks.len() > 2);
        assert!(chunks
            .iter()
            .all(|c| c.message_type == ContainerMessageType::ChunkedOp));

        let mut processor = ChunkedMessageProcessor::new();
        let mut outcomes: Vec<ChunkOutcome> = sequence("a", chunks)
            .into_iter()
            .map(|m| processor.process(m).unwrap())
            .collect();
        let last = outcomes.pop().unwrap();
        assert!(outcomes.iter().all(|o| *o == ChunkOutcome::Pending));

        let ChunkOutcome::Complete(message) = last else {
            panic!("expected a complete op");
        };
        assert_eq!(message.message_type, ContainerMessageType::DataStoreOp);
        assert_eq!(message.contents, original.contents);
        assert_eq!(message.client_sequence_number, 9);
        assert_eq!(processor.pending_clients(), 0);
    }

    #[test]
    fn out_of_order_chunk_is_fatal() {
        let chunks = split_op(&op(json!("0123456789abcdefghij")), 4).unwrap();
        let mut messages = sequence("a", chunks);
        let mut processor = ChunkedMessageProcessor::new();

        processor.process(messages.remove(0)).unwrap();
        // Skip chunk 2 and feed chunk 3.
        let err = processor.process(messages.remove(1)).unwrap_err();
        assert_eq!(
            err,
            WireError::ChunkGap {
                client_id: "a".into(),
                expected: 2,
                received: 3,
            }
        );
        assert!(err.is_fatal());
        assert_eq!(processor.pending_clients(), 0);
    }

    #[test]
    fn chunks_from_different_clients_interleave() {
        let a = sequence("a", split_op(&op(json!("aaaaaaaaaaaa")), 5).unwrap());
        let b = sequence("b", split_op(&op(json!("bbbbbbbbbbbb")), 5).unwrap());
        let mut processor = ChunkedMessageProcessor::new();
        let mut complete = Vec::new();
        for (x, y) in a.into_iter().zip(b) {
            for m in [x, y] {
                if let ChunkOutcome::Complete(message) = processor.process(m).unwrap() {
                    complete.push(message.contents);
                }
            }
        }
        assert_eq!(complete, vec![json!("aaaaaaaaaaaa"), json!("bbbbbbbbbbbb")]);
    }

    #[test]
    fn final_chunk_carries_metadata_and_compression() {
        let mut original = op(json!("payload payload"));
        original.compression = Some("lz4".into());
        original.set_batch_flag(Some(false));
        let chunks = split_op(&original, 4).unwrap();
        assert!(chunks[0].metadata.is_none());
        assert_eq!(chunks.last().unwrap().batch_flag(), Some(false));

        let mut processor = ChunkedMessageProcessor::new();
        let mut last = ChunkOutcome::Pending;
        for m in sequence("a", chunks) {
            last = processor.process(m).unwrap();
        }
        let ChunkOutcome::Complete(message) = last else {
            panic!("expected a complete op");
        };
        assert_eq!(message.compression.as_deref(), Some("lz4"));
        assert_eq!(message.batch_flag(), Some(false));
    }

    #[test]
    fn clear_client_drops_partial_op() {
        let chunks = split_op(&op(json!("0123456789")), 4).unwrap();
        let mut processor = ChunkedMessageProcessor::new();
        processor
            .process(sequence("a", chunks).remove(0))
            .unwrap();
        assert_eq!(processor.pending_clients(), 1);
        processor.clear_client("a");
        assert_eq!(processor.pending_clients(), 0);
    }

    #[test]
    fn non_chunked_ops_pass_through() {
        let message = sequence("a", vec![op(json!(1))]).remove(0);
        let mut processor = ChunkedMessageProcessor::new();
        assert_eq!(
            processor.process(message.clone()).unwrap(),
            ChunkOutcome::Complete(message)
        );
    }

    #[test]
    fn multibyte_characters_are_not_split() {
        let pieces = split_at_char_boundaries("héllo wörld ✓", 3);
        assert_eq!(pieces.concat(), "héllo wörld ✓");
        assert!(pieces.iter().all(|p| !p.is_empty()));
    }

    proptest! {
        #[test]
        fn reassembly_restores_any_payload(text in ".{0,200}", size in 1usize..32) {
            let original = op(json!({ "text": text }));
            let mut processor = ChunkedMessageProcessor::new();
            let mut result = None;
            for m in sequence("p", split_op(&original, size).unwrap()) {
                if let ChunkOutcome::Complete(message) = processor.process(m).unwrap() {
                    result = Some(message.contents);
                }
            }
            prop_assert_eq!(result, Some(original.contents));
        }
    }
}
