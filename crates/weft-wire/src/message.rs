use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{WireError, WireResult};

/// The closed set of container-level op types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContainerMessageType {
    DataStoreOp,
    Attach,
    ChunkedOp,
    BlobAttach,
    Rejoin,
    Alias,
}

impl ContainerMessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataStoreOp => "dataStoreOp",
            Self::Attach => "attach",
            Self::ChunkedOp => "chunkedOp",
            Self::BlobAttach => "blobAttach",
            Self::Rejoin => "rejoin",
            Self::Alias => "alias",
        }
    }
}

impl fmt::Display for ContainerMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-op metadata carried on the wire.
///
/// `batch` is `Some(true)` on the first op of a multi-op batch,
/// `Some(false)` on the last, and absent everywhere else.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<bool>,
}

/// An op as submitted by a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub message_type: ContainerMessageType,
    pub client_sequence_number: u64,
    pub reference_sequence_number: u64,
    pub contents: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
}

impl OutboundMessage {
    pub fn new(
        message_type: ContainerMessageType,
        client_sequence_number: u64,
        reference_sequence_number: u64,
        contents: Value,
    ) -> Self {
        Self {
            message_type,
            client_sequence_number,
            reference_sequence_number,
            contents,
            metadata: None,
            compression: None,
        }
    }

    pub fn batch_flag(&self) -> Option<bool> {
        self.metadata.as_ref().and_then(|m| m.batch)
    }

    pub fn set_batch_flag(&mut self, flag: Option<bool>) {
        set_flag(&mut self.metadata, flag);
    }

    /// Serialized size of the whole envelope in bytes.
    pub fn encoded_len(&self) -> WireResult<usize> {
        serde_json::to_vec(self)
            .map(|bytes| bytes.len())
            .map_err(|e| WireError::Serialization(e.to_string()))
    }
}

/// An op as broadcast by the ordering service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencedMessage {
    /// Submitting client, `None` for service-generated messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub sequence_number: u64,
    pub minimum_sequence_number: u64,
    #[serde(rename = "type")]
    pub message_type: ContainerMessageType,
    pub client_sequence_number: u64,
    pub reference_sequence_number: u64,
    pub contents: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
}

impl SequencedMessage {
    /// Stamp an outbound op with its sequencing information.
    pub fn sequence(
        client_id: Option<String>,
        sequence_number: u64,
        minimum_sequence_number: u64,
        message: OutboundMessage,
    ) -> Self {
        Self {
            client_id,
            sequence_number,
            minimum_sequence_number,
            message_type: message.message_type,
            client_sequence_number: message.client_sequence_number,
            reference_sequence_number: message.reference_sequence_number,
            contents: message.contents,
            metadata: message.metadata,
            compression: message.compression,
        }
    }

    pub fn batch_flag(&self) -> Option<bool> {
        self.metadata.as_ref().and_then(|m| m.batch)
    }

    pub fn set_batch_flag(&mut self, flag: Option<bool>) {
        set_flag(&mut self.metadata, flag);
    }

    pub fn is_from(&self, client_id: &str) -> bool {
        self.client_id.as_deref() == Some(client_id)
    }
}

fn set_flag(metadata: &mut Option<MessageMetadata>, flag: Option<bool>) {
    match (metadata.as_mut(), flag) {
        (Some(m), _) => m.batch = flag,
        (None, Some(_)) => *metadata = Some(MessageMetadata { batch: flag }),
        (None, None) => {}
    }
}
