use serde::{Deserialize, Serialize};
use serde_json::Value;
use weft_wire::ContainerMessageType;

/// How the runtime groups outbound ops into batches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlushMode {
    /// Every op is sent on its own.
    #[default]
    Immediate,
    /// Ops accumulate until an explicit flush and are sent as one batch.
    TurnBased,
}

/// A submitted op awaiting its ack.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound = "")]
pub struct PendingMessage<M> {
    pub message_type: ContainerMessageType,
    pub client_sequence_number: u64,
    pub reference_sequence_number: u64,
    pub content: Value,
    /// Datatype-private bookkeeping. Never serialized; regenerated by
    /// `apply_stashed_op` on resume.
    #[serde(skip)]
    pub local_op_metadata: Option<M>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_metadata: Option<Value>,
}

impl<M> PendingMessage<M> {
    pub fn new(
        message_type: ContainerMessageType,
        client_sequence_number: u64,
        reference_sequence_number: u64,
        content: Value,
        local_op_metadata: Option<M>,
    ) -> Self {
        Self {
            message_type,
            client_sequence_number,
            reference_sequence_number,
            content,
            local_op_metadata,
            op_metadata: None,
        }
    }

    /// Copy of the message with local metadata dropped.
    fn stashed(&self) -> Self {
        Self {
            message_type: self.message_type,
            client_sequence_number: self.client_sequence_number,
            reference_sequence_number: self.reference_sequence_number,
            content: self.content.clone(),
            local_op_metadata: None,
            op_metadata: self.op_metadata.clone(),
        }
    }
}

/// One entry of the pending queue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", bound = "")]
pub enum PendingState<M> {
    Message(PendingMessage<M>),
    #[serde(rename_all = "camelCase")]
    FlushMode { flush_mode: FlushMode },
    Flush,
}

impl<M> PendingState<M> {
    pub fn is_message(&self) -> bool {
        matches!(self, Self::Message(_))
    }

    pub(crate) fn stashed(&self) -> Self {
        match self {
            Self::Message(m) => Self::Message(m.stashed()),
            Self::FlushMode { flush_mode } => Self::FlushMode {
                flush_mode: *flush_mode,
            },
            Self::Flush => Self::Flush,
        }
    }
}

/// Pending queue as persisted across a restart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound = "")]
pub struct PendingLocalState<M> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub pending_states: Vec<PendingState<M>>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn local_metadata_is_not_serialized() {
        let state: PendingState<String> = PendingState::Message(PendingMessage::new(
            ContainerMessageType::DataStoreOp,
            4,
            2,
            json!({"k": "v"}),
            Some("private".to_string()),
        ));
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["messageType"], "dataStoreOp");
        assert_eq!(value["clientSequenceNumber"], 4);
        assert!(value.get("localOpMetadata").is_none());

        let parsed: PendingState<String> = serde_json::from_value(value).unwrap();
        let PendingState::Message(message) = parsed else {
            panic!("expected a message");
        };
        assert!(message.local_op_metadata.is_none());
    }

    /// Metadata that is neither `Default` nor serde-aware.
    #[derive(Clone, Debug, PartialEq)]
    struct Handle(u32);

    #[test]
    fn metadata_type_needs_no_serde_or_default() {
        let local = PendingLocalState {
            client_id: Some("client-1".to_string()),
            pending_states: vec![
                PendingState::Message(PendingMessage::new(
                    ContainerMessageType::DataStoreOp,
                    1,
                    0,
                    json!("x"),
                    Some(Handle(7)),
                )),
                PendingState::Flush,
            ],
        };
        let text = serde_json::to_string(&local).unwrap();
        let parsed: PendingLocalState<Handle> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.client_id.as_deref(), Some("client-1"));
        assert_eq!(parsed.pending_states.len(), 2);
        let PendingState::Message(message) = &parsed.pending_states[0] else {
            panic!("expected a message");
        };
        assert_eq!(message.local_op_metadata, None);
        assert_eq!(message.content, json!("x"));
    }

    #[test]
    fn markers_serialize_with_tag() {
        let mode: PendingState<()> = PendingState::FlushMode {
            flush_mode: FlushMode::TurnBased,
        };
        assert_eq!(
            serde_json::to_value(&mode).unwrap(),
            json!({"type": "flushMode", "flushMode": "turnBased"})
        );
        assert_eq!(
            serde_json::to_value(PendingState::<()>::Flush).unwrap(),
            json!({"type": "flush"})
        );
    }

    #[test]
    fn local_state_round_trips_without_metadata() {
        let state = PendingLocalState::<u8> {
            client_id: Some("client-1".into()),
            pending_states: vec![
                PendingState::FlushMode {
                    flush_mode: FlushMode::TurnBased,
                },
                PendingState::Message(PendingMessage::new(
                    ContainerMessageType::Attach,
                    1,
                    0,
                    json!(null),
                    None,
                )),
                PendingState::Flush,
            ],
        };
        let text = serde_json::to_string(&state).unwrap();
        assert!(text.contains("\"clientId\":\"client-1\""));
        let parsed: PendingLocalState<u8> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, state);
    }
}
