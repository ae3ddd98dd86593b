//! In-memory ordering service.

use std::collections::BTreeMap;

use tracing::{debug, info};
use weft_wire::{OutboundMessage, SequencedMessage, WireCodec};

use crate::error::{SimError, SimResult};

/// Assigns the total order.
///
/// Every op of a submitted batch is sequenced back to back. The minimum
/// sequence number is the lowest reference sequence number any connected
/// client may still submit against.
#[derive(Debug)]
pub struct Sequencer {
    codec: WireCodec,
    next_client: u64,
    /// Connected clients and the last reference sequence number each one
    /// submitted (or its join point).
    clients: BTreeMap<String, u64>,
    log: Vec<SequencedMessage>,
    sequence_number: u64,
    minimum_sequence_number: u64,
}

impl Sequencer {
    pub fn new(codec: WireCodec) -> Self {
        Self {
            codec,
            next_client: 0,
            clients: BTreeMap::new(),
            log: Vec::new(),
            sequence_number: 0,
            minimum_sequence_number: 0,
        }
    }

    /// Register a new connection. Returns its client id.
    pub fn join(&mut self) -> String {
        self.next_client += 1;
        let client_id = format!("client-{}", self.next_client);
        self.clients.insert(client_id.clone(), self.sequence_number);
        info!(client_id = %client_id, seq = self.sequence_number, "client joined");
        client_id
    }

    pub fn leave(&mut self, client_id: &str) {
        if self.clients.remove(client_id).is_some() {
            info!(client_id, "client left");
        }
    }

    pub fn is_connected(&self, client_id: &str) -> bool {
        self.clients.contains_key(client_id)
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn minimum_sequence_number(&self) -> u64 {
        self.minimum_sequence_number
    }

    pub fn log(&self) -> &[SequencedMessage] {
        &self.log
    }

    /// Messages after the first `cursor` entries.
    pub fn messages_since(&self, cursor: usize) -> &[SequencedMessage] {
        self.log.get(cursor..).unwrap_or_default()
    }

    /// Sequence a framed batch. Batches from clients that are not connected
    /// are dropped. Returns the number of ops sequenced.
    pub fn submit(&mut self, client_id: &str, frames: &[u8]) -> SimResult<usize> {
        if !self.clients.contains_key(client_id) {
            debug!(client_id, "dropped batch from disconnected client");
            return Ok(0);
        }
        let batch: Vec<OutboundMessage> = self.codec.decode_all(frames)?;
        if let Some(message) = batch
            .iter()
            .find(|m| m.reference_sequence_number > self.sequence_number)
        {
            return Err(SimError::ReferenceAhead {
                reference: message.reference_sequence_number,
                sequence: self.sequence_number,
            });
        }

        let count = batch.len();
        for message in batch {
            if let Some(last) = self.clients.get_mut(client_id) {
                *last = (*last).max(message.reference_sequence_number);
            }
            self.minimum_sequence_number = self
                .clients
                .values()
                .copied()
                .min()
                .unwrap_or(self.sequence_number)
                .max(self.minimum_sequence_number);
            self.sequence_number += 1;
            self.log.push(SequencedMessage::sequence(
                Some(client_id.to_string()),
                self.sequence_number,
                self.minimum_sequence_number,
                message,
            ));
        }
        debug!(
            client_id,
            ops = count,
            seq = self.sequence_number,
            msn = self.minimum_sequence_number,
            "sequenced batch"
        );
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use weft_wire::ContainerMessageType;

    use super::*;

    fn frames(refs: &[u64]) -> Vec<u8> {
        let batch: Vec<OutboundMessage> = refs
            .iter()
            .enumerate()
            .map(|(i, r)| {
                OutboundMessage::new(ContainerMessageType::DataStoreOp, i as u64 + 1, *r, json!(i))
            })
            .collect();
        WireCodec::default().encode_all(&batch).unwrap()
    }

    #[test]
    fn assigns_consecutive_sequence_numbers() {
        let mut s = Sequencer::new(WireCodec::default());
        let a = s.join();
        let b = s.join();
        assert_ne!(a, b);

        assert_eq!(s.submit(&a, &frames(&[0, 0])).unwrap(), 2);
        assert_eq!(s.submit(&b, &frames(&[1])).unwrap(), 1);
        let seqs: Vec<u64> = s.log().iter().map(|m| m.sequence_number).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(s.log()[2].client_id.as_deref(), Some(b.as_str()));
        assert_eq!(s.messages_since(2).len(), 1);
        assert!(s.messages_since(10).is_empty());
    }

    #[test]
    fn minimum_tracks_slowest_client() {
        let mut s = Sequencer::new(WireCodec::default());
        let a = s.join();
        let b = s.join();
        s.submit(&a, &frames(&[0, 0, 0])).unwrap();
        s.submit(&a, &frames(&[3])).unwrap();
        // b joined at 0 and has not submitted.
        assert_eq!(s.minimum_sequence_number(), 0);

        s.submit(&b, &frames(&[2])).unwrap();
        assert_eq!(s.minimum_sequence_number(), 2);

        s.leave(&b);
        s.submit(&a, &frames(&[5])).unwrap();
        assert_eq!(s.minimum_sequence_number(), 5);
    }

    #[test]
    fn drops_batches_from_departed_clients() {
        let mut s = Sequencer::new(WireCodec::default());
        let a = s.join();
        s.leave(&a);
        assert!(!s.is_connected(&a));
        assert_eq!(s.submit(&a, &frames(&[0])).unwrap(), 0);
        assert!(s.log().is_empty());
    }

    #[test]
    fn rejects_references_from_the_future() {
        let mut s = Sequencer::new(WireCodec::default());
        let a = s.join();
        let err = s.submit(&a, &frames(&[4])).unwrap_err();
        assert!(matches!(err, SimError::ReferenceAhead { reference: 4, .. }));
    }
}
