use serde::{Deserialize, Serialize};
use weft_types::SequenceNumber;

/// Configuration for an [`EditManager`](crate::EditManager).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditManagerConfig {
    /// Sequence number the trunk starts after. Zero for a new document; the
    /// snapshot's sequence number when loading from one.
    pub initial_sequence_number: u64,
    /// When `true`, advancing the minimum sequence number discards trunk
    /// history at or below it. When `false` the trunk is kept in full.
    pub trim_trunk: bool,
}

impl Default for EditManagerConfig {
    fn default() -> Self {
        Self {
            initial_sequence_number: 0,
            trim_trunk: true,
        }
    }
}

impl EditManagerConfig {
    /// Configuration for a manager loaded from a snapshot taken at `seq`.
    pub fn from_snapshot(seq: SequenceNumber) -> Self {
        Self {
            initial_sequence_number: seq.get(),
            ..Default::default()
        }
    }
}
