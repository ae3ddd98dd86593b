use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Server-assigned position of an edit in the trunk's total order.
///
/// Sequence numbers start at 1 for the first accepted edit; `ZERO` denotes
/// the empty trunk (the state before any edit was sequenced).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    pub const ZERO: Self = Self(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// The sequence number immediately after this one.
    pub fn next(self) -> Result<Self, TypeError> {
        self.0
            .checked_add(1)
            .map(Self)
            .ok_or(TypeError::SequenceOverflow)
    }

    /// The sequence number immediately before this one, if any.
    pub fn prev(self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }
}

impl From<u64> for SequenceNumber {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_and_prev() {
        let s = SequenceNumber::new(4);
        assert_eq!(s.next().unwrap(), SequenceNumber::new(5));
        assert_eq!(s.prev(), Some(SequenceNumber::new(3)));
        assert_eq!(SequenceNumber::ZERO.prev(), None);
    }

    #[test]
    fn next_overflow_is_an_error() {
        let err = SequenceNumber::new(u64::MAX).next().unwrap_err();
        assert_eq!(err, TypeError::SequenceOverflow);
    }

    #[test]
    fn serializes_as_plain_number() {
        let json = serde_json::to_string(&SequenceNumber::new(17)).unwrap();
        assert_eq!(json, "17");
    }

    #[test]
    fn display_format() {
        assert_eq!(SequenceNumber::new(9).to_string(), "#9");
    }
}
