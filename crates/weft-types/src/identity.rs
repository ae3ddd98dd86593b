use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identity of the peer session that authored an edit.
///
/// A session lives for as long as one in-memory edit manager does; it
/// survives reconnects (which change the connection's client id, not the
/// session). Session ids are totally ordered so that datatypes can break
/// ties between concurrent edits deterministically.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    /// Create a fresh random session id (UUID v4).
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Create a deterministic session id, for tests and simulations.
    pub fn from_u128(value: u128) -> Self {
        Self(uuid::Uuid::from_u128(value))
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// Short representation (first 8 characters of the UUID).
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl FromStr for SessionId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| TypeError::InvalidId(e.to_string()))
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.short_id())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_are_unique() {
        assert_ne!(SessionId::random(), SessionId::random());
    }

    #[test]
    fn deterministic_ids_order_by_value() {
        let a = SessionId::from_u128(1);
        let b = SessionId::from_u128(2);
        assert!(a < b);
        assert_eq!(a, SessionId::from_u128(1));
    }

    #[test]
    fn parse_roundtrip() {
        let id = SessionId::random();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = "not-a-session".parse::<SessionId>().unwrap_err();
        assert!(matches!(err, TypeError::InvalidId(_)));
    }

    #[test]
    fn short_id_format() {
        let id = SessionId::from_u128(0xabcdef);
        assert_eq!(id.short_id().len(), 8);
        assert_eq!(format!("{id:?}"), format!("SessionId({})", id.short_id()));
    }
}
