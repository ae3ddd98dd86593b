use std::fmt;

use serde::{Deserialize, Serialize};

/// Globally unique identifier minted for every edit.
///
/// Revision tags are UUID v7 values: the leading timestamp keeps tags from a
/// single session roughly ordered for debugging, and the 74 random bits make
/// independent minting on different peers collision-free without
/// coordination. Ordering between tags carries no meaning across sessions.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RevisionTag(uuid::Uuid);

impl RevisionTag {
    /// Mint a fresh revision tag.
    pub fn mint() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// Short representation (last 8 hex characters, where the random bits live).
    pub fn short_id(&self) -> String {
        let s = self.0.simple().to_string();
        s[s.len() - 8..].to_string()
    }
}

impl fmt::Debug for RevisionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RevisionTag({})", self.short_id())
    }
}

impl fmt::Display for RevisionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn minted_tags_are_unique() {
        let tags: HashSet<RevisionTag> = (0..10_000).map(|_| RevisionTag::mint()).collect();
        assert_eq!(tags.len(), 10_000);
    }

    #[test]
    fn concurrent_minting_never_collides() {
        let seen = Arc::new(std::sync::Mutex::new(HashSet::new()));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let seen = Arc::clone(&seen);
            handles.push(thread::spawn(move || {
                let local: Vec<RevisionTag> = (0..500).map(|_| RevisionTag::mint()).collect();
                let mut seen = seen.lock().unwrap();
                for tag in local {
                    assert!(seen.insert(tag), "duplicate revision tag {tag}");
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(seen.lock().unwrap().len(), 4000);
    }

    #[test]
    fn serde_roundtrip() {
        let tag = RevisionTag::mint();
        let json = serde_json::to_string(&tag).unwrap();
        let parsed: RevisionTag = serde_json::from_str(&json).unwrap();
        assert_eq!(tag, parsed);
    }

    #[test]
    fn short_id_is_eight_hex_chars() {
        let tag = RevisionTag::mint();
        let short = tag.short_id();
        assert_eq!(short.len(), 8);
        assert!(short.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
