use serde::{Deserialize, Serialize};

use crate::codec::MAX_FRAME_SIZE;

/// Outbound wire settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireConfig {
    /// Largest batch, in serialized bytes, that may be submitted.
    pub max_batch_size_bytes: usize,
    /// Split single ops larger than `max_batch_size_bytes` into chunks.
    pub chunking_enabled: bool,
    /// Size of each chunk's payload in bytes.
    pub chunk_size_bytes: usize,
    /// Largest frame the codec accepts.
    pub max_frame_size: usize,
    pub compression: CompressionConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
    /// Batches whose contents serialize to more than this are compressed.
    pub minimum_batch_size_bytes: usize,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            max_batch_size_bytes: 950 * 1024,
            chunking_enabled: true,
            chunk_size_bytes: 200 * 1024,
            max_frame_size: MAX_FRAME_SIZE,
            compression: CompressionConfig::default(),
        }
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            minimum_batch_size_bytes: 600 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = WireConfig::default();
        assert!(c.chunk_size_bytes < c.max_batch_size_bytes);
        assert!(c.compression.minimum_batch_size_bytes < c.max_batch_size_bytes);
        assert!(c.chunking_enabled);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let c: WireConfig = serde_json::from_str(r#"{"chunk_size_bytes": 10}"#).unwrap();
        assert_eq!(c.chunk_size_bytes, 10);
        assert_eq!(c.max_frame_size, MAX_FRAME_SIZE);
        assert!(c.compression.enabled);
    }
}
