use std::path::Path;

use serde::{Deserialize, Serialize};
use weft_edit::EditManagerConfig;
use weft_wire::{CompressionConfig, WireConfig};

use crate::error::{SimError, SimResult};

/// Parameters of a simulation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub clients: usize,
    pub steps: usize,
    pub seed: u64,
    /// Per-step chance that a connected client drops its connection.
    pub disconnect_probability: f64,
    /// Per-step chance that a disconnected client reconnects.
    pub reconnect_probability: f64,
    /// Per-step chance that a client toggles between immediate and
    /// turn-based flushing.
    pub flush_mode_probability: f64,
    /// Chance that an edit inserts `large_edit_len` characters at once.
    pub large_edit_probability: f64,
    pub large_edit_len: usize,
    /// Turn-based batches are flushed once they hold this many ops.
    pub max_batch_ops: usize,
    pub edit: EditManagerConfig,
    pub wire: WireConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            clients: 3,
            steps: 500,
            seed: 7,
            disconnect_probability: 0.02,
            reconnect_probability: 0.3,
            flush_mode_probability: 0.05,
            large_edit_probability: 0.02,
            large_edit_len: 24 * 1024,
            max_batch_ops: 8,
            edit: EditManagerConfig::default(),
            wire: WireConfig {
                max_batch_size_bytes: 16 * 1024,
                chunk_size_bytes: 4 * 1024,
                compression: CompressionConfig {
                    enabled: true,
                    minimum_batch_size_bytes: 2 * 1024,
                },
                ..WireConfig::default()
            },
        }
    }
}

impl SimConfig {
    pub fn from_file(path: impl AsRef<Path>) -> SimResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> SimResult<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> SimResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.clients == 0 {
            return Err(SimError::Config("clients must be greater than 0".into()));
        }
        if self.max_batch_ops == 0 {
            return Err(SimError::Config("max_batch_ops must be greater than 0".into()));
        }
        if self.wire.chunk_size_bytes == 0 {
            return Err(SimError::Config("chunk_size_bytes must be greater than 0".into()));
        }
        let probabilities = [
            ("disconnect_probability", self.disconnect_probability),
            ("reconnect_probability", self.reconnect_probability),
            ("flush_mode_probability", self.flush_mode_probability),
            ("large_edit_probability", self.large_edit_probability),
        ];
        for (name, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(SimError::Config(format!("{name} must be within [0, 1]")));
            }
        }
        Ok(())
    }
}
