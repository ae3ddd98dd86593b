use serde::{Deserialize, Serialize};

use crate::state::FlushMode;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PendingStateConfig {
    /// Flush mode the runtime starts in.
    pub initial_flush_mode: FlushMode,
}
