//! Pending state tracking for weft.
//!
//! [`PendingStateManager`] remembers every op a client has submitted but not
//! yet seen acknowledged, along with the flush markers that delimit its
//! batches. Acks must arrive in submission order; anything else closes the
//! container. After a reconnect the queue is replayed through the
//! [`RuntimeStateHandler`], and a serialized [`PendingLocalState`] lets a
//! restarted client resume where it stopped.

pub mod config;
pub mod error;
pub mod handler;
pub mod manager;
pub mod state;

pub use config::PendingStateConfig;
pub use error::{PendingResult, PendingStateError};
pub use handler::RuntimeStateHandler;
pub use manager::PendingStateManager;
pub use state::{FlushMode, PendingLocalState, PendingMessage, PendingState};
