//! Simulation harness for weft.
//!
//! A [`Sequencer`] plays the ordering service and a set of [`SimClient`]s
//! play collaborating peers. Each client wires the full stack together:
//! an edit manager over a text document, the pending state manager, batch
//! packing, compression and chunking on the way out, and chunk reassembly
//! and decompression on the way in. [`Simulation`] drives random
//! interleavings of edits, flushes, mode switches and disconnects, then
//! checks that every client converged to the same document.

pub mod client;
pub mod config;
pub mod error;
pub mod sequencer;
pub mod simulation;

pub use client::{ClientRuntime, SimClient};
pub use config::SimConfig;
pub use error::{SimError, SimResult};
pub use sequencer::Sequencer;
pub use simulation::{SimReport, SimStats, Simulation};
