//! Edit log and edit manager for weft.
//!
//! This crate is the consistency core. It provides:
//! - [`EditLog`]: the append-only trunk of sequenced commits and the local
//!   branch of commits awaiting sequencing
//! - [`EditManager`]: rebases the local branch whenever the trunk advances,
//!   rebases incoming peer commits into trunk form, and reports the delta the
//!   local view has to apply
//! - Trunk trimming driven by the minimum sequence number
//! - Revert of trunk or local commits through the rebaser's inverse

pub mod branch;
pub mod config;
pub mod error;
pub mod log;
pub mod manager;

pub use config::EditManagerConfig;
pub use error::{EditError, EditResult};
pub use log::EditLog;
pub use manager::EditManager;
