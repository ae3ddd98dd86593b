//! Change rebasing for weft.
//!
//! The edit manager never inspects changes. Everything it needs from a
//! datatype goes through the [`ChangeRebaser`] capability defined here:
//! composing sequential changes, inverting a change, and rebasing one change
//! over a concurrent one.
//!
//! The crate also ships [`TextChange`] / [`TextRebaser`], a character
//! sequence datatype that satisfies the rebaser contract. It backs the test
//! suites and the simulator.

pub mod error;
pub mod rebaser;
pub mod repair;
pub mod text;

pub use error::RebaseError;
pub use rebaser::ChangeRebaser;
pub use repair::{NoRepairData, RecordingRepairStore, RepairDataStoreProvider};
pub use text::{apply_text, TextChange, TextOp, TextRebaser};
