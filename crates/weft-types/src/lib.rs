//! Foundation types for weft.
//!
//! This crate provides the identity and ordering primitives shared by the
//! edit log, the pending-state tracker, and the wire layer. Every other weft
//! crate depends on `weft-types`.
//!
//! # Key Types
//!
//! - [`SessionId`] — Identity of the peer that authored an edit
//! - [`RevisionTag`] — Globally unique identifier minted per edit (UUID v7)
//! - [`SequenceNumber`] — Server-assigned position in the trunk's total order
//! - [`Commit`] — An edit paired with its revision and authoring session
//! - [`SequencedCommit`] — A commit that has been accepted onto the trunk

pub mod commit;
pub mod error;
pub mod identity;
pub mod revision;
pub mod sequence;

pub use commit::{Commit, SequencedCommit};
pub use error::TypeError;
pub use identity::SessionId;
pub use revision::RevisionTag;
pub use sequence::SequenceNumber;
