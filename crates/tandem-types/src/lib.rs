//! Shared identity types for tandem.
//!
//! A pure leaf crate: the engine and host crates build on these ids, and the
//! transport layer addresses participants and documents with them.

pub mod ids;

pub use ids::{DocumentPath, IdError, ParticipantId};
