//! Jupiter operational transformation engine for tandem.
//!
//! Several participants edit one text document through a central host. Each
//! participant talks to the host over its own two-party channel, and each
//! channel runs the Jupiter algorithm: both ends keep a two-component
//! [`VectorTimestamp`] and a buffer of unacknowledged operations, and
//! transform concurrent operations past each other so both ends converge.
//! The host-side fan-out lives in `tandem-host`.
//!
//! # Pieces
//!
//! - [`Operation`]: insert / delete / split / no-op over chars
//! - [`transform`](transform::transform): the inclusion transformation, ties
//!   broken by author id
//! - [`TransformationProxy`]: one end of a channel
//! - [`Replica`]: a participant's document plus its proxy for the host
//! - [`Activity`], [`ChecksumRecord`]: envelopes for the transport layer
//!
//! # Flow
//!
//! ```text
//! Replica A ──Activity──▶ host proxy(A).receive ──canonical op──┐
//!                                                               ├─▶ proxy(B).generate_for ──▶ Replica B
//!                                                               └─▶ proxy(C).generate_for ──▶ Replica C
//! ```

mod activity;
mod error;
mod operation;
mod proxy;
mod replica;
mod timestamp;
pub mod transform;

pub use activity::{Activity, ChecksumRecord, DocumentChecksum};
pub use error::{Desync, OtError};
pub use operation::Operation;
pub use proxy::{Received, TransformationProxy};
pub use replica::Replica;
pub use timestamp::VectorTimestamp;
pub use transform::{Side, transform, transform_pair};

pub use tandem_types::{DocumentPath, ParticipantId};

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, OtError>;
