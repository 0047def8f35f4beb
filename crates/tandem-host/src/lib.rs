//! Host side of tandem: session multiplexing and divergence detection.
//!
//! The host sits at the center of a star. Every participant's edits reach it
//! over that participant's own channel; the host transforms each edit into
//! its canonical form and relays a tailored copy to everyone else.
//!
//! ```text
//! SessionHub (DashMap<DocumentPath, Arc<Mutex<DocumentServer>>>)
//!   └── DocumentServer  (one per shared document)
//!         ├── authoritative text
//!         └── TransformationProxy per participant
//!
//! ConsistencyChecker ── checksum reports ──▶ SessionHub::with_document
//!                    └─ DivergenceDetected ─▶ SessionEvent subscribers
//! ```
//!
//! Nothing here blocks or awaits: every call is a bounded computation under
//! one document's mutex. Transport, serialization and session management are
//! the caller's business.

mod config;
mod consistency;
pub mod hub;
mod server;

pub use config::{ConfigError, EngineConfig};
pub use consistency::{CheckOutcome, ConsistencyChecker};
pub use hub::{SessionEvent, SessionHub, SharedDocumentServer, shared_session_hub};
pub use server::DocumentServer;
