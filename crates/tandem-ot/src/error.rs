//! Error types for transformation and routing.

use thiserror::Error;

use tandem_types::{DocumentPath, ParticipantId};

/// Errors that can occur while transforming or routing activities.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OtError {
    /// A proxy's history cannot explain an incoming timestamp.
    ///
    /// Not retryable. The proxy for `participant` must be reset, and the
    /// participant probably needs a full resync of the document.
    #[error("protocol desynchronization with {participant}: {reason}")]
    ProtocolDesynchronization {
        participant: ParticipantId,
        #[source]
        reason: Desync,
    },

    /// No live proxy for this participant.
    #[error("unknown participant {participant} for document {path}")]
    UnknownParticipant {
        participant: ParticipantId,
        path: DocumentPath,
    },

    /// The document is not currently shared.
    #[error("document not shared: {0}")]
    UnknownDocument(DocumentPath),

    /// An activity reached the session of a different document.
    #[error("activity for {got} delivered to session of {expected}")]
    WrongDocument {
        expected: DocumentPath,
        got: DocumentPath,
    },

    /// Operation position out of bounds for the text it is applied to.
    #[error("position {position} out of bounds for document with length {len}")]
    PositionOutOfBounds { position: usize, len: usize },
}

impl OtError {
    /// The participant whose proxy must be reset before it is usable again.
    pub fn requires_reset(&self) -> Option<&ParticipantId> {
        match self {
            OtError::ProtocolDesynchronization { participant, .. } => Some(participant),
            _ => None,
        }
    }

    pub(crate) fn desync(participant: &ParticipantId, reason: Desync) -> Self {
        OtError::ProtocolDesynchronization {
            participant: participant.clone(),
            reason,
        }
    }
}

/// Why a proxy's history and an incoming timestamp disagree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Desync {
    /// The counterpart acknowledges fewer operations than were already discarded.
    #[error("acknowledges {acked} operations but history starts at #{oldest}")]
    StaleAcknowledgement { acked: u64, oldest: u64 },

    /// The counterpart acknowledges operations that were never generated.
    #[error("acknowledges {acked} operations but only {generated} were generated")]
    FutureAcknowledgement { acked: u64, generated: u64 },

    /// Lost or duplicated operation in the counterpart's stream.
    #[error("expected operation #{expected}, got #{got}")]
    OutOfSequence { expected: u64, got: u64 },

    /// Timestamp reseeding while operations are still unacknowledged.
    #[error("cannot reseed timestamp with {pending} unacknowledged operations")]
    PendingHistory { pending: usize },

    /// The counterpart stopped acknowledging.
    #[error("{pending} unacknowledged operations reached the limit of {limit}")]
    BacklogFull { pending: usize, limit: usize },

    /// The transformed operation does not fit the host document.
    #[error("operation at {position} does not fit a document of length {len}")]
    Inapplicable { position: usize, len: usize },
}
