//! Envelopes exchanged with the transport layer.
//!
//! An [`Activity`] carries one operation between a participant and the host;
//! a [`ChecksumRecord`] carries a content checksum for divergence detection.
//! Both stamp their payload with the emitter's [`VectorTimestamp`], expressed
//! in the emitter's own frame.

use std::fmt;

use serde::{Deserialize, Serialize};

use tandem_types::{DocumentPath, ParticipantId};

use crate::{Operation, VectorTimestamp};

/// One operation in transit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// Author of the operation (not the relay).
    pub source: ParticipantId,
    /// Document the operation edits.
    pub path: DocumentPath,
    /// Emitter's timestamp at emission.
    pub timestamp: VectorTimestamp,
    pub operation: Operation,
}

impl Activity {
    pub fn new(
        source: ParticipantId,
        path: DocumentPath,
        timestamp: VectorTimestamp,
        operation: Operation,
    ) -> Self {
        Self {
            source,
            path,
            timestamp,
            operation,
        }
    }
}

/// Length and digest of a document's text.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentChecksum {
    /// Length in chars.
    pub length: usize,
    /// BLAKE3 digest of the UTF-8 text.
    pub hash: [u8; 32],
}

impl DocumentChecksum {
    /// Checksum of `text`.
    pub fn of(text: &str) -> Self {
        Self {
            length: text.chars().count(),
            hash: *blake3::hash(text.as_bytes()).as_bytes(),
        }
    }

    /// Hex-encoded digest.
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

impl fmt::Display for DocumentChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.length, &self.hash_hex()[..16])
    }
}

impl fmt::Debug for DocumentChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentChecksum({self})")
    }
}

/// A checksum pinned to the causal point it was computed at.
///
/// Used only for divergence detection, never for transformation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumRecord {
    /// Participant that computed the checksum.
    pub source: ParticipantId,
    pub path: DocumentPath,
    pub checksum: DocumentChecksum,
    pub timestamp: VectorTimestamp,
}

impl ChecksumRecord {
    pub fn new(
        source: ParticipantId,
        path: DocumentPath,
        checksum: DocumentChecksum,
        timestamp: VectorTimestamp,
    ) -> Self {
        Self {
            source,
            path,
            checksum,
            timestamp,
        }
    }

    /// Copy of this record stamped with another timestamp.
    #[must_use]
    pub fn with_timestamp(&self, timestamp: VectorTimestamp) -> Self {
        Self {
            timestamp,
            ..self.clone()
        }
    }
}
