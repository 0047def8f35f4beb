//! Typed identifiers for participants and shared documents.
//!
//! Both wrap plain strings. A `ParticipantId` is whatever the session layer
//! uses to address a peer (typically a full Jabber id such as
//! `alice@example.org/tandem`). A `DocumentPath` is a project-relative
//! resource locator with `/` separators.
//!
//! `ParticipantId` ordering is lexicographic and is load-bearing: concurrent
//! inserts at the same position are ordered by the ids of their authors, so
//! every replica must agree on it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A participant identifier (opaque, totally ordered).
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

/// A shared document identifier (normalized relative path).
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentPath(String);

/// Error from parsing an identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("empty {0}")]
    Empty(&'static str),
    #[error("document path '{0}' escapes the project root")]
    EscapesRoot(String),
}

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_string_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Borrow the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $T {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<$T> for String {
            fn from(id: $T) -> String {
                id.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.0)
            }
        }
    };
}

impl_string_id!(ParticipantId, "ParticipantId");
impl_string_id!(DocumentPath, "DocumentPath");

// ── ParticipantId ───────────────────────────────────────────────────────────

impl ParticipantId {
    /// Create a participant id. Surrounding whitespace is trimmed.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_string())
    }

    /// The bare part of a Jabber-style id (everything before `/`).
    pub fn bare(&self) -> &str {
        self.0.split('/').next().unwrap_or(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

// ── DocumentPath ────────────────────────────────────────────────────────────

impl DocumentPath {
    /// Parse and normalize a document path.
    ///
    /// Backslashes become `/`, empty and `.` segments are dropped. Paths with
    /// `..` segments are rejected.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        let mut segments = Vec::new();
        for segment in raw.split(['/', '\\']) {
            match segment {
                "" | "." => continue,
                ".." => return Err(IdError::EscapesRoot(raw.to_string())),
                s => segments.push(s),
            }
        }
        if segments.is_empty() {
            return Err(IdError::Empty("document path"));
        }
        Ok(Self(segments.join("/")))
    }

    /// File name component (last segment).
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl TryFrom<String> for DocumentPath {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl TryFrom<&str> for DocumentPath {
    type Error = IdError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl std::str::FromStr for DocumentPath {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ============================================================================
// Tests
// ============================================================================
