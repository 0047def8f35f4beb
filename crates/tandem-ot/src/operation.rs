//! Text edit operations.
//!
//! All mutations to a shared document are expressed as operations.
//! Operations are:
//! - Plain values with structural equality (no identity)
//! - Serializable for network transmission
//! - Transformable against concurrent operations (see [`crate::transform`])
//!
//! Positions and lengths count chars, not bytes, and always refer to the
//! document state implied by the timestamp the operation was generated at.

use serde::{Deserialize, Serialize};

use crate::{OtError, Result};

/// Edit primitives on a text document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    /// Insert `text` before the char at `position`.
    Insert {
        /// Char offset of the insertion point.
        position: usize,
        /// Inserted text.
        text: String,
    },

    /// Remove `length` chars starting at `position`.
    Delete {
        /// Char offset of the first removed char.
        position: usize,
        /// Number of removed chars.
        length: usize,
    },

    /// Ordered composite. Each member is defined on the state produced by
    /// the members before it.
    Split(Vec<Operation>),

    /// Leaves the document unchanged.
    NoOp,
}

impl Operation {
    /// Insert `text` at `position`. An empty insert is a `NoOp`.
    pub fn insert(position: usize, text: impl Into<String>) -> Self {
        Operation::Insert {
            position,
            text: text.into(),
        }
        .normalize()
    }

    /// Delete `length` chars at `position`. A zero-length delete is a `NoOp`.
    pub fn delete(position: usize, length: usize) -> Self {
        Operation::Delete { position, length }.normalize()
    }

    /// Composite of `ops`, applied in order.
    pub fn split(ops: impl IntoIterator<Item = Operation>) -> Self {
        Operation::Split(ops.into_iter().collect()).normalize()
    }

    /// Static name of the variant, for logging.
    pub fn kind(&self) -> &'static str {
        self.into()
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Operation::NoOp)
    }

    /// Canonical form: empty edits become `NoOp`, composites are flattened
    /// and lose their `NoOp` members.
    #[must_use]
    pub fn normalize(self) -> Self {
        match self {
            Operation::Insert { ref text, .. } if text.is_empty() => Operation::NoOp,
            Operation::Delete { length: 0, .. } => Operation::NoOp,
            Operation::Split(ops) => {
                let mut flat = Vec::with_capacity(ops.len());
                for op in ops {
                    match op.normalize() {
                        Operation::NoOp => {}
                        Operation::Split(inner) => flat.extend(inner),
                        other => flat.push(other),
                    }
                }
                match flat.len() {
                    0 => Operation::NoOp,
                    1 => flat.pop().unwrap_or(Operation::NoOp),
                    _ => Operation::Split(flat),
                }
            }
            other => other,
        }
    }

    /// Apply to `text` in place.
    ///
    /// Fails without touching `text` if any position is out of bounds.
    pub fn apply(&self, text: &mut String) -> Result<()> {
        match self {
            Operation::Insert { position, text: inserted } => {
                let at = byte_index(text, *position).ok_or(OtError::PositionOutOfBounds {
                    position: *position,
                    len: text.chars().count(),
                })?;
                text.insert_str(at, inserted);
            }
            Operation::Delete { position, length } => {
                let out_of_bounds = |position| OtError::PositionOutOfBounds {
                    position,
                    len: text.chars().count(),
                };
                let end = position
                    .checked_add(*length)
                    .ok_or_else(|| out_of_bounds(usize::MAX))?;
                let start_byte = byte_index(text, *position).ok_or_else(|| out_of_bounds(*position))?;
                let end_byte = byte_index(text, end).ok_or_else(|| out_of_bounds(end))?;
                text.replace_range(start_byte..end_byte, "");
            }
            Operation::Split(ops) => {
                let mut work = text.clone();
                for op in ops {
                    op.apply(&mut work)?;
                }
                *text = work;
            }
            Operation::NoOp => {}
        }
        Ok(())
    }

    /// Apply to a copy of `text`.
    pub fn applied_to(&self, text: &str) -> Result<String> {
        let mut out = text.to_string();
        self.apply(&mut out)?;
        Ok(out)
    }
}

/// Byte offset of the char at `pos`; `pos == char count` maps to the end.
fn byte_index(text: &str, pos: usize) -> Option<usize> {
    text.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .nth(pos)
}
