//! Two-component vector timestamps.
//!
//! A `VectorTimestamp` describes one side of a two-party channel: how many
//! operations this side generated (`local`) and how many it received from
//! its counterpart (`remote`). The host keeps one per participant proxy, and
//! every emitted envelope carries the emitter's timestamp in the emitter's
//! own frame.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Immutable `(local, remote)` operation counters.
///
/// Ordering is lexicographic over `(local, remote)`. Comparing timestamps
/// from different channels is meaningless.
#[derive(Clone, Copy, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct VectorTimestamp {
    local: u64,
    remote: u64,
}

impl VectorTimestamp {
    /// The timestamp of a channel where nothing was exchanged yet.
    pub const ZERO: Self = Self { local: 0, remote: 0 };

    pub fn new(local: u64, remote: u64) -> Self {
        Self { local, remote }
    }

    /// Operations generated by this side.
    pub fn local(&self) -> u64 {
        self.local
    }

    /// Operations received from the counterpart.
    pub fn remote(&self) -> u64 {
        self.remote
    }

    /// `(local, remote)`.
    pub fn components(&self) -> (u64, u64) {
        (self.local, self.remote)
    }

    /// One more locally generated operation.
    #[must_use]
    pub fn increment_local(self) -> Self {
        Self {
            local: self.local + 1,
            remote: self.remote,
        }
    }

    /// One more operation received from the counterpart.
    #[must_use]
    pub fn increment_remote(self) -> Self {
        Self {
            local: self.local,
            remote: self.remote + 1,
        }
    }

    /// The same channel state seen from the counterpart's side.
    #[must_use]
    pub fn mirrored(self) -> Self {
        Self {
            local: self.remote,
            remote: self.local,
        }
    }
}

impl fmt::Display for VectorTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.local, self.remote)
    }
}

impl fmt::Debug for VectorTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VectorTimestamp[{},{}]", self.local, self.remote)
    }
}

impl From<(u64, u64)> for VectorTimestamp {
    fn from((local, remote): (u64, u64)) -> Self {
        Self::new(local, remote)
    }
}
