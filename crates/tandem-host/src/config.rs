//! Engine configuration.
//!
//! Every field has a default, so an empty RON document `()` is a valid
//! configuration:
//!
//! ```ron
//! (
//!     max_pending_operations: 4096,
//!     event_capacity: 256,
//! )
//! ```

use serde::{Deserialize, Serialize};

/// Default bound on unacknowledged operations per participant.
pub const DEFAULT_MAX_PENDING_OPERATIONS: usize = 4096;

/// Default capacity of the session event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Tunables for the host side of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// A recipient whose unacknowledged buffer reaches this bound is treated
    /// as desynchronized; the fan-out fails before anything changes.
    pub max_pending_operations: usize,

    /// Capacity of the broadcast channel behind `SessionHub::subscribe`.
    /// Slow subscribers lag and lose the oldest events.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_pending_operations: DEFAULT_MAX_PENDING_OPERATIONS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Parse from RON text and validate.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the unacknowledged-operation bound.
    pub fn with_max_pending_operations(mut self, limit: usize) -> Self {
        self.max_pending_operations = limit;
        self
    }

    /// Set the event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_pending_operations == 0 {
            return Err(ConfigError::Invalid("max_pending_operations must be at least 1"));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be at least 1"));
        }
        Ok(())
    }
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}
