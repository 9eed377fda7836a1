//! Registry configuration supplied once at `init`.

use serde::{Deserialize, Serialize};

/// Fixed sizing and engine selection for one registry lifetime.
///
/// Every field is required; there are no defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AmadeusConfig {
    pub channel_capacity: usize,
    pub event_capacity: usize,
    pub engine_version: u32,
}

impl AmadeusConfig {
    pub fn new(channel_capacity: usize, event_capacity: usize, engine_version: u32) -> Self {
        Self {
            channel_capacity,
            event_capacity,
            engine_version,
        }
    }

    /// Parse a configuration from JSON.
    ///
    /// # Errors
    /// Returns an error if a field is missing, unknown, or of the wrong type.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Voices the engine must be able to mix at once.
    pub fn max_voices(&self) -> usize {
        self.channel_capacity + self.event_capacity
    }
}
