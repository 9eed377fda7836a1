use std::fmt::{Display, Formatter};
use std::time::Duration;

use crate::engine::EngineError;
use crate::playback::slots::SlotPool;

/// Point of the event start sequence a timeout was observed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartStage {
    /// The instance never left the engine's `Starting` state.
    LeavingStarting,
    /// The channel group never reported itself as playing.
    ChannelGroupPlaying,
}

impl Display for StartStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LeavingStarting => write!(f, "waiting for the event to leave starting"),
            Self::ChannelGroupPlaying => write!(f, "waiting for the channel group to play"),
        }
    }
}

/// Error type surfaced to the host for every registry operation.
#[derive(Debug, Clone, PartialEq)]
pub enum AmadeusError {
    /// Unexpected engine response, carrying the engine's native code.
    EngineFailure(EngineError),
    InvalidSlotId {
        pool: SlotPool,
        id: usize,
        capacity: usize,
    },
    /// The event slot holds no instance.
    NotLoaded(usize),
    /// The engine stalled during the event start sequence.
    StartTimeout {
        slot: usize,
        stage: StartStage,
        waited: Duration,
    },
}

impl AmadeusError {
    /// Native engine code, when the failure came from the engine.
    pub fn engine_code(&self) -> Option<i32> {
        match self {
            Self::EngineFailure(err) => Some(err.code()),
            _ => None,
        }
    }
}

impl Display for AmadeusError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EngineFailure(err) => write!(f, "engine error: {}", err),
            Self::InvalidSlotId { pool, id, capacity } => write!(
                f,
                "invalid {} slot id {} (capacity {})",
                pool, id, capacity
            ),
            Self::NotLoaded(slot) => write!(f, "event slot {} is not loaded", slot),
            Self::StartTimeout {
                slot,
                stage,
                waited,
            } => write!(
                f,
                "event slot {} timed out after {}ms {}",
                slot,
                waited.as_millis(),
                stage
            ),
        }
    }
}

impl std::error::Error for AmadeusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::EngineFailure(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EngineError> for AmadeusError {
    fn from(value: EngineError) -> Self {
        Self::EngineFailure(value)
    }
}

pub type Result<T> = std::result::Result<T, AmadeusError>;
