//! # Amadeus Playback Library
//!
//! Slot-based playback registry for scripted sound and event voices.
//! Small integer slots stay consistent with an external mixing engine whose
//! handles can die at any time, and volume fades run on the engine's sample
//! clock instead of the caller's.
//!
//! The engine is abstracted by [`engine::PlaybackEngine`];
//! [`engine::simulated::SimulatedEngine`] is a deterministic in-memory model
//! used by the tests and the `amadeus` CLI.

pub mod config;
pub mod engine;
pub mod error;
pub mod playback;

pub use config::AmadeusConfig;
pub use engine::simulated::{SimulatedEngine, SimulatedEventSpec};
pub use engine::{EngineError, PlaybackEngine, SoundMode};
pub use error::{AmadeusError, Result, StartStage};
pub use playback::reconcile::ReconcileReport;
pub use playback::slots::{EventPhase, EventSlot, SlotPool};
pub use playback::{Amadeus, StartWaitSettings};
