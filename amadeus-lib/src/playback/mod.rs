//! Slot-based playback registry exposed to the host.
//!
//! [`Amadeus`] is the context object created by `init` and consumed by
//! `shutdown`. It owns the engine and both slot tables; every host call is
//! a `&mut self` method, so calls can never interleave.

mod events;
pub mod fade;
pub mod reconcile;
mod settings;
pub mod slots;
mod sounds;

use log::{debug, info};

use crate::config::AmadeusConfig;
use crate::engine::{ChannelHandle, Control, PlaybackEngine};
use crate::error::Result;

use fade::{FadeDuration, FadeRequest, StartLevel};
use reconcile::ReconcileReport;
use slots::{EventPhase, EventSlot, SlotPool, SlotTable};

pub use settings::StartWaitSettings;

/// Playback registry over a [`PlaybackEngine`].
#[derive(Debug)]
pub struct Amadeus<E: PlaybackEngine> {
    engine: E,
    channels: SlotTable<ChannelHandle>,
    events: SlotTable<EventSlot>,
    start_wait: StartWaitSettings,
}

impl<E: PlaybackEngine> Amadeus<E> {
    /// Initialise `engine` for `channel_capacity + event_capacity` voices and
    /// allocate both slot tables.
    ///
    /// # Errors
    /// Returns `EngineFailure` if the engine cannot be initialised.
    pub fn init(mut engine: E, config: AmadeusConfig) -> Result<Self> {
        engine.initialize(config.max_voices(), config.engine_version)?;
        info!(
            "amadeus initialised: {} channel slots, {} event slots, engine version {:#x}",
            config.channel_capacity, config.event_capacity, config.engine_version
        );

        Ok(Self {
            engine,
            channels: SlotTable::new(SlotPool::Channel, config.channel_capacity),
            events: SlotTable::new(SlotPool::Event, config.event_capacity),
            start_wait: StartWaitSettings::default(),
        })
    }

    /// Release the engine and hand it back.
    pub fn shutdown(mut self) -> Result<E> {
        self.engine.release()?;
        info!("amadeus shut down");
        Ok(self.engine)
    }

    /// Commit pending engine changes, then reclaim every slot whose
    /// playback has ended.
    ///
    /// Reclaimed events are stopped on the engine side, so a sweep that
    /// emptied an event slot commits once more.
    pub fn tick(&mut self) -> Result<ReconcileReport> {
        self.engine.update()?;
        let report = reconcile::sweep(&mut self.engine, &mut self.channels, &mut self.events)?;
        if !report.is_empty() {
            debug!(
                "tick reclaimed channels {:?}, events {:?}",
                report.reclaimed_channels, report.reclaimed_events
            );
        }
        if !report.reclaimed_events.is_empty() {
            self.commit()?;
        }
        Ok(report)
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn channel_capacity(&self) -> usize {
        self.channels.capacity()
    }

    pub fn event_capacity(&self) -> usize {
        self.events.capacity()
    }

    /// Channel currently recorded in `slot`, without asking the engine.
    pub fn channel(&self, slot: usize) -> Result<Option<ChannelHandle>> {
        self.channels.get(slot)
    }

    /// Event record in `slot`, without asking the engine.
    pub fn event(&self, slot: usize) -> Result<Option<EventSlot>> {
        self.events.get(slot)
    }

    /// Lifecycle state recorded for `slot`, without asking the engine.
    pub fn event_phase(&self, slot: usize) -> Result<EventPhase> {
        Ok(self
            .events
            .get(slot)?
            .map(|event| event.phase())
            .unwrap_or(EventPhase::Empty))
    }

    fn commit(&mut self) -> Result<()> {
        self.engine.update()?;
        Ok(())
    }

    /// Move `control` to `volume`, ramped when `fade_seconds` is positive.
    fn apply_volume(
        &mut self,
        control: Control,
        start: StartLevel,
        volume: f32,
        fade_seconds: f32,
    ) -> Result<()> {
        match FadeDuration::from_seconds(fade_seconds) {
            Some(duration) => {
                let schedule = fade::schedule_fade(
                    &mut self.engine,
                    control,
                    FadeRequest {
                        duration,
                        start,
                        end_volume: volume,
                        close_after: false,
                    },
                )?;
                debug!(
                    "fade on {:?}: {:.3} @ {} -> {:.3} @ {}",
                    control,
                    schedule.start.volume,
                    schedule.start.clock,
                    schedule.end.volume,
                    schedule.end.clock
                );
            }
            None => fade::set_instant_volume(&mut self.engine, control, volume)?,
        }
        Ok(())
    }

    /// Ramp `control` to silence and let the engine stop it at the end.
    fn fade_out_and_close(&mut self, control: Control, duration: FadeDuration) -> Result<()> {
        let schedule = fade::schedule_fade(
            &mut self.engine,
            control,
            FadeRequest {
                duration,
                start: StartLevel::Current,
                end_volume: 0.0,
                close_after: true,
            },
        )?;
        debug!("fade-out on {:?} stops at {:?}", control, schedule.stop_at);
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::registry;
    use super::*;
    use crate::engine::simulated::{SimulatedEngine, MIN_ENGINE_VERSION};
    use crate::engine::{EngineError, HEADER_MISMATCH_CODE};
    use crate::error::AmadeusError;

    #[test]
    fn init_sizes_tables_and_engine() {
        let amadeus = registry();
        assert_eq!(amadeus.channel_capacity(), 8);
        assert_eq!(amadeus.event_capacity(), 4);
        assert!(amadeus.engine().is_initialized());
    }

    #[test]
    fn init_surfaces_engine_version_mismatch() {
        let result = Amadeus::init(
            SimulatedEngine::new(),
            AmadeusConfig::new(4, 4, MIN_ENGINE_VERSION - 1),
        );
        let err = result.err().expect("version mismatch");
        assert_eq!(
            err,
            AmadeusError::EngineFailure(EngineError::Failure(HEADER_MISMATCH_CODE))
        );
        assert_eq!(err.engine_code(), Some(HEADER_MISMATCH_CODE));
    }

    #[test]
    fn shutdown_releases_engine() {
        let engine = registry().shutdown().expect("shutdown");
        assert!(!engine.is_initialized());
    }

    #[test]
    fn tick_on_idle_registry_reports_nothing() {
        let mut amadeus = registry();
        let report = amadeus.tick().expect("tick");
        assert!(report.is_empty());
    }
}
