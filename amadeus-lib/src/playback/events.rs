//! Event slots: load, start, stop, volume and timeline control.
//!
//! Audible level of a started event is always driven through its channel
//! group, never the instance gain, so the fade scheduler treats events and
//! raw sounds the same way.

use std::path::Path;
use std::thread;
use std::time::Instant;

use log::{debug, info, warn};

use crate::engine::{
    EngineError, EngineResult, EventHandle, EventState, PlaybackEngine, StopMode,
};
use crate::error::{AmadeusError, Result, StartStage};

use super::fade::{FadeDuration, StartLevel};
use super::reconcile::validate_event;
use super::slots::EventSlot;
use super::{Amadeus, StartWaitSettings};

impl<E: PlaybackEngine> Amadeus<E> {
    /// Load an asset bank. No handle is kept.
    pub fn load_bank(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.engine.load_bank(path)?;
        info!("loaded bank {}", path.display());
        self.commit()
    }

    /// Instantiate the event `name` into `slot`. A slot that already holds
    /// a live event is left untouched.
    pub fn load_event(&mut self, name: &str, slot: usize) -> Result<()> {
        if let Some(existing) = self.checked_event(slot)? {
            debug!(
                "load_event: slot {} already holds {:?}, ignoring {}",
                slot, existing, name
            );
            return Ok(());
        }

        let description = self.engine.event_description(name)?;
        let instance = self.engine.create_instance(description)?;
        self.events.set(slot, EventSlot::Loaded { instance })?;
        self.commit()
    }

    pub fn is_event_loaded(&mut self, slot: usize) -> Result<bool> {
        Ok(self.checked_event(slot)?.is_some())
    }

    pub fn set_event_param(&mut self, slot: usize, name: &str, value: f32) -> Result<()> {
        let event = self.live_event(slot)?;
        self.engine.set_parameter(event.instance(), name, value)?;
        self.commit()
    }

    /// Start the event loaded in `slot` and bind its channel group.
    ///
    /// Blocks until the engine reports the group playing, bounded by the
    /// start wait settings. Opening volume and fade apply to the group.
    pub fn start_event(&mut self, slot: usize, volume: f32, fade_seconds: f32) -> Result<()> {
        let instance = match self.live_event(slot)? {
            EventSlot::Loaded { instance } => instance,
            started => {
                debug!("start_event: slot {} already started ({:?})", slot, started);
                return Ok(());
            }
        };

        self.engine.set_event_volume(instance, 1.0)?;
        self.engine.start_event(instance)?;
        self.engine.release_event(instance)?;
        self.events.set(slot, EventSlot::Starting { instance })?;

        let started = Instant::now();
        let progress = self.wait_for_start(slot, started, StartStage::LeavingStarting, |engine| {
            match engine.event_state(instance) {
                Ok(EventState::Starting) => Ok(StartProgress::Waiting),
                Ok(EventState::Stopped) | Err(EngineError::InvalidHandle) => {
                    Ok(StartProgress::Ended)
                }
                Ok(_) => Ok(StartProgress::Reached),
                Err(err) => Err(err),
            }
        })?;
        if progress == StartProgress::Ended {
            return self.finish_ended_start(slot);
        }

        let group = match self.engine.event_channel_group(instance) {
            Ok(group) => group,
            Err(EngineError::InvalidHandle) => return self.finish_ended_start(slot),
            Err(err) => return Err(err.into()),
        };
        let progress =
            self.wait_for_start(slot, started, StartStage::ChannelGroupPlaying, |engine| {
                match engine.is_playing(group.into()) {
                    Ok(true) => Ok(StartProgress::Reached),
                    Ok(false) | Err(EngineError::InvalidHandle) => {
                        instance_progress(engine, instance)
                    }
                    Err(err) => Err(err),
                }
            })?;
        if progress == StartProgress::Ended {
            return self.finish_ended_start(slot);
        }
        debug!(
            "event slot {} playing on {:?} after {:?}",
            slot,
            group,
            started.elapsed()
        );

        self.events.set(slot, EventSlot::Playing { instance, group })?;
        self.apply_volume(group.into(), StartLevel::Volume(0.0), volume, fade_seconds)?;
        self.commit()
    }

    /// Stop the event in `slot`.
    ///
    /// A positive `fade_seconds` on a playing event ramps its channel group
    /// to silence and lets the engine stop it; the slot is reclaimed by a
    /// later tick. Otherwise the event stops at once and the slot is freed.
    pub fn stop_event(&mut self, slot: usize, fade_seconds: f32) -> Result<()> {
        let Some(event) = self.checked_event(slot)? else {
            debug!("stop_event: event slot {} not loaded", slot);
            return Ok(());
        };

        if let (Some(group), Some(duration)) =
            (event.group(), FadeDuration::from_seconds(fade_seconds))
        {
            self.fade_out_and_close(group.into(), duration)?;
            return self.commit();
        }

        self.engine
            .stop_event(event.instance(), StopMode::AllowFadeOut)?;
        if let EventSlot::Loaded { instance } = event {
            self.engine.release_event(instance)?;
        }
        self.commit()?;
        self.events.clear(slot)?;
        Ok(())
    }

    /// Change the volume of a playing event. Ignored before the event plays.
    pub fn set_event_volume(&mut self, slot: usize, volume: f32, fade_seconds: f32) -> Result<()> {
        let Some(EventSlot::Playing { group, .. }) =
            self.checked_event(slot)?
        else {
            debug!("set_event_volume: event slot {} not playing", slot);
            return Ok(());
        };

        self.apply_volume(group.into(), StartLevel::Current, volume, fade_seconds)?;
        self.commit()
    }

    /// Move the event timeline forward to `seconds`. Never seeks backwards.
    pub fn ensure_event_time_elapsed(&mut self, slot: usize, seconds: f32) -> Result<()> {
        let Some(event) = self.checked_event(slot)? else {
            debug!("ensure_event_time_elapsed: event slot {} not loaded", slot);
            return Ok(());
        };

        let target_ms = (seconds as f64 * 1000.0)
            .round()
            .clamp(0.0, i32::MAX as f64) as i32;
        let current_ms = self.engine.timeline_position(event.instance())?;
        if current_ms >= target_ms {
            return Ok(());
        }

        self.engine
            .set_timeline_position(event.instance(), target_ms)?;
        self.commit()
    }

    fn live_event(&mut self, slot: usize) -> Result<EventSlot> {
        self.checked_event(slot)?.ok_or(AmadeusError::NotLoaded(slot))
    }

    /// Validate `slot`, committing the stop issued for a reclaimed event.
    fn checked_event(&mut self, slot: usize) -> Result<Option<EventSlot>> {
        let occupied = self.events.get(slot)?.is_some();
        let event = validate_event(&mut self.engine, &mut self.events, slot)?;
        if occupied && event.is_none() {
            self.commit()?;
        }
        Ok(event)
    }

    /// The event ran to its end before its group could be bound.
    fn finish_ended_start(&mut self, slot: usize) -> Result<()> {
        debug!("event slot {} ended while starting, reclaiming", slot);
        self.events.clear(slot)?;
        self.commit()
    }

    /// Commit and poll `progress` until it leaves `Waiting` or the start
    /// budget runs out.
    fn wait_for_start(
        &mut self,
        slot: usize,
        started: Instant,
        stage: StartStage,
        mut progress: impl FnMut(&E) -> EngineResult<StartProgress>,
    ) -> Result<StartProgress> {
        let StartWaitSettings {
            timeout,
            poll_interval,
        } = self.start_wait;

        loop {
            self.engine.update()?;
            match progress(&self.engine)? {
                StartProgress::Waiting => {}
                done => return Ok(done),
            }

            let waited = started.elapsed();
            if waited >= timeout {
                warn!(
                    "event slot {} start timed out after {:?} ({})",
                    slot, waited, stage
                );
                return Err(AmadeusError::StartTimeout {
                    slot,
                    stage,
                    waited,
                });
            }
            thread::sleep(poll_interval);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartProgress {
    Waiting,
    Reached,
    /// The instance stopped or was destroyed by the engine.
    Ended,
}

/// Progress of an event whose group is not (or no longer) playing.
fn instance_progress<E>(engine: &E, instance: EventHandle) -> EngineResult<StartProgress>
where
    E: PlaybackEngine + ?Sized,
{
    match engine.event_state(instance) {
        Ok(EventState::Stopped | EventState::Stopping) | Err(EngineError::InvalidHandle) => {
            Ok(StartProgress::Ended)
        }
        Ok(_) => Ok(StartProgress::Waiting),
        Err(err) => Err(err),
    }
}
