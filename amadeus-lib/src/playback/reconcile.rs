//! Keeps slot tables consistent with engine-side terminations.
//!
//! Liveness is never cached: every check asks the engine. A handle the
//! engine no longer recognises, or one that reports it is not playing, is
//! routine and simply empties the slot. Any other engine failure is
//! returned to the caller.

use log::debug;

use crate::engine::{ChannelHandle, Control, EngineError, EngineResult, PlaybackEngine, StopMode};
use crate::error::Result;

use super::slots::{EventSlot, SlotTable};

/// Slots emptied by one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub reclaimed_channels: Vec<usize>,
    pub reclaimed_events: Vec<usize>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.reclaimed_channels.is_empty() && self.reclaimed_events.is_empty()
    }
}

/// `Ok(false)` for the tolerated "gone" answers, the error otherwise.
fn control_is_live<E>(engine: &E, control: Control) -> EngineResult<bool>
where
    E: PlaybackEngine + ?Sized,
{
    match engine.is_playing(control) {
        Ok(playing) => Ok(playing),
        Err(EngineError::InvalidHandle) => Ok(false),
        Err(err) => Err(err),
    }
}

/// Return the channel in `id` if it is still playing, emptying the slot if not.
pub fn validate_channel<E>(
    engine: &mut E,
    channels: &mut SlotTable<ChannelHandle>,
    id: usize,
) -> Result<Option<ChannelHandle>>
where
    E: PlaybackEngine + ?Sized,
{
    let Some(channel) = channels.get(id)? else {
        return Ok(None);
    };

    if control_is_live(engine, channel.into())? {
        return Ok(Some(channel));
    }

    debug!("channel slot {} finished, reclaiming", id);
    channels.clear(id)?;
    Ok(None)
}

/// Return the event in `id` if it is still live, stopping and emptying it if not.
///
/// A loaded but unstarted event is live while the engine still knows the
/// instance. Once started, liveness follows the bound channel group only.
pub fn validate_event<E>(
    engine: &mut E,
    events: &mut SlotTable<EventSlot>,
    id: usize,
) -> Result<Option<EventSlot>>
where
    E: PlaybackEngine + ?Sized,
{
    let Some(slot) = events.get(id)? else {
        return Ok(None);
    };

    let live = match slot {
        EventSlot::Loaded { instance } => match engine.event_state(instance) {
            Ok(_) => true,
            Err(EngineError::InvalidHandle) => {
                debug!("event slot {} instance vanished before start", id);
                events.clear(id)?;
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        },
        EventSlot::Starting { .. } => false,
        EventSlot::Playing { group, .. } => control_is_live(engine, group.into())?,
    };

    if live {
        return Ok(Some(slot));
    }

    match engine.stop_event(slot.instance(), StopMode::AllowFadeOut) {
        Ok(()) | Err(EngineError::InvalidHandle) => {}
        Err(err) => return Err(err.into()),
    }
    debug!("event slot {} no longer audible, reclaiming", id);
    events.clear(id)?;
    Ok(None)
}

/// Validate every occupied slot of both pools.
pub fn sweep<E>(
    engine: &mut E,
    channels: &mut SlotTable<ChannelHandle>,
    events: &mut SlotTable<EventSlot>,
) -> Result<ReconcileReport>
where
    E: PlaybackEngine + ?Sized,
{
    let mut report = ReconcileReport::default();

    for id in channels.occupied() {
        if validate_channel(engine, channels, id)?.is_none() {
            report.reclaimed_channels.push(id);
        }
    }
    for id in events.occupied() {
        if validate_event(engine, events, id)?.is_none() {
            report.reclaimed_events.push(id);
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::simulated::{SimulatedEngine, SimulatedEventSpec, MIN_ENGINE_VERSION};
    use crate::engine::SoundMode;
    use crate::error::AmadeusError;
    use crate::playback::slots::SlotPool;
    use std::path::Path;

    fn engine() -> SimulatedEngine {
        let mut engine = SimulatedEngine::with_timing(1_000, 100);
        engine.register_sound("short.wav", 0.2);
        engine.register_sound("long.wav", 30.0);
        engine.register_bank(
            "master.bank",
            vec![
                SimulatedEventSpec::new("event:/short", 0.2).with_start_latency(1),
                SimulatedEventSpec::looping("event:/ambience").with_start_latency(1),
            ],
        );
        engine.initialize(16, MIN_ENGINE_VERSION).expect("initialize");
        engine.load_bank(Path::new("master.bank")).expect("bank");
        engine
    }

    fn play(engine: &mut SimulatedEngine, path: &str) -> ChannelHandle {
        let sound = engine
            .create_sound(Path::new(path), SoundMode::DEFAULT)
            .expect("sound");
        engine.play_sound(sound).expect("play")
    }

    fn started_event(engine: &mut SimulatedEngine, name: &str) -> EventSlot {
        let description = engine.event_description(name).expect("description");
        let instance = engine.create_instance(description).expect("instance");
        engine.start_event(instance).expect("start");
        engine.release_event(instance).expect("release");
        engine.update().expect("update");
        let group = engine.event_channel_group(instance).expect("group");
        EventSlot::Playing { instance, group }
    }

    #[test]
    fn live_channel_is_returned() {
        let mut engine = engine();
        let mut channels = SlotTable::new(SlotPool::Channel, 4);
        let channel = play(&mut engine, "long.wav");
        channels.set(2, channel).expect("set");

        assert_eq!(validate_channel(&mut engine, &mut channels, 2), Ok(Some(channel)));
        assert_eq!(channels.get(2), Ok(Some(channel)));
    }

    #[test]
    fn naturally_finished_channel_is_cleared() {
        let mut engine = engine();
        let mut channels = SlotTable::new(SlotPool::Channel, 4);
        channels.set(0, play(&mut engine, "short.wav")).expect("set");

        engine.advance_seconds(0.2).expect("advance");
        assert_eq!(validate_channel(&mut engine, &mut channels, 0), Ok(None));
        assert_eq!(channels.get(0), Ok(None));
    }

    #[test]
    fn stolen_channel_is_cleared() {
        let mut engine = engine();
        let mut channels = SlotTable::new(SlotPool::Channel, 4);
        let channel = play(&mut engine, "long.wav");
        channels.set(1, channel).expect("set");
        engine.steal_channel(channel);

        assert_eq!(validate_channel(&mut engine, &mut channels, 1), Ok(None));
        assert_eq!(channels.get(1), Ok(None));
    }

    #[test]
    fn other_engine_failures_are_fatal_and_keep_the_slot() {
        let mut engine = engine();
        let mut channels = SlotTable::new(SlotPool::Channel, 4);
        let channel = play(&mut engine, "long.wav");
        channels.set(1, channel).expect("set");
        engine.inject_failure(28);

        assert_eq!(
            validate_channel(&mut engine, &mut channels, 1),
            Err(AmadeusError::EngineFailure(EngineError::Failure(28)))
        );
        assert_eq!(channels.get(1), Ok(Some(channel)));
    }

    #[test]
    fn loaded_event_stays_live() {
        let mut engine = engine();
        let mut events = SlotTable::new(SlotPool::Event, 4);
        let description = engine.event_description("event:/short").expect("description");
        let instance = engine.create_instance(description).expect("instance");
        events.set(0, EventSlot::Loaded { instance }).expect("set");

        engine.advance_seconds(1.0).expect("advance");
        assert_eq!(
            validate_event(&mut engine, &mut events, 0),
            Ok(Some(EventSlot::Loaded { instance }))
        );
    }

    #[test]
    fn starting_event_without_channel_is_stopped_and_cleared() {
        let mut engine = engine();
        engine.stall_event_starts(true);
        let mut events = SlotTable::new(SlotPool::Event, 4);
        let description = engine.event_description("event:/ambience").expect("description");
        let instance = engine.create_instance(description).expect("instance");
        engine.start_event(instance).expect("start");
        events.set(3, EventSlot::Starting { instance }).expect("set");

        assert_eq!(validate_event(&mut engine, &mut events, 3), Ok(None));
        assert_eq!(events.get(3), Ok(None));
        assert_eq!(
            engine.event_state(instance),
            Ok(crate::engine::EventState::Stopped)
        );
    }

    #[test]
    fn event_follows_its_channel_group() {
        let mut engine = engine();
        let mut events = SlotTable::new(SlotPool::Event, 4);
        let slot = started_event(&mut engine, "event:/short");
        events.set(1, slot).expect("set");

        assert_eq!(validate_event(&mut engine, &mut events, 1), Ok(Some(slot)));
        engine.advance_seconds(0.3).expect("advance");
        assert_eq!(validate_event(&mut engine, &mut events, 1), Ok(None));
        assert_eq!(events.get(1), Ok(None));
    }

    #[test]
    fn sweep_reclaims_each_dead_slot_once() {
        let mut engine = engine();
        let mut channels = SlotTable::new(SlotPool::Channel, 4);
        let mut events = SlotTable::new(SlotPool::Event, 4);
        channels.set(0, play(&mut engine, "short.wav")).expect("set");
        channels.set(1, play(&mut engine, "long.wav")).expect("set");
        events
            .set(2, started_event(&mut engine, "event:/short"))
            .expect("set");
        events
            .set(3, started_event(&mut engine, "event:/ambience"))
            .expect("set");

        engine.advance_seconds(0.5).expect("advance");
        let report = sweep(&mut engine, &mut channels, &mut events).expect("sweep");
        assert_eq!(report.reclaimed_channels, vec![0]);
        assert_eq!(report.reclaimed_events, vec![2]);

        let again = sweep(&mut engine, &mut channels, &mut events).expect("sweep");
        assert!(again.is_empty());
        assert_eq!(channels.occupied(), vec![1]);
        assert_eq!(events.occupied(), vec![3]);
    }
}
