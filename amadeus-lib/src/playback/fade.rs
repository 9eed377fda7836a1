//! Sample-accurate volume fades.
//!
//! A fade is two fade points on the target's sample clock, installed while
//! the mixer is locked. The engine interpolates between them, so the ramp
//! is independent of when the host happens to call in. Instant volume
//! changes take a separate path that never locks unless a schedule has to
//! be cancelled.

use crate::engine::{fade_level_at, Control, EngineResult, FadePoint, PlaybackEngine};

/// A strictly positive, finite fade length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeDuration(f32);

impl FadeDuration {
    /// `None` for zero, negative or non-finite lengths; callers then take
    /// the instant path.
    pub fn from_seconds(seconds: f32) -> Option<Self> {
        if seconds.is_finite() && seconds > 0.0 {
            Some(Self(seconds))
        } else {
            None
        }
    }

    pub fn seconds(&self) -> f32 {
        self.0
    }

    /// Length in samples at `sample_rate`, rounded to the nearest sample.
    pub fn samples(&self, sample_rate: u32) -> u64 {
        (sample_rate as f64 * self.0 as f64).round() as u64
    }
}

/// Level the ramp starts from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartLevel {
    Volume(f32),
    /// Whatever is audible at the moment the ramp is installed.
    Current,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeRequest {
    pub duration: FadeDuration,
    pub start: StartLevel,
    pub end_volume: f32,
    /// Stop the control when the ramp ends.
    pub close_after: bool,
}

/// What was installed on the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeSchedule {
    pub start: FadePoint,
    pub end: FadePoint,
    /// Clock at which the control auto-stops, when requested.
    pub stop_at: Option<u64>,
    /// Pending points of an earlier schedule that were removed.
    pub cancelled_points: usize,
}

/// Level audible on `control` right now: its volume times the fade level
/// at the current clock.
pub fn current_level<E>(engine: &E, control: Control) -> EngineResult<f32>
where
    E: PlaybackEngine + ?Sized,
{
    let clock = engine.dsp_clock(control)?;
    let points = engine.fade_points(control)?;
    Ok(engine.volume(control)? * fade_level_at(&points, clock))
}

/// Run `f` with the mixer locked, unlocking even when `f` fails.
fn with_dsp_locked<E, T>(
    engine: &mut E,
    f: impl FnOnce(&mut E) -> EngineResult<T>,
) -> EngineResult<T>
where
    E: PlaybackEngine + ?Sized,
{
    engine.lock_dsp()?;
    let result = f(engine);
    let unlocked = engine.unlock_dsp();
    let value = result?;
    unlocked?;
    Ok(value)
}

/// Install a ramp on `control`, replacing any schedule still pending.
pub fn schedule_fade<E>(
    engine: &mut E,
    control: Control,
    request: FadeRequest,
) -> EngineResult<FadeSchedule>
where
    E: PlaybackEngine + ?Sized,
{
    with_dsp_locked(engine, |engine| install_fade(engine, control, request))
}

fn install_fade<E>(
    engine: &mut E,
    control: Control,
    request: FadeRequest,
) -> EngineResult<FadeSchedule>
where
    E: PlaybackEngine + ?Sized,
{
    let samples = request.duration.samples(engine.sample_rate()?);
    let clock = engine.dsp_clock(control)?;
    let end_clock = clock + samples;

    let pending = engine.fade_points(control)?;
    let start_volume = match request.start {
        StartLevel::Volume(volume) => volume,
        StartLevel::Current => engine.volume(control)? * fade_level_at(&pending, clock),
    };

    let mut cancelled_points = 0;
    if !pending.is_empty() {
        // Cover the tail of a longer earlier ramp as well as our own window.
        let window_end = pending
            .last()
            .map(|point| point.clock.max(end_clock))
            .unwrap_or(end_clock);
        cancelled_points = pending
            .iter()
            .filter(|point| point.clock >= clock && point.clock <= window_end)
            .count();
        engine.set_delay(control, 0, 0, false)?;
        engine.remove_fade_points(control, clock, window_end)?;
    }

    // Fade points carry the whole level from here on.
    engine.set_volume(control, 1.0)?;

    let start = FadePoint::new(clock, start_volume);
    let end = FadePoint::new(end_clock, request.end_volume);
    engine.add_fade_point(control, start)?;
    engine.add_fade_point(control, end)?;

    let stop_at = if request.close_after {
        engine.set_delay(control, 0, end_clock, true)?;
        Some(end_clock)
    } else {
        None
    };

    Ok(FadeSchedule {
        start,
        end,
        stop_at,
        cancelled_points,
    })
}

/// Set `volume` immediately, dropping any pending ramp or auto-stop.
pub fn set_instant_volume<E>(engine: &mut E, control: Control, volume: f32) -> EngineResult<()>
where
    E: PlaybackEngine + ?Sized,
{
    if !engine.fade_points(control)?.is_empty() {
        with_dsp_locked(engine, |engine| {
            engine.set_delay(control, 0, 0, false)?;
            engine.remove_fade_points(control, 0, u64::MAX)
        })?;
    }
    engine.set_volume_ramp(control, false)?;
    engine.set_volume(control, volume)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::simulated::{SimulatedEngine, MIN_ENGINE_VERSION};
    use crate::engine::{EngineError, SoundMode};
    use std::path::Path;

    fn engine_with_channel(mode: SoundMode) -> (SimulatedEngine, Control) {
        let mut engine = SimulatedEngine::with_timing(1_000, 100);
        engine.register_sound("loop.ogg", 60.0);
        engine.initialize(8, MIN_ENGINE_VERSION).expect("initialize");
        let sound = engine
            .create_sound(Path::new("loop.ogg"), mode)
            .expect("sound");
        let channel = engine.play_sound(sound).expect("play");
        (engine, channel.into())
    }

    fn fade(seconds: f32, start: StartLevel, end_volume: f32, close_after: bool) -> FadeRequest {
        FadeRequest {
            duration: FadeDuration::from_seconds(seconds).expect("duration"),
            start,
            end_volume,
            close_after,
        }
    }

    #[test]
    fn non_positive_durations_take_the_instant_path() {
        assert_eq!(FadeDuration::from_seconds(0.0), None);
        assert_eq!(FadeDuration::from_seconds(-1.0), None);
        assert_eq!(FadeDuration::from_seconds(f32::NAN), None);
        assert_eq!(FadeDuration::from_seconds(f32::INFINITY), None);
        assert!(FadeDuration::from_seconds(0.01).is_some());
    }

    #[test]
    fn samples_round_to_nearest() {
        let half = FadeDuration::from_seconds(0.5).expect("duration");
        assert_eq!(half.samples(44_100), 22_050);
        let tiny = FadeDuration::from_seconds(0.0015).expect("duration");
        assert_eq!(tiny.samples(1_000), 2);
    }

    #[test]
    fn installs_ramp_at_current_clock_under_lock() {
        let (mut engine, channel) = engine_with_channel(SoundMode::DEFAULT);
        engine.advance_seconds(0.3).expect("advance");

        let schedule = schedule_fade(
            &mut engine,
            channel,
            fade(2.0, StartLevel::Volume(0.0), 0.8, false),
        )
        .expect("fade");

        assert_eq!(schedule.start, FadePoint::new(300, 0.0));
        assert_eq!(schedule.end, FadePoint::new(2_300, 0.8));
        assert_eq!(schedule.stop_at, None);
        assert_eq!(
            engine.fade_points(channel).expect("points"),
            vec![schedule.start, schedule.end]
        );
        assert!(!engine.is_dsp_locked());
        assert_eq!(engine.unlocked_schedule_writes(), 0);

        engine.advance_seconds(1.0).expect("advance");
        let gain = engine.effective_gain(channel).expect("gain");
        assert!((gain - 0.4).abs() < 1e-4);
    }

    #[test]
    fn retrigger_replaces_pending_points() {
        let (mut engine, channel) = engine_with_channel(SoundMode::DEFAULT);
        schedule_fade(
            &mut engine,
            channel,
            fade(2.0, StartLevel::Volume(0.0), 0.8, false),
        )
        .expect("first fade");
        engine.advance_seconds(0.5).expect("advance");

        let second = schedule_fade(
            &mut engine,
            channel,
            fade(0.5, StartLevel::Current, 0.3, false),
        )
        .expect("second fade");

        assert_eq!(second.cancelled_points, 1);
        let points = engine.fade_points(channel).expect("points");
        let after_start: Vec<FadePoint> = points
            .iter()
            .copied()
            .filter(|point| point.clock >= second.start.clock)
            .collect();
        assert_eq!(after_start, vec![second.start, second.end]);
        assert!((second.start.volume - 0.2).abs() < 1e-4);
    }

    #[test]
    fn current_level_follows_the_ramp() {
        let (mut engine, channel) = engine_with_channel(SoundMode::DEFAULT);
        engine.set_volume(channel, 0.5).expect("volume");
        assert_eq!(current_level(&engine, channel), Ok(0.5));

        schedule_fade(
            &mut engine,
            channel,
            fade(1.0, StartLevel::Current, 1.0, false),
        )
        .expect("fade");
        engine.advance_seconds(0.5).expect("advance");
        let level = current_level(&engine, channel).expect("level");
        assert!((level - 0.75).abs() < 1e-4);
    }

    #[test]
    fn close_after_stops_channel_at_ramp_end() {
        let (mut engine, channel) = engine_with_channel(SoundMode::LOOP_NORMAL);
        let schedule = schedule_fade(
            &mut engine,
            channel,
            fade(0.25, StartLevel::Current, 0.0, true),
        )
        .expect("fade");
        assert_eq!(schedule.stop_at, Some(250));
        assert_eq!(engine.pending_delay(channel), Some((0, 250, true)));

        engine.advance_seconds(0.2).expect("advance");
        assert_eq!(engine.is_playing(channel), Ok(true));
        engine.advance_seconds(0.1).expect("advance");
        assert_eq!(engine.is_playing(channel), Ok(false));
    }

    #[test]
    fn retrigger_cancels_pending_auto_stop() {
        let (mut engine, channel) = engine_with_channel(SoundMode::LOOP_NORMAL);
        schedule_fade(&mut engine, channel, fade(1.0, StartLevel::Current, 0.0, true))
            .expect("fade out");
        schedule_fade(&mut engine, channel, fade(1.0, StartLevel::Current, 1.0, false))
            .expect("fade back in");
        assert_eq!(engine.pending_delay(channel), None);

        engine.advance_seconds(2.0).expect("advance");
        assert_eq!(engine.is_playing(channel), Ok(true));
    }

    #[test]
    fn instant_volume_drops_schedule() {
        let (mut engine, channel) = engine_with_channel(SoundMode::DEFAULT);
        schedule_fade(
            &mut engine,
            channel,
            fade(2.0, StartLevel::Volume(0.0), 1.0, true),
        )
        .expect("fade");

        set_instant_volume(&mut engine, channel, 0.3).expect("instant");

        assert!(engine.fade_points(channel).expect("points").is_empty());
        assert_eq!(engine.pending_delay(channel), None);
        assert_eq!(engine.volume_ramp(channel), Some(false));
        assert_eq!(engine.effective_gain(channel), Some(0.3));
        assert_eq!(engine.unlocked_schedule_writes(), 0);
    }

    #[test]
    fn failure_inside_bracket_still_unlocks() {
        let (mut engine, channel) = engine_with_channel(SoundMode::DEFAULT);
        if let Control::Channel(handle) = channel {
            engine.steal_channel(handle);
        }
        let result = schedule_fade(
            &mut engine,
            channel,
            fade(1.0, StartLevel::Volume(0.0), 1.0, false),
        );
        assert_eq!(result, Err(EngineError::InvalidHandle));
        assert!(!engine.is_dsp_locked());
    }
}
