//! The playback engine capability the registry drives.
//!
//! The registry never mixes audio itself. Everything audible (decoding,
//! the sample clock, fade interpolation, voice management) belongs to an
//! implementation of [`PlaybackEngine`]. Handles are opaque integers owned
//! by the engine; they may become invalid at any time the engine decides
//! to free the underlying voice.

use std::fmt::{Display, Formatter};
use std::path::Path;

pub mod simulated;

/// Native code reported for a handle the engine no longer recognises.
pub const INVALID_HANDLE_CODE: i32 = 30;
/// Native code reported when a file or asset cannot be found.
pub const FILE_NOT_FOUND_CODE: i32 = 18;
/// Native code reported when the requested engine version is not supported.
pub const HEADER_MISMATCH_CODE: i32 = 20;
/// Native code reported when a named event is not present in any loaded bank.
pub const EVENT_NOT_FOUND_CODE: i32 = 74;
/// Native code reported for calls made before `initialize` or after `release`.
pub const UNINITIALIZED_CODE: i32 = 36;
/// Native code reported when an event has no channel group yet.
pub const NOT_READY_CODE: i32 = 79;

/// Failure reported by a [`PlaybackEngine`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    /// The handle was freed or recycled by the engine.
    InvalidHandle,
    /// Any other engine failure, carrying the engine's native code.
    Failure(i32),
}

impl EngineError {
    /// Native integer code of this failure.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidHandle => INVALID_HANDLE_CODE,
            Self::Failure(code) => *code,
        }
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidHandle => write!(f, "invalid handle (code {})", INVALID_HANDLE_CODE),
            Self::Failure(code) => write!(f, "engine failure (code {})", code),
        }
    }
}

impl std::error::Error for EngineError {}

pub type EngineResult<T> = Result<T, EngineError>;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);
    };
}

handle!(
    /// A loaded (or streaming) sound asset.
    SoundHandle
);
handle!(
    /// One playing voice of a sound.
    ChannelHandle
);
handle!(
    /// The channel group an event drives once started.
    GroupHandle
);
handle!(
    /// A named event description resolved from a loaded bank.
    EventDescription
);
handle!(
    /// A playable instance of an event description.
    EventHandle
);

/// Anything carrying volume, a sample clock and a fade schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Channel(ChannelHandle),
    Group(GroupHandle),
}

impl From<ChannelHandle> for Control {
    fn from(handle: ChannelHandle) -> Self {
        Self::Channel(handle)
    }
}

impl From<GroupHandle> for Control {
    fn from(handle: GroupHandle) -> Self {
        Self::Group(handle)
    }
}

/// One vertex of a volume ramp interpolated by the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadePoint {
    pub clock: u64,
    pub volume: f32,
}

impl FadePoint {
    pub fn new(clock: u64, volume: f32) -> Self {
        Self { clock, volume }
    }
}

/// Fade level of an ordered point list at `clock`.
///
/// Levels are linear between points, held at the first point before it and
/// at the last point after it. An empty list means unity.
pub fn fade_level_at(points: &[FadePoint], clock: u64) -> f32 {
    let (first, last) = match (points.first(), points.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return 1.0,
    };
    if clock <= first.clock {
        return first.volume;
    }
    if clock >= last.clock {
        return last.volume;
    }

    for pair in points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if clock >= a.clock && clock <= b.clock {
            if b.clock == a.clock {
                return b.volume;
            }
            let t = (clock - a.clock) as f64 / (b.clock - a.clock) as f64;
            return a.volume + (b.volume - a.volume) * t as f32;
        }
    }

    last.volume
}

/// Playback state of an event instance as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    Playing,
    Sustaining,
    Stopped,
    Starting,
    Stopping,
}

/// How an event instance should stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Let authored release/fade-out behaviour run.
    AllowFadeOut,
    Immediate,
}

/// Host-supplied sound creation flags, passed through to the engine untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SoundMode(pub u32);

impl SoundMode {
    pub const DEFAULT: SoundMode = SoundMode(0x0000_0000);
    pub const LOOP_OFF: SoundMode = SoundMode(0x0000_0001);
    pub const LOOP_NORMAL: SoundMode = SoundMode(0x0000_0002);
    pub const CREATE_STREAM: SoundMode = SoundMode(0x0000_0080);
    pub const CREATE_SAMPLE: SoundMode = SoundMode(0x0000_0100);
    pub const NONBLOCKING: SoundMode = SoundMode(0x0001_0000);

    /// Raw flag bits.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Return true when every bit of `other` is set.
    pub fn contains(self, other: SoundMode) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for SoundMode {
    type Output = SoundMode;

    fn bitor(self, rhs: SoundMode) -> SoundMode {
        SoundMode(self.0 | rhs.0)
    }
}

/// Low-level mixing engine plus its higher-level event subsystem.
///
/// Calls are made from a single control thread. Mutations become visible
/// to queries after [`PlaybackEngine::update`].
pub trait PlaybackEngine {
    /// Create and initialise the mixer and event subsystem for `max_voices`
    /// simultaneous voices, checking the caller's engine `version`.
    fn initialize(&mut self, max_voices: usize, version: u32) -> EngineResult<()>;
    /// Release the event subsystem and the mixer.
    fn release(&mut self) -> EngineResult<()>;
    /// Commit pending changes and advance engine-side state.
    fn update(&mut self) -> EngineResult<()>;

    /// Output sample rate of the mixer.
    fn sample_rate(&self) -> EngineResult<u32>;
    /// Block the mixer from processing until [`PlaybackEngine::unlock_dsp`].
    fn lock_dsp(&mut self) -> EngineResult<()>;
    fn unlock_dsp(&mut self) -> EngineResult<()>;

    fn create_sound(&mut self, path: &Path, mode: SoundMode) -> EngineResult<SoundHandle>;
    /// Start a new unpaused channel for `sound`.
    fn play_sound(&mut self, sound: SoundHandle) -> EngineResult<ChannelHandle>;

    fn is_playing(&self, control: Control) -> EngineResult<bool>;
    fn stop(&mut self, control: Control) -> EngineResult<()>;
    fn volume(&self, control: Control) -> EngineResult<f32>;
    fn set_volume(&mut self, control: Control, volume: f32) -> EngineResult<()>;
    /// Enable or disable the engine's click-avoidance ramp on volume changes.
    fn set_volume_ramp(&mut self, control: Control, ramp: bool) -> EngineResult<()>;
    /// Current position of the control's sample clock.
    fn dsp_clock(&self, control: Control) -> EngineResult<u64>;
    /// Pending fade points, ordered by clock.
    fn fade_points(&self, control: Control) -> EngineResult<Vec<FadePoint>>;
    fn add_fade_point(&mut self, control: Control, point: FadePoint) -> EngineResult<()>;
    /// Remove every fade point with `start <= clock <= end`.
    fn remove_fade_points(&mut self, control: Control, start: u64, end: u64) -> EngineResult<()>;
    /// Schedule the control to play from `start` and, when `stop` is set,
    /// to stop at `end`. `(0, 0, false)` clears any pending delay.
    fn set_delay(&mut self, control: Control, start: u64, end: u64, stop: bool)
        -> EngineResult<()>;

    fn load_bank(&mut self, path: &Path) -> EngineResult<()>;
    fn event_description(&mut self, name: &str) -> EngineResult<EventDescription>;
    fn create_instance(&mut self, description: EventDescription) -> EngineResult<EventHandle>;
    fn set_parameter(&mut self, event: EventHandle, name: &str, value: f32) -> EngineResult<()>;
    /// Event-level gain, applied on top of the channel group's volume.
    fn set_event_volume(&mut self, event: EventHandle, volume: f32) -> EngineResult<()>;
    fn start_event(&mut self, event: EventHandle) -> EngineResult<()>;
    /// Mark the instance for destruction once it stops.
    fn release_event(&mut self, event: EventHandle) -> EngineResult<()>;
    fn stop_event(&mut self, event: EventHandle, mode: StopMode) -> EngineResult<()>;
    fn event_state(&self, event: EventHandle) -> EngineResult<EventState>;
    fn event_channel_group(&self, event: EventHandle) -> EngineResult<GroupHandle>;
    /// Timeline position in milliseconds.
    fn timeline_position(&self, event: EventHandle) -> EngineResult<i32>;
    fn set_timeline_position(&mut self, event: EventHandle, position_ms: i32)
        -> EngineResult<()>;
}
