//! Deterministic in-memory [`PlaybackEngine`].
//!
//! Models handle lifetimes, the sample clock, fade schedules and the event
//! start sequence without producing audio. Time only moves on `update()`.

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{
    fade_level_at, ChannelHandle, Control, EngineError, EngineResult, EventDescription,
    EventHandle, EventState, FadePoint, GroupHandle, PlaybackEngine, SoundHandle, SoundMode,
    StopMode, EVENT_NOT_FOUND_CODE, FILE_NOT_FOUND_CODE, HEADER_MISMATCH_CODE, NOT_READY_CODE,
    UNINITIALIZED_CODE,
};

/// Oldest engine version the simulation accepts.
pub const MIN_ENGINE_VERSION: u32 = 0x0002_0000;
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
/// 50 ms at 44.1 kHz, one 20 Hz host tick.
pub const DEFAULT_SAMPLES_PER_UPDATE: u64 = 2_205;
const DEFAULT_START_LATENCY_UPDATES: u32 = 2;

fn default_start_latency() -> u32 {
    DEFAULT_START_LATENCY_UPDATES
}

/// An event authored into a simulated bank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedEventSpec {
    pub name: String,
    /// Content length; `None` loops forever.
    #[serde(default)]
    pub length_seconds: Option<f64>,
    /// Updates spent in `Starting` before the channel group plays.
    #[serde(default = "default_start_latency")]
    pub start_latency_updates: u32,
}

impl SimulatedEventSpec {
    /// One-shot event of the given length.
    pub fn new(name: &str, length_seconds: f64) -> Self {
        Self {
            name: name.to_string(),
            length_seconds: Some(length_seconds),
            start_latency_updates: DEFAULT_START_LATENCY_UPDATES,
        }
    }

    /// Event that never ends on its own.
    pub fn looping(name: &str) -> Self {
        Self {
            name: name.to_string(),
            length_seconds: None,
            start_latency_updates: DEFAULT_START_LATENCY_UPDATES,
        }
    }

    pub fn with_start_latency(mut self, updates: u32) -> Self {
        self.start_latency_updates = updates;
        self
    }
}

#[derive(Debug, Clone)]
struct SimControl {
    volume: f32,
    ramp: bool,
    fade_points: Vec<FadePoint>,
    delay: Option<(u64, u64, bool)>,
    end_clock: Option<u64>,
    playing: bool,
}

impl SimControl {
    fn started_at(clock: u64, length_samples: Option<u64>) -> Self {
        Self {
            volume: 1.0,
            ramp: true,
            fade_points: Vec::new(),
            delay: None,
            end_clock: length_samples.map(|length| clock + length),
            playing: true,
        }
    }

    fn advance(&mut self, clock: u64) {
        if !self.playing {
            return;
        }
        if matches!(self.end_clock, Some(end) if clock >= end) {
            self.playing = false;
        }
        if matches!(self.delay, Some((_, end, true)) if clock >= end) {
            self.playing = false;
        }
    }
}

#[derive(Debug, Clone)]
struct SimInstance {
    description: u64,
    state: EventState,
    volume: f32,
    params: HashMap<String, f32>,
    released: bool,
    group: Option<u64>,
    starting_updates_left: u32,
    timeline_origin: u64,
    timeline_offset_ms: i64,
}

/// In-memory engine used by tests and the CLI.
#[derive(Debug)]
pub struct SimulatedEngine {
    sample_rate: u32,
    samples_per_update: u64,
    clock: u64,
    initialized: bool,
    max_voices: usize,
    dsp_lock_depth: u32,
    unlocked_schedule_writes: u64,
    stall_event_starts: bool,
    stall_group_playback: bool,
    injected_failure: Cell<Option<i32>>,
    next_handle: u64,
    sound_library: HashMap<PathBuf, f64>,
    bank_library: HashMap<PathBuf, Vec<SimulatedEventSpec>>,
    loaded_banks: Vec<PathBuf>,
    sounds: HashMap<u64, Option<u64>>,
    channels: BTreeMap<u64, SimControl>,
    groups: HashMap<u64, SimControl>,
    descriptions: HashMap<u64, SimulatedEventSpec>,
    description_by_name: HashMap<String, u64>,
    instances: HashMap<u64, SimInstance>,
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedEngine {
    /// Engine at 44.1 kHz advancing one 20 Hz tick per update.
    pub fn new() -> Self {
        Self::with_timing(DEFAULT_SAMPLE_RATE, DEFAULT_SAMPLES_PER_UPDATE)
    }

    pub fn with_timing(sample_rate: u32, samples_per_update: u64) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            samples_per_update: samples_per_update.max(1),
            clock: 0,
            initialized: false,
            max_voices: 0,
            dsp_lock_depth: 0,
            unlocked_schedule_writes: 0,
            stall_event_starts: false,
            stall_group_playback: false,
            injected_failure: Cell::new(None),
            next_handle: 1,
            sound_library: HashMap::new(),
            bank_library: HashMap::new(),
            loaded_banks: Vec::new(),
            sounds: HashMap::new(),
            channels: BTreeMap::new(),
            groups: HashMap::new(),
            descriptions: HashMap::new(),
            description_by_name: HashMap::new(),
            instances: HashMap::new(),
        }
    }

    /// Make `path` loadable as a sound of the given length.
    pub fn register_sound(&mut self, path: impl Into<PathBuf>, length_seconds: f64) {
        self.sound_library
            .insert(path.into(), length_seconds.max(0.0));
    }

    /// Make `path` loadable as a bank containing `events`.
    pub fn register_bank(&mut self, path: impl Into<PathBuf>, events: Vec<SimulatedEventSpec>) {
        self.bank_library.insert(path.into(), events);
    }

    /// Run as many updates as cover `seconds` of mixer time.
    pub fn advance_seconds(&mut self, seconds: f64) -> EngineResult<()> {
        let samples = (seconds.max(0.0) * self.sample_rate as f64).round() as u64;
        let updates = samples.div_ceil(self.samples_per_update);
        for _ in 0..updates {
            self.update()?;
        }
        Ok(())
    }

    /// Current global sample clock.
    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// Mixer rate, readable without an initialised engine.
    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples_per_update(&self) -> u64 {
        self.samples_per_update
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Free a channel as if the engine reclaimed it for another voice.
    pub fn steal_channel(&mut self, channel: ChannelHandle) {
        self.channels.remove(&channel.0);
    }

    /// Keep started events in `Starting` forever while set.
    pub fn stall_event_starts(&mut self, stall: bool) {
        self.stall_event_starts = stall;
    }

    /// Report every channel group as not yet playing while set. Started
    /// events still run and keep their groups.
    pub fn stall_group_playback(&mut self, stall: bool) {
        self.stall_group_playback = stall;
    }

    /// Fail the next engine call with `code`.
    pub fn inject_failure(&mut self, code: i32) {
        self.injected_failure.set(Some(code));
    }

    /// Audible gain of a control: volume times the current fade level.
    pub fn effective_gain(&self, control: Control) -> Option<f32> {
        self.control(control)
            .ok()
            .map(|c| c.volume * fade_level_at(&c.fade_points, self.clock))
    }

    /// Pending `(start, end, stop)` delay of a control.
    pub fn pending_delay(&self, control: Control) -> Option<(u64, u64, bool)> {
        self.control(control).ok().and_then(|c| c.delay)
    }

    pub fn volume_ramp(&self, control: Control) -> Option<bool> {
        self.control(control).ok().map(|c| c.ramp)
    }

    pub fn is_dsp_locked(&self) -> bool {
        self.dsp_lock_depth > 0
    }

    /// Fade points or delays written while the mixer was not locked.
    pub fn unlocked_schedule_writes(&self) -> u64 {
        self.unlocked_schedule_writes
    }

    pub fn parameter(&self, event: EventHandle, name: &str) -> Option<f32> {
        self.instances
            .get(&event.0)
            .and_then(|instance| instance.params.get(name).copied())
    }

    pub fn event_volume(&self, event: EventHandle) -> Option<f32> {
        self.instances.get(&event.0).map(|instance| instance.volume)
    }

    pub fn is_event_released(&self, event: EventHandle) -> Option<bool> {
        self.instances.get(&event.0).map(|instance| instance.released)
    }

    /// Channels and channel groups currently holding a voice.
    pub fn active_voices(&self) -> usize {
        self.channels.len() + self.groups.len()
    }

    fn check(&self) -> EngineResult<()> {
        if let Some(code) = self.injected_failure.take() {
            return Err(EngineError::Failure(code));
        }
        if !self.initialized {
            return Err(EngineError::Failure(UNINITIALIZED_CODE));
        }
        Ok(())
    }

    fn allocate_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn seconds_to_samples(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate as f64).round() as u64
    }

    fn samples_to_ms(&self, samples: u64) -> i64 {
        (samples as f64 * 1000.0 / self.sample_rate as f64).round() as i64
    }

    fn control(&self, control: Control) -> EngineResult<&SimControl> {
        match control {
            Control::Channel(ChannelHandle(id)) => self.channels.get(&id),
            Control::Group(GroupHandle(id)) => self.groups.get(&id),
        }
        .ok_or(EngineError::InvalidHandle)
    }

    fn control_mut(&mut self, control: Control) -> EngineResult<&mut SimControl> {
        match control {
            Control::Channel(ChannelHandle(id)) => self.channels.get_mut(&id),
            Control::Group(GroupHandle(id)) => self.groups.get_mut(&id),
        }
        .ok_or(EngineError::InvalidHandle)
    }

    fn instance(&self, event: EventHandle) -> EngineResult<&SimInstance> {
        self.instances.get(&event.0).ok_or(EngineError::InvalidHandle)
    }

    fn instance_mut(&mut self, event: EventHandle) -> EngineResult<&mut SimInstance> {
        self.instances
            .get_mut(&event.0)
            .ok_or(EngineError::InvalidHandle)
    }

    fn note_schedule_write(&mut self) {
        if self.dsp_lock_depth == 0 {
            self.unlocked_schedule_writes += 1;
        }
    }

    fn steal_oldest_channel_if_full(&mut self) {
        if self.active_voices() < self.max_voices {
            return;
        }
        if let Some(oldest) = self.channels.keys().next().copied() {
            log::debug!("simulated engine stealing channel {}", oldest);
            self.channels.remove(&oldest);
        }
    }

    fn advance_instances(&mut self) {
        let clock = self.clock;
        let mut destroyed = Vec::new();

        let ids: Vec<u64> = self.instances.keys().copied().collect();
        for id in ids {
            let Some(instance) = self.instances.get(&id).cloned() else {
                continue;
            };
            let next_state = match instance.state {
                EventState::Starting if self.stall_event_starts => None,
                EventState::Starting if instance.starting_updates_left > 1 => {
                    if let Some(live) = self.instances.get_mut(&id) {
                        live.starting_updates_left -= 1;
                    }
                    None
                }
                EventState::Starting => {
                    let length = self
                        .descriptions
                        .get(&instance.description)
                        .and_then(|spec| spec.length_seconds)
                        .map(|seconds| self.seconds_to_samples(seconds));
                    let group = self.allocate_handle();
                    self.groups
                        .insert(group, SimControl::started_at(clock, length));
                    if let Some(live) = self.instances.get_mut(&id) {
                        live.group = Some(group);
                        live.timeline_origin = clock;
                    }
                    Some(EventState::Playing)
                }
                EventState::Playing | EventState::Sustaining => {
                    let group_playing = instance
                        .group
                        .and_then(|group| self.groups.get(&group))
                        .map(|group| group.playing)
                        .unwrap_or(false);
                    (!group_playing).then_some(EventState::Stopped)
                }
                EventState::Stopping => Some(EventState::Stopped),
                EventState::Stopped => {
                    if instance.released {
                        destroyed.push(id);
                    }
                    None
                }
            };

            if let Some(state) = next_state {
                if let Some(live) = self.instances.get_mut(&id) {
                    live.state = state;
                }
            }
        }

        for id in destroyed {
            if let Some(instance) = self.instances.remove(&id) {
                if let Some(group) = instance.group {
                    self.groups.remove(&group);
                }
            }
        }
    }

    fn timeline_ms(&self, instance: &SimInstance) -> i64 {
        match instance.state {
            EventState::Playing | EventState::Sustaining | EventState::Stopping => {
                let elapsed = self.clock.saturating_sub(instance.timeline_origin);
                self.samples_to_ms(elapsed) + instance.timeline_offset_ms
            }
            _ => instance.timeline_offset_ms,
        }
    }
}

impl PlaybackEngine for SimulatedEngine {
    fn initialize(&mut self, max_voices: usize, version: u32) -> EngineResult<()> {
        if let Some(code) = self.injected_failure.take() {
            return Err(EngineError::Failure(code));
        }
        if version < MIN_ENGINE_VERSION {
            return Err(EngineError::Failure(HEADER_MISMATCH_CODE));
        }
        self.max_voices = max_voices;
        self.initialized = true;
        Ok(())
    }

    fn release(&mut self) -> EngineResult<()> {
        self.check()?;
        self.channels.clear();
        self.groups.clear();
        self.instances.clear();
        self.sounds.clear();
        self.loaded_banks.clear();
        self.descriptions.clear();
        self.description_by_name.clear();
        self.initialized = false;
        Ok(())
    }

    fn update(&mut self) -> EngineResult<()> {
        self.check()?;
        self.clock += self.samples_per_update;

        // Voices that stopped during the previous interval are freed now.
        self.channels.retain(|_, channel| channel.playing);

        let clock = self.clock;
        for channel in self.channels.values_mut() {
            channel.advance(clock);
        }
        for group in self.groups.values_mut() {
            group.advance(clock);
        }

        self.advance_instances();
        Ok(())
    }

    fn sample_rate(&self) -> EngineResult<u32> {
        self.check()?;
        Ok(self.sample_rate)
    }

    fn lock_dsp(&mut self) -> EngineResult<()> {
        self.check()?;
        self.dsp_lock_depth += 1;
        Ok(())
    }

    fn unlock_dsp(&mut self) -> EngineResult<()> {
        self.check()?;
        self.dsp_lock_depth = self.dsp_lock_depth.saturating_sub(1);
        Ok(())
    }

    fn create_sound(&mut self, path: &Path, mode: SoundMode) -> EngineResult<SoundHandle> {
        self.check()?;
        let seconds = *self
            .sound_library
            .get(path)
            .ok_or(EngineError::Failure(FILE_NOT_FOUND_CODE))?;
        let length = if mode.contains(SoundMode::LOOP_NORMAL) {
            None
        } else {
            Some(self.seconds_to_samples(seconds))
        };
        let handle = self.allocate_handle();
        self.sounds.insert(handle, length);
        Ok(SoundHandle(handle))
    }

    fn play_sound(&mut self, sound: SoundHandle) -> EngineResult<ChannelHandle> {
        self.check()?;
        let length = *self.sounds.get(&sound.0).ok_or(EngineError::InvalidHandle)?;
        self.steal_oldest_channel_if_full();
        let handle = self.allocate_handle();
        self.channels
            .insert(handle, SimControl::started_at(self.clock, length));
        Ok(ChannelHandle(handle))
    }

    fn is_playing(&self, control: Control) -> EngineResult<bool> {
        self.check()?;
        let playing = self.control(control)?.playing;
        let held = self.stall_group_playback && matches!(control, Control::Group(_));
        Ok(playing && !held)
    }

    fn stop(&mut self, control: Control) -> EngineResult<()> {
        self.check()?;
        self.control_mut(control)?.playing = false;
        Ok(())
    }

    fn volume(&self, control: Control) -> EngineResult<f32> {
        self.check()?;
        Ok(self.control(control)?.volume)
    }

    fn set_volume(&mut self, control: Control, volume: f32) -> EngineResult<()> {
        self.check()?;
        self.control_mut(control)?.volume = volume;
        Ok(())
    }

    fn set_volume_ramp(&mut self, control: Control, ramp: bool) -> EngineResult<()> {
        self.check()?;
        self.control_mut(control)?.ramp = ramp;
        Ok(())
    }

    fn dsp_clock(&self, control: Control) -> EngineResult<u64> {
        self.check()?;
        self.control(control)?;
        Ok(self.clock)
    }

    fn fade_points(&self, control: Control) -> EngineResult<Vec<FadePoint>> {
        self.check()?;
        Ok(self.control(control)?.fade_points.clone())
    }

    fn add_fade_point(&mut self, control: Control, point: FadePoint) -> EngineResult<()> {
        self.check()?;
        let points = &mut self.control_mut(control)?.fade_points;
        let index = points.partition_point(|existing| existing.clock <= point.clock);
        points.insert(index, point);
        self.note_schedule_write();
        Ok(())
    }

    fn remove_fade_points(&mut self, control: Control, start: u64, end: u64) -> EngineResult<()> {
        self.check()?;
        self.control_mut(control)?
            .fade_points
            .retain(|point| point.clock < start || point.clock > end);
        self.note_schedule_write();
        Ok(())
    }

    fn set_delay(
        &mut self,
        control: Control,
        start: u64,
        end: u64,
        stop: bool,
    ) -> EngineResult<()> {
        self.check()?;
        let target = self.control_mut(control)?;
        target.delay = if start == 0 && end == 0 && !stop {
            None
        } else {
            Some((start, end, stop))
        };
        self.note_schedule_write();
        Ok(())
    }

    fn load_bank(&mut self, path: &Path) -> EngineResult<()> {
        self.check()?;
        let events = self
            .bank_library
            .get(path)
            .cloned()
            .ok_or(EngineError::Failure(FILE_NOT_FOUND_CODE))?;
        if self.loaded_banks.iter().any(|loaded| loaded == path) {
            return Ok(());
        }
        for spec in events {
            let handle = self.allocate_handle();
            self.description_by_name.insert(spec.name.clone(), handle);
            self.descriptions.insert(handle, spec);
        }
        self.loaded_banks.push(path.to_path_buf());
        Ok(())
    }

    fn event_description(&mut self, name: &str) -> EngineResult<EventDescription> {
        self.check()?;
        self.description_by_name
            .get(name)
            .copied()
            .map(EventDescription)
            .ok_or(EngineError::Failure(EVENT_NOT_FOUND_CODE))
    }

    fn create_instance(&mut self, description: EventDescription) -> EngineResult<EventHandle> {
        self.check()?;
        if !self.descriptions.contains_key(&description.0) {
            return Err(EngineError::InvalidHandle);
        }
        let handle = self.allocate_handle();
        self.instances.insert(
            handle,
            SimInstance {
                description: description.0,
                state: EventState::Stopped,
                volume: 1.0,
                params: HashMap::new(),
                released: false,
                group: None,
                starting_updates_left: 0,
                timeline_origin: 0,
                timeline_offset_ms: 0,
            },
        );
        Ok(EventHandle(handle))
    }

    fn set_parameter(&mut self, event: EventHandle, name: &str, value: f32) -> EngineResult<()> {
        self.check()?;
        self.instance_mut(event)?
            .params
            .insert(name.to_string(), value);
        Ok(())
    }

    fn set_event_volume(&mut self, event: EventHandle, volume: f32) -> EngineResult<()> {
        self.check()?;
        self.instance_mut(event)?.volume = volume;
        Ok(())
    }

    fn start_event(&mut self, event: EventHandle) -> EngineResult<()> {
        self.check()?;
        let latency = {
            let instance = self.instance(event)?;
            self.descriptions
                .get(&instance.description)
                .map(|spec| spec.start_latency_updates)
                .unwrap_or(DEFAULT_START_LATENCY_UPDATES)
        };
        let previous_group = {
            let instance = self.instance_mut(event)?;
            instance.state = EventState::Starting;
            instance.starting_updates_left = latency;
            instance.timeline_offset_ms = 0;
            instance.group.take()
        };
        if let Some(group) = previous_group {
            self.groups.remove(&group);
        }
        Ok(())
    }

    fn release_event(&mut self, event: EventHandle) -> EngineResult<()> {
        self.check()?;
        self.instance_mut(event)?.released = true;
        Ok(())
    }

    fn stop_event(&mut self, event: EventHandle, mode: StopMode) -> EngineResult<()> {
        self.check()?;
        let group = {
            let instance = self.instance_mut(event)?;
            instance.state = match (instance.state, mode) {
                (EventState::Stopped, _) => EventState::Stopped,
                (EventState::Starting, _) | (_, StopMode::Immediate) => EventState::Stopped,
                (_, StopMode::AllowFadeOut) => EventState::Stopping,
            };
            instance.group
        };
        if let Some(group) = group.and_then(|group| self.groups.get_mut(&group)) {
            group.playing = false;
        }
        Ok(())
    }

    fn event_state(&self, event: EventHandle) -> EngineResult<EventState> {
        self.check()?;
        Ok(self.instance(event)?.state)
    }

    fn event_channel_group(&self, event: EventHandle) -> EngineResult<GroupHandle> {
        self.check()?;
        self.instance(event)?
            .group
            .map(GroupHandle)
            .ok_or(EngineError::Failure(NOT_READY_CODE))
    }

    fn timeline_position(&self, event: EventHandle) -> EngineResult<i32> {
        self.check()?;
        let position = self.timeline_ms(self.instance(event)?);
        Ok(position.clamp(0, i32::MAX as i64) as i32)
    }

    fn set_timeline_position(&mut self, event: EventHandle, position_ms: i32) -> EngineResult<()> {
        self.check()?;
        let instance = self.instance(event)?.clone();
        let current = self.timeline_ms(&instance);
        let offset = instance.timeline_offset_ms + (position_ms as i64 - current);

        let remaining = self
            .descriptions
            .get(&instance.description)
            .and_then(|spec| spec.length_seconds)
            .map(|seconds| (seconds * 1000.0).round() as i64 - position_ms as i64);
        if let (Some(group), Some(remaining_ms)) = (instance.group, remaining) {
            let remaining_samples =
                self.seconds_to_samples(remaining_ms.max(0) as f64 / 1000.0);
            let end = self.clock + remaining_samples;
            if let Some(group) = self.groups.get_mut(&group) {
                group.end_clock = Some(end);
            }
        }

        self.instance_mut(event)?.timeline_offset_ms = offset;
        Ok(())
    }
}
