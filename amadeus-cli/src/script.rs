//! Script files: registry config, simulated assets and host calls.

use std::fmt::{Display, Formatter};
use std::fs;
use std::path::Path;

use amadeus_lib::engine::simulated::{
    DEFAULT_SAMPLES_PER_UPDATE, DEFAULT_SAMPLE_RATE, MIN_ENGINE_VERSION,
};
use amadeus_lib::{
    Amadeus, AmadeusConfig, ReconcileReport, SimulatedEngine, SimulatedEventSpec, SoundMode,
};
use serde::{Deserialize, Serialize};

use crate::error::CliError;

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

fn default_samples_per_update() -> u64 {
    DEFAULT_SAMPLES_PER_UPDATE
}

fn unity() -> f32 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    pub config: AmadeusConfig,
    #[serde(default)]
    pub engine: EngineSettings,
    /// Overrides the start sequence timeout (ms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timeout_ms: Option<f32>,
    pub steps: Vec<Step>,
}

impl Script {
    pub fn from_path(path: &Path) -> Result<Self, CliError> {
        let json = fs::read_to_string(path).map_err(|source| CliError::ReadScript {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Build the simulated engine and initialise a registry over it.
    pub fn open(&self) -> Result<Amadeus<SimulatedEngine>, CliError> {
        let mut amadeus = Amadeus::init(self.engine.build(), self.config)?;
        if let Some(timeout_ms) = self.start_timeout_ms {
            amadeus.set_start_timeout_ms(timeout_ms);
        }
        Ok(amadeus)
    }
}

/// Timing and asset library of the simulated engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSettings {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_samples_per_update")]
    pub samples_per_update: u64,
    #[serde(default)]
    pub sounds: Vec<SoundAsset>,
    #[serde(default)]
    pub banks: Vec<BankAsset>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            samples_per_update: DEFAULT_SAMPLES_PER_UPDATE,
            sounds: Vec::new(),
            banks: Vec::new(),
        }
    }
}

impl EngineSettings {
    pub fn build(&self) -> SimulatedEngine {
        let mut engine = SimulatedEngine::with_timing(self.sample_rate, self.samples_per_update);
        for sound in &self.sounds {
            engine.register_sound(&sound.path, sound.length_seconds);
        }
        for bank in &self.banks {
            engine.register_bank(&bank.path, bank.events.clone());
        }
        engine
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SoundAsset {
    pub path: String,
    pub length_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BankAsset {
    pub path: String,
    pub events: Vec<SimulatedEventSpec>,
}

/// One host call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    PlaySound {
        path: String,
        slot: usize,
        /// Raw engine mode bits.
        #[serde(default)]
        mode: u32,
        #[serde(default = "unity")]
        volume: f32,
        #[serde(default)]
        fade: f32,
    },
    StopSound {
        slot: usize,
        #[serde(default)]
        fade: f32,
    },
    SetSoundVolume {
        slot: usize,
        volume: f32,
        #[serde(default)]
        fade: f32,
    },
    IsSoundPlaying {
        slot: usize,
    },
    LoadBank {
        path: String,
    },
    LoadEvent {
        name: String,
        slot: usize,
    },
    IsEventLoaded {
        slot: usize,
    },
    SetEventParam {
        slot: usize,
        name: String,
        value: f32,
    },
    StartEvent {
        slot: usize,
        #[serde(default = "unity")]
        volume: f32,
        #[serde(default)]
        fade: f32,
    },
    StopEvent {
        slot: usize,
        #[serde(default)]
        fade: f32,
    },
    SetEventVolume {
        slot: usize,
        volume: f32,
        #[serde(default)]
        fade: f32,
    },
    EnsureEventTimeElapsed {
        slot: usize,
        seconds: f32,
    },
    Tick,
    /// Tick repeatedly until `seconds` of engine time have passed.
    Advance {
        seconds: f64,
    },
}

/// What a step returned.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Done,
    Flag(bool),
    Ticked { ticks: u64, report: ReconcileReport },
}

impl Display for Outcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Done => write!(f, "ok"),
            Self::Flag(value) => write!(f, "{}", value),
            Self::Ticked { ticks, report } if report.is_empty() => {
                write!(f, "ok ({} ticks)", ticks)
            }
            Self::Ticked { ticks, report } => write!(
                f,
                "ok ({} ticks) reclaimed channels {:?} events {:?}",
                ticks, report.reclaimed_channels, report.reclaimed_events
            ),
        }
    }
}

impl Step {
    /// Short label for step listings.
    pub fn label(&self) -> String {
        match self {
            Self::PlaySound { path, slot, .. } => format!("play_sound {} -> {}", path, slot),
            Self::StopSound { slot, .. } => format!("stop_sound {}", slot),
            Self::SetSoundVolume { slot, volume, .. } => {
                format!("set_sound_volume {} {:.2}", slot, volume)
            }
            Self::IsSoundPlaying { slot } => format!("is_sound_playing {}", slot),
            Self::LoadBank { path } => format!("load_bank {}", path),
            Self::LoadEvent { name, slot } => format!("load_event {} -> {}", name, slot),
            Self::IsEventLoaded { slot } => format!("is_event_loaded {}", slot),
            Self::SetEventParam { slot, name, value } => {
                format!("set_event_param {} {}={:.2}", slot, name, value)
            }
            Self::StartEvent { slot, .. } => format!("start_event {}", slot),
            Self::StopEvent { slot, .. } => format!("stop_event {}", slot),
            Self::SetEventVolume { slot, volume, .. } => {
                format!("set_event_volume {} {:.2}", slot, volume)
            }
            Self::EnsureEventTimeElapsed { slot, seconds } => {
                format!("ensure_event_time_elapsed {} {:.2}s", slot, seconds)
            }
            Self::Tick => "tick".to_string(),
            Self::Advance { seconds } => format!("advance {:.2}s", seconds),
        }
    }

    pub fn apply(&self, amadeus: &mut Amadeus<SimulatedEngine>) -> amadeus_lib::Result<Outcome> {
        match self {
            Self::PlaySound {
                path,
                slot,
                mode,
                volume,
                fade,
            } => amadeus.play_sound(path, *slot, SoundMode(*mode), *volume, *fade)?,
            Self::StopSound { slot, fade } => amadeus.stop_sound(*slot, *fade)?,
            Self::SetSoundVolume { slot, volume, fade } => {
                amadeus.set_sound_volume(*slot, *volume, *fade)?
            }
            Self::IsSoundPlaying { slot } => {
                return Ok(Outcome::Flag(amadeus.is_sound_playing(*slot)?))
            }
            Self::LoadBank { path } => amadeus.load_bank(path)?,
            Self::LoadEvent { name, slot } => amadeus.load_event(name, *slot)?,
            Self::IsEventLoaded { slot } => {
                return Ok(Outcome::Flag(amadeus.is_event_loaded(*slot)?))
            }
            Self::SetEventParam { slot, name, value } => {
                amadeus.set_event_param(*slot, name, *value)?
            }
            Self::StartEvent { slot, volume, fade } => {
                amadeus.start_event(*slot, *volume, *fade)?
            }
            Self::StopEvent { slot, fade } => amadeus.stop_event(*slot, *fade)?,
            Self::SetEventVolume { slot, volume, fade } => {
                amadeus.set_event_volume(*slot, *volume, *fade)?
            }
            Self::EnsureEventTimeElapsed { slot, seconds } => {
                amadeus.ensure_event_time_elapsed(*slot, *seconds)?
            }
            Self::Tick => {
                return Ok(Outcome::Ticked {
                    ticks: 1,
                    report: amadeus.tick()?,
                })
            }
            Self::Advance { seconds } => return advance(amadeus, *seconds),
        }
        Ok(Outcome::Done)
    }
}

fn advance(amadeus: &mut Amadeus<SimulatedEngine>, seconds: f64) -> amadeus_lib::Result<Outcome> {
    let target = amadeus.engine().clock()
        + (seconds.max(0.0) * amadeus.engine().sample_rate_hz() as f64).round() as u64;

    let mut ticks = 0;
    let mut report = ReconcileReport::default();
    while amadeus.engine().clock() < target {
        let tick = amadeus.tick()?;
        report.reclaimed_channels.extend(tick.reclaimed_channels);
        report.reclaimed_events.extend(tick.reclaimed_events);
        ticks += 1;
    }

    Ok(Outcome::Ticked { ticks, report })
}

/// Example script covering every step kind.
pub fn example() -> Script {
    Script {
        config: AmadeusConfig::new(8, 4, MIN_ENGINE_VERSION),
        engine: EngineSettings {
            sounds: vec![
                SoundAsset {
                    path: "sfx/door.wav".to_string(),
                    length_seconds: 1.2,
                },
                SoundAsset {
                    path: "music/theme.ogg".to_string(),
                    length_seconds: 95.0,
                },
            ],
            banks: vec![BankAsset {
                path: "banks/Master.bank".to_string(),
                events: vec![
                    SimulatedEventSpec::looping("event:/ambience/forest"),
                    SimulatedEventSpec::new("event:/ui/confirm", 0.4),
                ],
            }],
            ..EngineSettings::default()
        },
        start_timeout_ms: None,
        steps: vec![
            Step::PlaySound {
                path: "sfx/door.wav".to_string(),
                slot: 0,
                mode: SoundMode::DEFAULT.bits(),
                volume: 1.0,
                fade: 0.0,
            },
            Step::PlaySound {
                path: "music/theme.ogg".to_string(),
                slot: 1,
                mode: (SoundMode::LOOP_NORMAL | SoundMode::CREATE_STREAM).bits(),
                volume: 0.8,
                fade: 2.0,
            },
            Step::IsSoundPlaying { slot: 0 },
            Step::LoadBank {
                path: "banks/Master.bank".to_string(),
            },
            Step::LoadEvent {
                name: "event:/ambience/forest".to_string(),
                slot: 0,
            },
            Step::SetEventParam {
                slot: 0,
                name: "wind".to_string(),
                value: 0.6,
            },
            Step::StartEvent {
                slot: 0,
                volume: 0.8,
                fade: 2.0,
            },
            Step::SetEventVolume {
                slot: 0,
                volume: 0.3,
                fade: 0.0,
            },
            Step::EnsureEventTimeElapsed {
                slot: 0,
                seconds: 12.5,
            },
            Step::SetSoundVolume {
                slot: 1,
                volume: 0.5,
                fade: 1.0,
            },
            Step::Advance { seconds: 1.5 },
            Step::IsSoundPlaying { slot: 0 },
            Step::StopSound { slot: 1, fade: 1.0 },
            Step::StopEvent { slot: 0, fade: 0.5 },
            Step::IsEventLoaded { slot: 0 },
            Step::Advance { seconds: 1.0 },
            Step::Tick,
        ],
    }
}
