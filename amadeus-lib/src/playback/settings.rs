use std::time::Duration;

use crate::engine::PlaybackEngine;

use super::Amadeus;

const DEFAULT_START_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_START_POLL_INTERVAL_MS: u64 = 1;

/// Budget for the blocking waits of the event start sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartWaitSettings {
    /// Total time allowed across both waits.
    pub timeout: Duration,
    /// Sleep between engine polls.
    pub poll_interval: Duration,
}

impl Default for StartWaitSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_START_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_START_POLL_INTERVAL_MS),
        }
    }
}

fn ms_to_duration(ms: f32) -> Duration {
    if ms.is_finite() && ms > 0.0 {
        Duration::from_secs_f64(ms as f64 / 1000.0)
    } else {
        Duration::ZERO
    }
}

impl<E: PlaybackEngine> Amadeus<E> {
    /// Configure how long `start_event` may wait for the engine (ms).
    pub fn set_start_timeout_ms(&mut self, ms: f32) {
        self.start_wait.timeout = ms_to_duration(ms);
    }

    /// Configure the sleep between start-sequence polls (ms).
    pub fn set_start_poll_interval_ms(&mut self, ms: f32) {
        self.start_wait.poll_interval = ms_to_duration(ms);
    }

    pub fn start_wait_settings(&self) -> StartWaitSettings {
        self.start_wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_durations_clamp_to_zero() {
        assert_eq!(ms_to_duration(-5.0), Duration::ZERO);
        assert_eq!(ms_to_duration(f32::NAN), Duration::ZERO);
        assert_eq!(ms_to_duration(250.0), Duration::from_millis(250));
    }
}
