use std::path::Path;

use log::{debug, warn};

use crate::engine::{PlaybackEngine, SoundMode};
use crate::error::Result;

use super::fade::{FadeDuration, StartLevel};
use super::reconcile::validate_channel;
use super::Amadeus;

impl<E: PlaybackEngine> Amadeus<E> {
    /// Load `path` and start it in channel slot `slot`.
    ///
    /// A positive `fade_seconds` ramps the new channel up from silence.
    /// An occupied slot is overwritten; the previous channel keeps playing.
    pub fn play_sound(
        &mut self,
        path: impl AsRef<Path>,
        slot: usize,
        mode: SoundMode,
        volume: f32,
        fade_seconds: f32,
    ) -> Result<()> {
        let path = path.as_ref();
        if let Some(previous) = validate_channel(&mut self.engine, &mut self.channels, slot)? {
            warn!(
                "channel slot {} still playing {:?}, replacing it with {}",
                slot,
                previous,
                path.display()
            );
        }

        let sound = self.engine.create_sound(path, mode)?;
        let channel = self.engine.play_sound(sound)?;
        self.channels.set(slot, channel)?;
        self.apply_volume(channel.into(), StartLevel::Volume(0.0), volume, fade_seconds)?;
        self.commit()
    }

    /// Stop the channel in `slot` and free the slot.
    ///
    /// With a positive `fade_seconds` the channel ramps to silence and the
    /// engine stops it at the end of the ramp; the slot is freed at once.
    pub fn stop_sound(&mut self, slot: usize, fade_seconds: f32) -> Result<()> {
        let Some(channel) = validate_channel(&mut self.engine, &mut self.channels, slot)? else {
            debug!("stop_sound: channel slot {} already empty", slot);
            return Ok(());
        };

        match FadeDuration::from_seconds(fade_seconds) {
            Some(duration) => self.fade_out_and_close(channel.into(), duration)?,
            None => self.engine.stop(channel.into())?,
        }
        self.commit()?;
        self.channels.clear(slot)?;
        Ok(())
    }

    pub fn set_sound_volume(&mut self, slot: usize, volume: f32, fade_seconds: f32) -> Result<()> {
        let Some(channel) = validate_channel(&mut self.engine, &mut self.channels, slot)? else {
            debug!("set_sound_volume: channel slot {} not playing", slot);
            return Ok(());
        };

        self.apply_volume(channel.into(), StartLevel::Current, volume, fade_seconds)?;
        self.commit()
    }

    /// Whether `slot` still holds an audible channel. A finished channel
    /// is reclaimed as a side effect.
    pub fn is_sound_playing(&mut self, slot: usize) -> Result<bool> {
        Ok(validate_channel(&mut self.engine, &mut self.channels, slot)?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, FadePoint, FILE_NOT_FOUND_CODE};
    use crate::error::AmadeusError;
    use crate::playback::slots::SlotPool;
    use crate::playback::test_support::registry;

    #[test]
    fn finished_slot_can_be_replayed_without_stop() {
        let mut amadeus = registry();
        amadeus
            .play_sound("a.wav", 3, SoundMode::DEFAULT, 1.0, 0.0)
            .expect("play");
        assert_eq!(amadeus.is_sound_playing(3), Ok(true));

        amadeus.engine_mut().advance_seconds(1.0).expect("advance");
        let report = amadeus.tick().expect("tick");
        assert_eq!(report.reclaimed_channels, vec![3]);
        assert_eq!(amadeus.is_sound_playing(3), Ok(false));

        amadeus
            .play_sound("a.wav", 3, SoundMode::DEFAULT, 1.0, 0.0)
            .expect("replay");
        assert_eq!(amadeus.is_sound_playing(3), Ok(true));
    }

    #[test]
    fn reclaimed_slot_stays_empty() {
        let mut amadeus = registry();
        amadeus
            .play_sound("a.wav", 0, SoundMode::DEFAULT, 1.0, 0.0)
            .expect("play");
        amadeus.engine_mut().advance_seconds(1.5).expect("advance");

        assert_eq!(amadeus.tick().expect("tick").reclaimed_channels, vec![0]);
        assert!(amadeus.tick().expect("tick").is_empty());
        assert_eq!(amadeus.channel(0), Ok(None));
    }

    #[test]
    fn faded_play_ramps_up_from_silence() {
        let mut amadeus = registry();
        amadeus
            .play_sound("music.ogg", 0, SoundMode::DEFAULT, 0.8, 1.0)
            .expect("play");
        let channel = amadeus.channel(0).expect("slot").expect("channel");

        assert_eq!(
            amadeus.engine().fade_points(channel.into()),
            Ok(vec![FadePoint::new(0, 0.0), FadePoint::new(1_000, 0.8)])
        );
        amadeus.engine_mut().advance_seconds(1.0).expect("advance");
        let gain = amadeus.engine().effective_gain(channel.into()).expect("gain");
        assert!((gain - 0.8).abs() < 1e-4);
    }

    #[test]
    fn instant_volume_change_disables_ramp() {
        let mut amadeus = registry();
        amadeus
            .play_sound("music.ogg", 1, SoundMode::DEFAULT, 1.0, 0.0)
            .expect("play");
        amadeus.set_sound_volume(1, 0.25, 0.0).expect("volume");

        let channel = amadeus.channel(1).expect("slot").expect("channel");
        assert_eq!(amadeus.engine().effective_gain(channel.into()), Some(0.25));
        assert_eq!(amadeus.engine().volume_ramp(channel.into()), Some(false));
    }

    #[test]
    fn faded_volume_change_starts_from_current_level() {
        let mut amadeus = registry();
        amadeus
            .play_sound("music.ogg", 1, SoundMode::DEFAULT, 1.0, 0.0)
            .expect("play");
        amadeus.set_sound_volume(1, 0.0, 1.0).expect("volume");
        amadeus.engine_mut().advance_seconds(0.5).expect("advance");

        let channel = amadeus.channel(1).expect("slot").expect("channel");
        let gain = amadeus.engine().effective_gain(channel.into()).expect("gain");
        assert!((gain - 0.4).abs() < 1e-4);
    }

    #[test]
    fn volume_change_on_empty_slot_is_ignored() {
        let mut amadeus = registry();
        assert_eq!(amadeus.set_sound_volume(5, 0.5, 1.0), Ok(()));
        assert_eq!(amadeus.channel(5), Ok(None));
    }

    #[test]
    fn instant_stop_frees_slot() {
        let mut amadeus = registry();
        amadeus
            .play_sound("music.ogg", 2, SoundMode::LOOP_NORMAL, 1.0, 0.0)
            .expect("play");
        amadeus.stop_sound(2, 0.0).expect("stop");

        assert_eq!(amadeus.channel(2), Ok(None));
        assert_eq!(amadeus.is_sound_playing(2), Ok(false));
    }

    #[test]
    fn faded_stop_frees_slot_and_stops_at_ramp_end() {
        let mut amadeus = registry();
        amadeus
            .play_sound("music.ogg", 2, SoundMode::LOOP_NORMAL, 1.0, 0.0)
            .expect("play");
        let channel = amadeus.channel(2).expect("slot").expect("channel");

        amadeus.stop_sound(2, 0.5).expect("stop");
        assert_eq!(amadeus.channel(2), Ok(None));
        assert_eq!(amadeus.engine().is_playing(channel.into()), Ok(true));

        amadeus.engine_mut().advance_seconds(0.6).expect("advance");
        assert_ne!(amadeus.engine().is_playing(channel.into()), Ok(true));
    }

    #[test]
    fn stop_on_empty_slot_is_silent() {
        let mut amadeus = registry();
        assert_eq!(amadeus.stop_sound(4, 0.0), Ok(()));
        assert_eq!(amadeus.stop_sound(4, 1.0), Ok(()));
    }

    #[test]
    fn replaying_occupied_slot_keeps_old_channel_alive() {
        let mut amadeus = registry();
        amadeus
            .play_sound("music.ogg", 6, SoundMode::DEFAULT, 1.0, 0.0)
            .expect("play");
        let first = amadeus.channel(6).expect("slot").expect("channel");
        amadeus
            .play_sound("a.wav", 6, SoundMode::DEFAULT, 1.0, 0.0)
            .expect("replay");
        let second = amadeus.channel(6).expect("slot").expect("channel");

        assert_ne!(first, second);
        assert_eq!(amadeus.engine().is_playing(first.into()), Ok(true));
    }

    #[test]
    fn stolen_channel_reads_as_finished() {
        let mut amadeus = registry();
        amadeus
            .play_sound("music.ogg", 0, SoundMode::DEFAULT, 1.0, 0.0)
            .expect("play");
        let channel = amadeus.channel(0).expect("slot").expect("channel");
        amadeus.engine_mut().steal_channel(channel);

        assert_eq!(amadeus.is_sound_playing(0), Ok(false));
        assert_eq!(amadeus.channel(0), Ok(None));
    }

    #[test]
    fn out_of_range_slot_is_rejected() {
        let mut amadeus = registry();
        assert_eq!(
            amadeus.play_sound("a.wav", 8, SoundMode::DEFAULT, 1.0, 0.0),
            Err(AmadeusError::InvalidSlotId {
                pool: SlotPool::Channel,
                id: 8,
                capacity: 8,
            })
        );
        assert!(matches!(
            amadeus.is_sound_playing(100),
            Err(AmadeusError::InvalidSlotId { id: 100, .. })
        ));
    }

    #[test]
    fn missing_file_surfaces_engine_code() {
        let mut amadeus = registry();
        let err = amadeus
            .play_sound("missing.wav", 0, SoundMode::DEFAULT, 1.0, 0.0)
            .unwrap_err();
        assert_eq!(
            err,
            AmadeusError::EngineFailure(EngineError::Failure(FILE_NOT_FOUND_CODE))
        );
        assert_eq!(amadeus.channel(0), Ok(None));
    }

    #[test]
    fn unexpected_engine_failure_keeps_slot() {
        let mut amadeus = registry();
        amadeus
            .play_sound("music.ogg", 0, SoundMode::DEFAULT, 1.0, 0.0)
            .expect("play");
        amadeus.engine_mut().inject_failure(28);

        assert_eq!(
            amadeus.is_sound_playing(0),
            Err(AmadeusError::EngineFailure(EngineError::Failure(28)))
        );
        assert_eq!(amadeus.is_sound_playing(0), Ok(true));
    }
}
