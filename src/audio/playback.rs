//! Reply playback
//!
//! Plays one synthesized reply at a time. Starting a new clip always stops
//! and releases the previous handle first, so two outputs never overlap.

use base64::Engine as _;
use log::{debug, warn};
use std::time::{Duration, Instant};

use super::recorder::{decode_wav, duration_seconds};
use crate::error::VoiceError;

/// Decoded reply audio ready for an output device
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(duration_seconds(self.samples.len(), self.sample_rate))
    }
}

/// Progress of the current clip
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackStatus {
    Playing,
    Finished,
    Failed(String),
}

/// One playing clip
pub trait PlaybackHandle {
    fn status(&mut self) -> PlaybackStatus;

    /// Stop immediately and release the output. Must be safe to call twice.
    fn stop(&mut self);
}

/// An audio output device
pub trait AudioOutput {
    /// Start playing a clip at the given volume (0.0 mutes)
    fn start(
        &mut self,
        audio: DecodedAudio,
        volume: f32,
    ) -> Result<Box<dyn PlaybackHandle>, VoiceError>;
}

/// Decode a base64 WAV payload
pub fn decode_payload(payload: &str) -> Result<DecodedAudio, VoiceError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| VoiceError::Playback(format!("invalid base64 audio: {}", e)))?;
    let (samples, sample_rate) = decode_wav(&bytes).map_err(VoiceError::Playback)?;
    if sample_rate == 0 {
        return Err(VoiceError::Playback("audio has a zero sample rate".to_string()));
    }
    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// Owns the single live playback handle
pub struct PlaybackController {
    output: Box<dyn AudioOutput>,
    current: Option<Box<dyn PlaybackHandle>>,
    muted: bool,
}

impl PlaybackController {
    pub fn new(output: Box<dyn AudioOutput>, muted: bool) -> Self {
        Self {
            output,
            current: None,
            muted,
        }
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Check if a handle is held
    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// Decode and play a reply payload, superseding any current clip
    ///
    /// Muted playback runs the same completion contract at zero volume.
    pub fn play(&mut self, payload: &str) -> Result<(), VoiceError> {
        self.stop();
        let audio = decode_payload(payload)?;
        debug!(
            "Playing reply: {} samples at {}Hz ({:.2}s){}",
            audio.samples.len(),
            audio.sample_rate,
            audio.duration().as_secs_f64(),
            if self.muted { ", muted" } else { "" }
        );
        let volume = if self.muted { 0.0 } else { 1.0 };
        let handle = self.output.start(audio, volume)?;
        self.current = Some(handle);
        Ok(())
    }

    /// Report on the current clip, releasing it once it has ended
    ///
    /// Returns `None` when nothing is playing.
    pub fn poll(&mut self) -> Option<PlaybackStatus> {
        let status = self.current.as_mut()?.status();
        match &status {
            PlaybackStatus::Playing => {}
            PlaybackStatus::Finished => self.release(),
            PlaybackStatus::Failed(e) => {
                warn!("Playback failed: {}", e);
                self.release();
            }
        }
        Some(status)
    }

    /// Stop the current clip, if any. Never fails.
    pub fn stop(&mut self) {
        if self.current.is_some() {
            debug!("Stopping playback");
            self.release();
        }
    }

    fn release(&mut self) {
        if let Some(mut handle) = self.current.take() {
            handle.stop();
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Output that honours each clip's duration without producing sound
///
/// Used when no audio device is available.
#[derive(Debug, Default)]
pub struct SilentOutput;

struct SilentHandle {
    ends_at: Instant,
    stopped: bool,
}

impl AudioOutput for SilentOutput {
    fn start(
        &mut self,
        audio: DecodedAudio,
        _volume: f32,
    ) -> Result<Box<dyn PlaybackHandle>, VoiceError> {
        Ok(Box::new(SilentHandle {
            ends_at: Instant::now() + audio.duration(),
            stopped: false,
        }))
    }
}

impl PlaybackHandle for SilentHandle {
    fn status(&mut self) -> PlaybackStatus {
        if self.stopped || Instant::now() >= self.ends_at {
            PlaybackStatus::Finished
        } else {
            PlaybackStatus::Playing
        }
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{wav_payload, FakeOutput};

    #[test]
    fn test_second_play_stops_first() {
        let output = FakeOutput::new();
        let mut playback = PlaybackController::new(Box::new(output.clone()), false);

        playback.play(&wav_payload(1600)).unwrap();
        playback.play(&wav_payload(1600)).unwrap();

        assert_eq!(output.started(), 2);
        assert_eq!(output.live_handles(), 1);
        assert_eq!(output.max_live_handles(), 1);
        assert!(output.handle_stopped(0));
        assert!(!output.handle_stopped(1));
    }

    #[test]
    fn test_muted_play_still_completes() {
        let output = FakeOutput::new();
        let mut playback = PlaybackController::new(Box::new(output.clone()), true);

        playback.play(&wav_payload(1600)).unwrap();
        assert_eq!(output.last_volume(), Some(0.0));
        assert_eq!(playback.poll(), Some(PlaybackStatus::Playing));

        output.finish_current();
        assert_eq!(playback.poll(), Some(PlaybackStatus::Finished));
        assert!(!playback.is_active());
        assert_eq!(output.live_handles(), 0);
    }

    #[test]
    fn test_invalid_payload_is_playback_error() {
        let output = FakeOutput::new();
        let mut playback = PlaybackController::new(Box::new(output.clone()), false);

        let err = playback.play("not base64 at all!").unwrap_err();
        assert!(matches!(err, VoiceError::Playback(_)));
        assert_eq!(output.started(), 0);
        assert!(!playback.is_active());
    }

    #[test]
    fn test_failed_playback_releases_handle() {
        let output = FakeOutput::new();
        let mut playback = PlaybackController::new(Box::new(output.clone()), false);

        playback.play(&wav_payload(1600)).unwrap();
        output.fail_current("device lost");
        assert_eq!(
            playback.poll(),
            Some(PlaybackStatus::Failed("device lost".to_string()))
        );
        assert_eq!(output.live_handles(), 0);
    }

    #[test]
    fn test_stop_without_playback_is_noop() {
        let output = FakeOutput::new();
        let mut playback = PlaybackController::new(Box::new(output), false);
        playback.stop();
        assert_eq!(playback.poll(), None);
    }

    #[test]
    fn test_silent_output_finishes_after_stop() {
        let mut output = SilentOutput;
        let audio = DecodedAudio {
            samples: vec![0.0; 16000 * 60],
            sample_rate: 16000,
        };
        let mut handle = output.start(audio, 1.0).unwrap();
        assert_eq!(handle.status(), PlaybackStatus::Playing);
        handle.stop();
        assert_eq!(handle.status(), PlaybackStatus::Finished);
    }
}
