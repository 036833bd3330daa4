//! Voice pipeline configuration
//!
//! Settings are stored as JSON at `~/.config/talkback/config.json`. Every field
//! has a default, so a partial (or missing) file is fine.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tunables for capture, voice activity detection, exchange and playback
///
/// The silence thresholds were picked empirically and depend on the room and
/// microphone, so they are defaults rather than constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Normalized loudness above which a sample counts as speech
    pub silence_threshold: f32,
    /// Silence needed before a stop is scheduled
    pub required_silence_ms: u64,
    /// Delay between scheduling a silence stop and acting on it
    pub debounce_ms: u64,
    /// Recordings shorter than this are never sent
    pub min_recording_ms: u64,
    /// Hard ceiling on a single recording
    pub max_recording_ms: u64,
    /// Period of the loudness sampling loop
    pub sample_interval_ms: u64,
    /// Period of the recording boundary timer
    pub boundary_interval_ms: u64,
    /// Recorder timeslice
    pub chunk_interval_ms: u64,
    /// Period of the playback completion check
    pub playback_poll_ms: u64,
    /// Encoded recordings below this size are rejected
    pub min_blob_bytes: usize,
    /// Multiplier applied to RMS energy before clamping to 1.0
    pub level_gain: f32,
    /// Caller-defined timeout for the exchange call
    pub exchange_timeout_ms: u64,
    /// Exchange service URL
    pub endpoint: String,
    /// Language code sent with each utterance
    pub language: String,
    /// Voice profile used for the spoken reply
    pub voice_profile: String,
    /// Play replies silently
    pub muted: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            silence_threshold: 0.02,
            required_silence_ms: 2000,
            debounce_ms: 500,
            min_recording_ms: 1000,
            max_recording_ms: 30_000,
            sample_interval_ms: 16,
            boundary_interval_ms: 100,
            chunk_interval_ms: 100,
            playback_poll_ms: 50,
            min_blob_bytes: 1024,
            level_gain: 1.0,
            exchange_timeout_ms: 30_000,
            endpoint: "http://127.0.0.1:8080/api/voice-chat".to_string(),
            language: "en".to_string(),
            voice_profile: "default".to_string(),
            muted: false,
        }
    }
}

impl VoiceConfig {
    /// Default location of the config file
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("talkback")
            .join("config.json")
    }

    /// Load configuration from a file, falling back to defaults if it doesn't exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents =
            fs::read_to_string(path).map_err(|e| format!("Failed to read config: {}", e))?;

        let config: VoiceConfig = serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse config {:?}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), String> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        fs::write(path, contents).map_err(|e| format!("Failed to write config: {}", e))
    }

    /// Reject combinations the pipeline cannot run with
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.silence_threshold) {
            return Err(format!(
                "silence_threshold must be within [0, 1], got {}",
                self.silence_threshold
            ));
        }
        if self.min_recording_ms > self.max_recording_ms {
            return Err(format!(
                "min_recording_ms ({}) exceeds max_recording_ms ({})",
                self.min_recording_ms, self.max_recording_ms
            ));
        }
        let periods = [
            ("sample_interval_ms", self.sample_interval_ms),
            ("boundary_interval_ms", self.boundary_interval_ms),
            ("chunk_interval_ms", self.chunk_interval_ms),
            ("playback_poll_ms", self.playback_poll_ms),
            ("exchange_timeout_ms", self.exchange_timeout_ms),
        ];
        for (name, value) in periods {
            if value == 0 {
                return Err(format!("{} must be greater than zero", name));
            }
        }
        if !(self.level_gain.is_finite() && self.level_gain > 0.0) {
            return Err(format!("level_gain must be positive, got {}", self.level_gain));
        }
        Ok(())
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn boundary_interval(&self) -> Duration {
        Duration::from_millis(self.boundary_interval_ms)
    }

    pub fn chunk_interval(&self) -> Duration {
        Duration::from_millis(self.chunk_interval_ms)
    }

    pub fn playback_poll(&self) -> Duration {
        Duration::from_millis(self.playback_poll_ms)
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_millis(self.exchange_timeout_ms)
    }
}
