//! Energy-threshold voice activity detection
//!
//! Decides, while listening, when the speaker has been quiet long enough to
//! finish the recording. A silence stop is never acted on immediately: it is
//! scheduled behind a short debounce and cancelled if speech resumes, so a
//! single quiet sample cannot end a recording.

use log::debug;
use std::time::{Duration, Instant};

use super::timer::RecordingWindow;
use crate::config::VoiceConfig;

/// Explains why a recording ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Sustained silence after the minimum duration
    Silence {
        /// Silence measured when the stop fired, in milliseconds
        tail_ms: u64,
    },
    /// Hard ceiling reached
    MaxDuration,
    /// User stopped the recording
    Manual,
}

impl StopReason {
    /// Compact label used in logs
    pub fn label(&self) -> &'static str {
        match self {
            StopReason::Silence { .. } => "silence",
            StopReason::MaxDuration => "max_duration",
            StopReason::Manual => "manual",
        }
    }
}

/// Tracks the last moment the input was louder than the threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SilenceTracker {
    pub last_voice_activity_at: Instant,
    pub silence_threshold_level: f32,
    pub required_silence_ms: u64,
}

impl SilenceTracker {
    pub fn new(silence_threshold_level: f32, required_silence_ms: u64, now: Instant) -> Self {
        Self {
            last_voice_activity_at: now,
            silence_threshold_level,
            required_silence_ms,
        }
    }

    pub fn is_voice(&self, level: f32) -> bool {
        level > self.silence_threshold_level
    }

    pub fn mark_voice(&mut self, now: Instant) {
        self.last_voice_activity_at = now;
    }

    pub fn silence_ms(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.last_voice_activity_at)
            .as_millis() as u64
    }

    pub fn is_sustained(&self, now: Instant) -> bool {
        self.silence_ms(now) > self.required_silence_ms
    }
}

/// A scheduled silence stop that can still be cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingStop {
    deadline: Instant,
}

impl PendingStop {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

/// Voice activity detector driven by loudness samples
#[derive(Debug, Clone)]
pub struct VoiceActivityDetector {
    silence_threshold: f32,
    required_silence_ms: u64,
    debounce: Duration,
    tracker: Option<SilenceTracker>,
    pending: Option<PendingStop>,
}

impl VoiceActivityDetector {
    pub fn from_config(config: &VoiceConfig) -> Self {
        Self {
            silence_threshold: config.silence_threshold,
            required_silence_ms: config.required_silence_ms,
            debounce: Duration::from_millis(config.debounce_ms),
            tracker: None,
            pending: None,
        }
    }

    /// Begin tracking a new recording; silence is measured from `now`
    pub fn reset(&mut self, now: Instant) {
        self.tracker = Some(SilenceTracker::new(
            self.silence_threshold,
            self.required_silence_ms,
            now,
        ));
        self.pending = None;
    }

    /// Drop all tracking state, cancelling any scheduled stop
    pub fn clear(&mut self) {
        self.tracker = None;
        self.pending = None;
    }

    pub fn tracker(&self) -> Option<&SilenceTracker> {
        self.tracker.as_ref()
    }

    pub fn pending_stop(&self) -> Option<&PendingStop> {
        self.pending.as_ref()
    }

    /// Deadline of the scheduled stop, for the scheduler
    pub fn pending_deadline(&self) -> Option<Instant> {
        self.pending.map(|p| p.deadline)
    }

    /// Consume one loudness sample and return a stop reason if the recording
    /// should end now
    ///
    /// The maximum duration overrides everything else. Silence only schedules
    /// a stop once the minimum duration has been reached.
    pub fn on_sample(
        &mut self,
        level: f32,
        window: &RecordingWindow,
        now: Instant,
    ) -> Option<StopReason> {
        if window.reached_maximum() {
            return Some(StopReason::MaxDuration);
        }

        let (threshold, required) = (self.silence_threshold, self.required_silence_ms);
        let tracker = self
            .tracker
            .get_or_insert_with(|| SilenceTracker::new(threshold, required, now));

        if tracker.is_voice(level) {
            tracker.mark_voice(now);
            if self.pending.take().is_some() {
                debug!("Speech resumed, cancelled pending stop");
            }
        } else if tracker.is_sustained(now) && window.reached_minimum() && self.pending.is_none()
        {
            let pending = PendingStop {
                deadline: now + self.debounce,
            };
            debug!(
                "Silence for {}ms, stopping in {}ms unless speech resumes",
                tracker.silence_ms(now),
                self.debounce.as_millis()
            );
            self.pending = Some(pending);
        }

        self.on_timeout(now)
    }

    /// Fire the scheduled stop if its debounce has elapsed
    pub fn on_timeout(&mut self, now: Instant) -> Option<StopReason> {
        let pending = self.pending?;
        if !pending.is_due(now) {
            return None;
        }
        self.pending = None;
        let tail_ms = self.tracker.map(|t| t.silence_ms(now)).unwrap_or(0);
        Some(StopReason::Silence { tail_ms })
    }
}
