//! Loudness metering for a live input
//!
//! The monitor is a pure transform from the input's current analysis window
//! to a scalar in `[0, 1]`. It keeps no state between calls.

use super::capture::InputStream;

/// Reports normalized loudness of a live input on demand
#[derive(Debug, Clone, Copy)]
pub struct AudioLevelMonitor {
    gain: f32,
}

impl AudioLevelMonitor {
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }

    /// Sample the current loudness
    ///
    /// Energy is averaged over the whole analysis window. By Parseval's theorem
    /// the mean spectral energy is proportional to the time-domain energy, so
    /// RMS is used directly without a transform. Returns 0 with no input.
    pub fn sample(&self, input: Option<&dyn InputStream>) -> f32 {
        let Some(input) = input else {
            return 0.0;
        };
        let level = calculate_rms(&input.analysis_frame()) * self.gain;
        if level.is_finite() {
            level.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

impl Default for AudioLevelMonitor {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// Calculate RMS volume from samples
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
