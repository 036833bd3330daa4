//! Microphone stand-in that replays a WAV file in real time
//!
//! Each open starts the file from the beginning. Once the file runs out the
//! input reports silence, which lets the voice activity detector end the
//! recording exactly as it would after a real speaker stops.

use log::info;
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::capture::{InputConstraints, InputStream, Microphone};
use super::recorder::decode_wav;
use crate::error::VoiceError;

/// Samples in one analysis window
const ANALYSIS_WINDOW: usize = 1024;

/// Replays a WAV file as microphone input
pub struct WavFileMicrophone {
    path: PathBuf,
}

impl WavFileMicrophone {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl Microphone for WavFileMicrophone {
    fn open(&mut self, _constraints: &InputConstraints) -> Result<Box<dyn InputStream>, VoiceError> {
        let bytes = std::fs::read(&self.path).map_err(|e| {
            VoiceError::Permission(format!("cannot open {:?}: {}", self.path, e))
        })?;
        let (samples, sample_rate) = decode_wav(&bytes).map_err(VoiceError::Permission)?;
        if sample_rate == 0 {
            return Err(VoiceError::Permission(format!(
                "{:?} has a zero sample rate",
                self.path
            )));
        }
        info!(
            "Replaying {:?} as microphone input ({} samples at {}Hz)",
            self.path,
            samples.len(),
            sample_rate
        );
        Ok(Box::new(WavFileInput {
            samples,
            sample_rate,
            started: Instant::now(),
            cursor: 0,
            closed: false,
        }))
    }
}

struct WavFileInput {
    samples: Vec<f32>,
    sample_rate: u32,
    started: Instant,
    cursor: usize,
    closed: bool,
}

impl WavFileInput {
    /// Position in the file that real time has reached
    fn playhead(&self) -> usize {
        let elapsed = self.started.elapsed().as_secs_f64();
        ((elapsed * self.sample_rate as f64) as usize).min(self.samples.len())
    }
}

impl InputStream for WavFileInput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn analysis_frame(&self) -> Vec<f32> {
        if self.closed {
            return Vec::new();
        }
        let end = self.playhead();
        if end >= self.samples.len() {
            return vec![0.0; ANALYSIS_WINDOW];
        }
        let start = end.saturating_sub(ANALYSIS_WINDOW);
        self.samples[start..end].to_vec()
    }

    fn drain(&mut self) -> Vec<f32> {
        if self.closed {
            return Vec::new();
        }
        let end = self.playhead();
        let chunk = self.samples[self.cursor..end].to_vec();
        self.cursor = end;
        chunk
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
