//! Microphone capture session
//!
//! Owns the live input handle and the recorder bound to it. The input is
//! acquired with [`CaptureSession::open`] and must be released with
//! [`CaptureSession::close`] on every exit path so the device indicator
//! turns off.

use log::{debug, info, warn};
use std::time::Instant;

use super::recorder::{duration_seconds, encode_wav, ChunkRecorder};
use crate::config::VoiceConfig;
use crate::error::VoiceError;
use crate::models::{Utterance, UtteranceMeta};

/// Processing requested from the input device
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Preferred sample rate (default: 16000)
    pub sample_rate: u32,
    /// Number of channels (default: 1 for mono)
    pub channels: u32,
}

impl Default for InputConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            sample_rate: 16000,
            channels: 1,
        }
    }
}

/// A source of microphone inputs
pub trait Microphone {
    /// Acquire a live input, failing with [`VoiceError::Permission`] if access
    /// is denied or no device exists
    fn open(&mut self, constraints: &InputConstraints) -> Result<Box<dyn InputStream>, VoiceError>;
}

/// A live, exclusively owned microphone input
pub trait InputStream {
    /// Sample rate of the captured audio
    fn sample_rate(&self) -> u32;

    /// The most recent analysis window, used for loudness metering
    fn analysis_frame(&self) -> Vec<f32>;

    /// Take every sample captured since the previous call
    fn drain(&mut self) -> Vec<f32>;

    /// Release the device. Must be safe to call more than once.
    fn close(&mut self);
}

/// The microphone-to-blob pipeline for one voice session
pub struct CaptureSession {
    constraints: InputConstraints,
    input: Option<Box<dyn InputStream>>,
    recorder: ChunkRecorder,
    min_blob_bytes: usize,
}

impl CaptureSession {
    pub fn new(config: &VoiceConfig) -> Self {
        Self {
            constraints: InputConstraints::default(),
            input: None,
            recorder: ChunkRecorder::new(config.chunk_interval()),
            min_blob_bytes: config.min_blob_bytes,
        }
    }

    /// Check if an input handle is held
    pub fn is_open(&self) -> bool {
        self.input.is_some()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    /// Borrow the live input for metering
    pub fn input(&self) -> Option<&dyn InputStream> {
        self.input.as_deref()
    }

    /// Acquire the microphone, reusing the current handle if one is open
    pub fn open(&mut self, microphone: &mut dyn Microphone) -> Result<(), VoiceError> {
        if self.input.is_some() {
            return Ok(());
        }
        let input = microphone.open(&self.constraints)?;
        info!("Microphone opened at {}Hz", input.sample_rate());
        self.input = Some(input);
        Ok(())
    }

    /// Begin capturing chunks into a cleared buffer
    ///
    /// Returns false if no input is open or a recording is already running.
    pub fn start_recording(&mut self, now: Instant) -> bool {
        if self.recorder.is_recording() {
            warn!("Recording already in progress");
            return false;
        }
        let Some(input) = self.input.as_deref_mut() else {
            warn!("Cannot record without an open microphone");
            return false;
        };
        self.recorder.start(input, now);
        debug!("Recording started");
        true
    }

    /// Collect a chunk if one is due
    pub fn poll(&mut self, now: Instant) {
        if let Some(input) = self.input.as_deref_mut() {
            self.recorder.poll(input, now);
        }
    }

    /// Stop the recorder and concatenate everything captured into an utterance
    pub fn stop_recording(&mut self, meta: UtteranceMeta) -> Result<Utterance, VoiceError> {
        let sample_rate = self
            .input
            .as_ref()
            .map(|input| input.sample_rate())
            .unwrap_or(self.constraints.sample_rate);
        let chunks = match self.input.as_deref_mut() {
            Some(input) => self.recorder.stop(Some(input)),
            None => self.recorder.stop(None),
        };

        if chunks.is_empty() {
            return Err(VoiceError::EmptyRecording);
        }

        let chunk_count = chunks.len();
        let samples: Vec<f32> = chunks.into_iter().flatten().collect();
        let audio = encode_wav(&samples, sample_rate).map_err(|e| {
            warn!("{}", e);
            VoiceError::EmptyRecording
        })?;

        if audio.len() < self.min_blob_bytes {
            return Err(VoiceError::TooSmall {
                bytes: audio.len(),
                min: self.min_blob_bytes,
            });
        }

        let duration_ms = (duration_seconds(samples.len(), sample_rate) * 1000.0).round() as u64;
        debug!(
            "Recording finalized: {} chunks, {} samples, {} bytes",
            chunk_count,
            samples.len(),
            audio.len()
        );

        Ok(Utterance {
            audio,
            sample_rate,
            chunk_count,
            duration_ms,
            session_id: meta.session_id,
            language: meta.language,
            voice_profile: meta.voice_profile,
            recorded_at: chrono::Utc::now(),
        })
    }

    /// Release the microphone. Idempotent.
    pub fn close(&mut self) {
        let _ = self.recorder.stop(None);
        if let Some(mut input) = self.input.take() {
            input.close();
            info!("Microphone released");
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.close();
    }
}
