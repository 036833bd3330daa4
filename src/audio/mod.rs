//! Audio capture, metering and playback
//!
//! This module provides:
//! - Microphone capture sessions that record fixed timeslices into a WAV blob
//! - Real-time loudness metering
//! - Reply decoding and single-handle playback
//! - Device backends: WAV file replay, a silent output and (with the
//!   `pipewire` feature) PipeWire streams

mod capture;
mod level;
mod playback;
#[cfg(feature = "pipewire")]
mod pipewire;
mod recorder;
mod wav_input;

pub use capture::{CaptureSession, InputConstraints, InputStream, Microphone};
pub use level::{calculate_rms, AudioLevelMonitor};
pub use playback::{
    decode_payload, AudioOutput, DecodedAudio, PlaybackController, PlaybackHandle, PlaybackStatus,
    SilentOutput,
};
#[cfg(feature = "pipewire")]
pub use pipewire::{PipewireMicrophone, PipewireOutput};
pub use recorder::{decode_wav, duration_seconds, encode_wav, ChunkRecorder};
pub use wav_input::WavFileMicrophone;
