//! Chunked recording and in-memory WAV encoding using hound
//!
//! Captured audio is collected in fixed timeslices and encoded to a mono
//! 32-bit float WAV blob when the recording stops. Nothing touches the disk.

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::Cursor;
use std::time::{Duration, Instant};

use super::capture::InputStream;

/// Collects audio from a live input in fixed timeslices
pub struct ChunkRecorder {
    interval: Duration,
    chunks: Vec<Vec<f32>>,
    next_chunk_at: Option<Instant>,
}

impl ChunkRecorder {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            chunks: Vec::new(),
            next_chunk_at: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.next_chunk_at.is_some()
    }

    /// Clear the buffer and begin a new recording
    pub fn start(&mut self, input: &mut dyn InputStream, now: Instant) {
        self.chunks.clear();
        // Anything captured before the start belongs to no recording
        let _ = input.drain();
        self.next_chunk_at = Some(now + self.interval);
    }

    /// Collect a chunk if the current timeslice has elapsed
    pub fn poll(&mut self, input: &mut dyn InputStream, now: Instant) {
        let Some(due) = self.next_chunk_at else {
            return;
        };
        if now < due {
            return;
        }
        self.push_chunk(input.drain());
        // Skip missed slices rather than bursting to catch up
        let mut next = due + self.interval;
        while next <= now {
            next += self.interval;
        }
        self.next_chunk_at = Some(next);
    }

    /// Stop recording, flushing whatever is left in the input
    pub fn stop(&mut self, input: Option<&mut dyn InputStream>) -> Vec<Vec<f32>> {
        if self.next_chunk_at.take().is_some() {
            if let Some(input) = input {
                self.push_chunk(input.drain());
            }
        }
        std::mem::take(&mut self.chunks)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    fn push_chunk(&mut self, chunk: Vec<f32>) {
        // Empty timeslices carry no data
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
    }
}

/// Encode mono samples to an in-memory WAV file
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, String> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut wav_writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| format!("Failed to create WAV writer: {}", e))?;

        for &sample in samples {
            wav_writer
                .write_sample(sample)
                .map_err(|e| format!("Failed to write sample: {}", e))?;
        }

        wav_writer
            .finalize()
            .map_err(|e| format!("Failed to finalize WAV data: {}", e))?;
    }

    Ok(cursor.into_inner())
}

/// Decode a WAV blob to mono f32 samples
///
/// Returns the samples and sample rate. Integer formats are scaled to
/// `[-1, 1]` and multi-channel audio is mixed down.
pub fn decode_wav(bytes: &[u8]) -> Result<(Vec<f32>, u32), String> {
    let reader =
        WavReader::new(Cursor::new(bytes)).map_err(|e| format!("Failed to read WAV data: {}", e))?;

    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let samples: Result<Vec<f32>, _> = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect(),
        SampleFormat::Int => {
            // Convert integer samples to float
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_value))
                .collect()
        }
    };
    let samples = samples.map_err(|e| format!("Failed to read samples: {}", e))?;

    let mono = if channels > 1 {
        samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        samples
    };

    Ok((mono, spec.sample_rate))
}

/// Get duration of samples in seconds
pub fn duration_seconds(sample_count: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    sample_count as f64 / sample_rate as f64
}
