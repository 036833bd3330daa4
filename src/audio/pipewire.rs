//! PipeWire microphone and speaker backends
//!
//! Each stream runs its own PipeWire main loop on a background thread and is
//! stopped through a PipeWire channel. Audio crosses the thread boundary
//! through a mutex-guarded buffer; the controller never touches PipeWire
//! objects directly.

use log::{error, warn};
use pipewire as pw;
use pw::spa;
use pw::spa::param::format::{MediaSubtype, MediaType};
use pw::spa::param::format_utils;
use pw::spa::pod::Pod;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::capture::{InputConstraints, InputStream, Microphone};
use super::playback::{AudioOutput, DecodedAudio, PlaybackHandle, PlaybackStatus};
use crate::error::VoiceError;

/// How long to wait for a stream to connect before giving up
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Samples kept for loudness metering
const ANALYSIS_WINDOW: usize = 1024;

const APP_NAME: &str = "Talkback";

enum StreamCommand {
    Stop,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Serialize an F32LE raw audio format pod for stream negotiation
fn f32_format_pod(rate: Option<u32>, channels: Option<u32>) -> Result<Vec<u8>, String> {
    let mut audio_info = spa::param::audio::AudioInfoRaw::new();
    audio_info.set_format(spa::param::audio::AudioFormat::F32LE);
    if let Some(rate) = rate {
        audio_info.set_rate(rate);
    }
    if let Some(channels) = channels {
        audio_info.set_channels(channels);
    }

    let obj = spa::pod::Object {
        type_: spa::utils::SpaTypes::ObjectParamFormat.as_raw(),
        id: spa::param::ParamType::EnumFormat.as_raw(),
        properties: audio_info.into(),
    };

    Ok(spa::pod::serialize::PodSerializer::serialize(
        std::io::Cursor::new(Vec::new()),
        &spa::pod::Value::Object(obj),
    )
    .map_err(|e| format!("Failed to serialize audio format: {:?}", e))?
    .0
    .into_inner())
}

/// Parse a negotiated format into `format`, ignoring non-raw-audio params
fn apply_format(format: &mut spa::param::audio::AudioInfoRaw, id: u32, param: Option<&Pod>) {
    let Some(param) = param else { return };
    if id != spa::param::ParamType::Format.as_raw() {
        return;
    }
    let Ok((media_type, media_subtype)) = format_utils::parse_format(param) else {
        return;
    };
    if media_type != MediaType::Audio || media_subtype != MediaSubtype::Raw {
        return;
    }
    if let Err(e) = format.parse(param) {
        warn!("Failed to parse negotiated audio format: {:?}", e);
    }
}

// ---------------------------------------------------------------------------
// Capture

struct CaptureBuffer {
    pending: Vec<f32>,
    analysis: Vec<f32>,
    sample_rate: u32,
}

/// Microphone input through PipeWire
#[derive(Debug, Default)]
pub struct PipewireMicrophone;

impl Microphone for PipewireMicrophone {
    fn open(&mut self, constraints: &InputConstraints) -> Result<Box<dyn InputStream>, VoiceError> {
        let buffer = Arc::new(Mutex::new(CaptureBuffer {
            pending: Vec::new(),
            analysis: Vec::new(),
            sample_rate: constraints.sample_rate,
        }));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();
        let (sender, receiver) = pw::channel::channel::<StreamCommand>();

        let thread_buffer = buffer.clone();
        let constraints = constraints.clone();
        let handle = thread::spawn(move || {
            let ready = ready_tx.clone();
            if let Err(e) = run_capture_loop(thread_buffer, constraints, receiver, ready_tx) {
                error!("PipeWire capture failed: {}", e);
                let _ = ready.send(Err(e));
            }
        });

        let stop = || {
            let _ = sender.send(StreamCommand::Stop);
        };
        let handle = await_stream_ready(&ready_rx, handle, stop, CONNECT_TIMEOUT)
            .map_err(VoiceError::Permission)?;

        Ok(Box::new(PipewireInput {
            buffer,
            sender: Some(sender),
            thread_handle: Some(handle),
        }))
    }
}

/// Wait for a stream thread to report that it connected
///
/// On failure or timeout the thread is stopped and joined before returning,
/// so a failed open never leaves a stream running.
fn await_stream_ready(
    ready: &mpsc::Receiver<Result<(), String>>,
    handle: JoinHandle<()>,
    stop: impl FnOnce(),
    timeout: Duration,
) -> Result<JoinHandle<()>, String> {
    match ready.recv_timeout(timeout) {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(e)) => {
            let _ = handle.join();
            Err(e)
        }
        Err(_) => {
            stop();
            let _ = handle.join();
            Err("timed out connecting to PipeWire".to_string())
        }
    }
}

struct PipewireInput {
    buffer: Arc<Mutex<CaptureBuffer>>,
    sender: Option<pw::channel::Sender<StreamCommand>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl InputStream for PipewireInput {
    fn sample_rate(&self) -> u32 {
        lock(&self.buffer).sample_rate
    }

    fn analysis_frame(&self) -> Vec<f32> {
        lock(&self.buffer).analysis.clone()
    }

    fn drain(&mut self) -> Vec<f32> {
        std::mem::take(&mut lock(&self.buffer).pending)
    }

    fn close(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(StreamCommand::Stop);
        }
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
        let mut buffer = lock(&self.buffer);
        buffer.pending.clear();
        buffer.analysis.clear();
    }
}

impl Drop for PipewireInput {
    fn drop(&mut self) {
        self.close();
    }
}

/// Run the PipeWire capture loop in a background thread
fn run_capture_loop(
    buffer: Arc<Mutex<CaptureBuffer>>,
    constraints: InputConstraints,
    receiver: pw::channel::Receiver<StreamCommand>,
    ready: mpsc::Sender<Result<(), String>>,
) -> Result<(), String> {
    pw::init();

    let mainloop = pw::main_loop::MainLoopRc::new(None)
        .map_err(|e| format!("Failed to create PipeWire main loop: {}", e))?;

    let context = pw::context::ContextRc::new(&mainloop, None)
        .map_err(|e| format!("Failed to create PipeWire context: {}", e))?;

    let core = context
        .connect_rc(None)
        .map_err(|e| format!("Failed to connect to PipeWire: {}", e))?;

    let mainloop_weak = mainloop.downgrade();
    let _receiver = receiver.attach(mainloop.loop_(), move |cmd| match cmd {
        StreamCommand::Stop => {
            if let Some(mainloop) = mainloop_weak.upgrade() {
                mainloop.quit();
            }
        }
    });

    struct UserData {
        format: spa::param::audio::AudioInfoRaw,
        buffer: Arc<Mutex<CaptureBuffer>>,
    }

    let user_data = UserData {
        format: Default::default(),
        buffer,
    };

    // The communication role lets the session manager route the stream
    // through echo-cancel/noise-suppression filters when they are installed
    let role = if constraints.echo_cancellation || constraints.noise_suppression {
        "Communication"
    } else {
        "Production"
    };
    let props = pw::properties::properties! {
        *pw::keys::MEDIA_TYPE => "Audio",
        *pw::keys::MEDIA_CATEGORY => "Capture",
        *pw::keys::MEDIA_ROLE => role,
        *pw::keys::APP_NAME => APP_NAME,
    };

    let stream = pw::stream::StreamBox::new(&core, "talkback-capture", props)
        .map_err(|e| format!("Failed to create PipeWire stream: {}", e))?;

    let _listener = stream
        .add_local_listener_with_user_data(user_data)
        .param_changed(|_, user_data, id, param| {
            apply_format(&mut user_data.format, id, param);
        })
        .process(|stream, user_data| {
            let Some(mut pw_buffer) = stream.dequeue_buffer() else {
                return;
            };

            let datas = pw_buffer.datas_mut();
            if datas.is_empty() {
                return;
            }

            let data = &mut datas[0];
            let n_channels = user_data.format.channels().max(1) as usize;
            let sample_rate = user_data.format.rate();
            let n_bytes = data.chunk().size() as usize;

            let Some(raw) = data.data() else {
                return;
            };
            let raw = &raw[..n_bytes.min(raw.len())];

            // Keep the first channel of each frame
            let frame_bytes = std::mem::size_of::<f32>() * n_channels;
            let mono: Vec<f32> = raw
                .chunks_exact(frame_bytes)
                .map(|frame| f32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]))
                .collect();

            let mut shared = lock(&user_data.buffer);
            if sample_rate > 0 {
                shared.sample_rate = sample_rate;
            }
            shared.pending.extend_from_slice(&mono);
            shared.analysis.extend_from_slice(&mono);
            let excess = shared.analysis.len().saturating_sub(ANALYSIS_WINDOW);
            shared.analysis.drain(..excess);
        })
        .register()
        .map_err(|e| format!("Failed to register stream listener: {}", e))?;

    let values = f32_format_pod(Some(constraints.sample_rate), Some(constraints.channels))?;
    let pod = Pod::from_bytes(&values).ok_or("Failed to build format pod")?;
    let mut params = [pod];

    stream
        .connect(
            spa::utils::Direction::Input,
            None,
            pw::stream::StreamFlags::AUTOCONNECT
                | pw::stream::StreamFlags::MAP_BUFFERS
                | pw::stream::StreamFlags::RT_PROCESS,
            &mut params,
        )
        .map_err(|e| format!("Failed to connect stream: {}", e))?;

    let _ = ready.send(Ok(()));

    // Run until stopped
    mainloop.run();

    Ok(())
}

// ---------------------------------------------------------------------------
// Playback

struct PlaybackBuffer {
    samples: Vec<f32>,
    position: usize,
    volume: f32,
    finished: bool,
    error: Option<String>,
}

impl PlaybackBuffer {
    /// Get samples for playback (advances position)
    fn next_samples(&mut self, count: usize) -> Option<Vec<f32>> {
        if self.position >= self.samples.len() {
            return None;
        }
        let end = (self.position + count).min(self.samples.len());
        let samples = self.samples[self.position..end]
            .iter()
            .map(|s| s * self.volume)
            .collect();
        self.position = end;
        Some(samples)
    }
}

/// Speaker output through PipeWire
#[derive(Debug, Default)]
pub struct PipewireOutput;

impl AudioOutput for PipewireOutput {
    fn start(
        &mut self,
        audio: DecodedAudio,
        volume: f32,
    ) -> Result<Box<dyn PlaybackHandle>, VoiceError> {
        let sample_rate = audio.sample_rate;
        let buffer = Arc::new(Mutex::new(PlaybackBuffer {
            samples: audio.samples,
            position: 0,
            volume,
            finished: false,
            error: None,
        }));
        let (sender, receiver) = pw::channel::channel::<StreamCommand>();

        let thread_buffer = buffer.clone();
        let handle = thread::spawn(move || {
            let result = run_playback_loop(thread_buffer.clone(), sample_rate, receiver);
            let mut shared = lock(&thread_buffer);
            if let Err(e) = result {
                shared.error = Some(e);
            }
            shared.finished = true;
        });

        Ok(Box::new(PipewirePlayback {
            buffer,
            sender: Some(sender),
            thread_handle: Some(handle),
        }))
    }
}

struct PipewirePlayback {
    buffer: Arc<Mutex<PlaybackBuffer>>,
    sender: Option<pw::channel::Sender<StreamCommand>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl PlaybackHandle for PipewirePlayback {
    fn status(&mut self) -> PlaybackStatus {
        let shared = lock(&self.buffer);
        match (&shared.error, shared.finished) {
            (Some(e), _) => PlaybackStatus::Failed(e.clone()),
            (None, true) => PlaybackStatus::Finished,
            (None, false) => PlaybackStatus::Playing,
        }
    }

    fn stop(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(StreamCommand::Stop);
        }
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PipewirePlayback {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run the PipeWire playback loop in a background thread
fn run_playback_loop(
    buffer: Arc<Mutex<PlaybackBuffer>>,
    sample_rate: u32,
    receiver: pw::channel::Receiver<StreamCommand>,
) -> Result<(), String> {
    pw::init();

    let mainloop = pw::main_loop::MainLoopRc::new(None)
        .map_err(|e| format!("Failed to create PipeWire main loop: {}", e))?;

    let context = pw::context::ContextRc::new(&mainloop, None)
        .map_err(|e| format!("Failed to create PipeWire context: {}", e))?;

    let core = context
        .connect_rc(None)
        .map_err(|e| format!("Failed to connect to PipeWire: {}", e))?;

    let mainloop_weak = mainloop.downgrade();
    let _receiver = receiver.attach(mainloop.loop_(), move |cmd| match cmd {
        StreamCommand::Stop => {
            if let Some(mainloop) = mainloop_weak.upgrade() {
                mainloop.quit();
            }
        }
    });

    struct UserData {
        format: spa::param::audio::AudioInfoRaw,
        buffer: Arc<Mutex<PlaybackBuffer>>,
        mainloop_weak: pw::main_loop::MainLoopWeak,
    }

    let user_data = UserData {
        format: Default::default(),
        buffer,
        mainloop_weak: mainloop.downgrade(),
    };

    let props = pw::properties::properties! {
        *pw::keys::MEDIA_TYPE => "Audio",
        *pw::keys::MEDIA_CATEGORY => "Playback",
        *pw::keys::MEDIA_ROLE => "Communication",
        *pw::keys::APP_NAME => APP_NAME,
    };

    let stream = pw::stream::StreamBox::new(&core, "talkback-playback", props)
        .map_err(|e| format!("Failed to create PipeWire stream: {}", e))?;

    let _listener = stream
        .add_local_listener_with_user_data(user_data)
        .param_changed(|_, user_data, id, param| {
            apply_format(&mut user_data.format, id, param);
        })
        .process(|stream, user_data| {
            let Some(mut pw_buffer) = stream.dequeue_buffer() else {
                return;
            };

            let datas = pw_buffer.datas_mut();
            if datas.is_empty() {
                return;
            }

            let data = &mut datas[0];
            let n_channels = user_data.format.channels().max(1) as usize;
            let stride = std::mem::size_of::<f32>() * n_channels;

            let Some(slice) = data.data() else {
                return;
            };
            let n_frames = slice.len() / stride;

            let samples = lock(&user_data.buffer).next_samples(n_frames);
            match samples {
                Some(samples) => {
                    for (i, &sample) in samples.iter().enumerate() {
                        let bytes = sample.to_le_bytes();
                        // Duplicate mono into every channel of the frame
                        for channel in 0..n_channels {
                            let offset = i * stride + channel * 4;
                            slice[offset..offset + 4].copy_from_slice(&bytes);
                        }
                    }
                    let written = samples.len() * stride;
                    slice[written..].fill(0);

                    let chunk = data.chunk_mut();
                    *chunk.offset_mut() = 0;
                    *chunk.stride_mut() = stride as i32;
                    *chunk.size_mut() = written as u32;
                }
                None => {
                    if let Some(mainloop) = user_data.mainloop_weak.upgrade() {
                        mainloop.quit();
                    }
                }
            }
        })
        .register()
        .map_err(|e| format!("Failed to register stream listener: {}", e))?;

    let values = f32_format_pod(Some(sample_rate), None)?;
    let pod = Pod::from_bytes(&values).ok_or("Failed to build format pod")?;
    let mut params = [pod];

    stream
        .connect(
            spa::utils::Direction::Output,
            None,
            pw::stream::StreamFlags::AUTOCONNECT
                | pw::stream::StreamFlags::MAP_BUFFERS
                | pw::stream::StreamFlags::RT_PROCESS,
            &mut params,
        )
        .map_err(|e| format!("Failed to connect stream: {}", e))?;

    // Run until stopped or playback ends
    mainloop.run();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_ready_timeout_stops_and_joins_thread() {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let exited = Arc::new(AtomicBool::new(false));

        let thread_exited = exited.clone();
        let handle = thread::spawn(move || {
            let _ready = ready_tx;
            let _ = stop_rx.recv();
            thread_exited.store(true, Ordering::SeqCst);
        });

        let stop = || {
            let _ = stop_tx.send(());
        };
        let err = await_stream_ready(&ready_rx, handle, stop, Duration::from_millis(20))
            .unwrap_err();
        assert!(err.contains("timed out"));
        assert!(exited.load(Ordering::SeqCst));
    }

    #[test]
    fn test_ready_error_joins_thread() {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();
        let handle = thread::spawn(move || {
            let _ = ready_tx.send(Err("no such device".to_string()));
        });

        let err = await_stream_ready(&ready_rx, handle, || {}, Duration::from_secs(1)).unwrap_err();
        assert_eq!(err, "no such device");
    }

    #[test]
    fn test_ready_signal_returns_handle() {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();
        let handle = thread::spawn(move || {
            let _ = ready_tx.send(Ok(()));
        });

        let handle = await_stream_ready(&ready_rx, handle, || {}, Duration::from_secs(1)).unwrap();
        handle.join().unwrap();
    }
}
