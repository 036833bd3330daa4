//! In-memory stand-ins for the microphone, speaker and exchange service

use base64::Engine as _;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::audio::{
    encode_wav, AudioOutput, DecodedAudio, InputConstraints, InputStream, Microphone,
    PlaybackHandle, PlaybackStatus,
};
use crate::error::VoiceError;
use crate::exchange::{ExchangeDispatcher, ExchangeReply, Ticket};
use crate::models::Utterance;

const FAKE_SAMPLE_RATE: u32 = 16000;
const FAKE_FRAME_LEN: usize = 512;

struct MicState {
    level: Cell<f32>,
    samples_per_drain: Cell<usize>,
    denied: Cell<bool>,
    opens: Cell<usize>,
    open_handles: Cell<usize>,
    max_open_handles: Cell<usize>,
    last_constraints: RefCell<Option<InputConstraints>>,
}

/// Microphone producing a constant-amplitude signal
#[derive(Clone)]
pub struct FakeMicrophone {
    state: Rc<MicState>,
}

impl FakeMicrophone {
    pub fn new() -> Self {
        Self {
            state: Rc::new(MicState {
                level: Cell::new(0.0),
                // 100ms of audio at 16kHz
                samples_per_drain: Cell::new(1600),
                denied: Cell::new(false),
                opens: Cell::new(0),
                open_handles: Cell::new(0),
                max_open_handles: Cell::new(0),
                last_constraints: RefCell::new(None),
            }),
        }
    }

    /// An input not counted as an open device handle
    pub fn stream_for_tests(&self) -> FakeInputStream {
        FakeInputStream {
            state: self.state.clone(),
            counted: false,
            closed: false,
        }
    }

    pub fn set_level(&self, level: f32) {
        self.state.level.set(level);
    }

    pub fn set_samples_per_drain(&self, samples: usize) {
        self.state.samples_per_drain.set(samples);
    }

    pub fn deny_access(&self) {
        self.state.denied.set(true);
    }

    pub fn allow_access(&self) {
        self.state.denied.set(false);
    }

    pub fn open_count(&self) -> usize {
        self.state.opens.get()
    }

    pub fn open_handles(&self) -> usize {
        self.state.open_handles.get()
    }

    pub fn max_open_handles(&self) -> usize {
        self.state.max_open_handles.get()
    }

    pub fn last_constraints(&self) -> Option<InputConstraints> {
        self.state.last_constraints.borrow().clone()
    }
}

impl Microphone for FakeMicrophone {
    fn open(&mut self, constraints: &InputConstraints) -> Result<Box<dyn InputStream>, VoiceError> {
        if self.state.denied.get() {
            return Err(VoiceError::Permission("access denied".to_string()));
        }
        *self.state.last_constraints.borrow_mut() = Some(constraints.clone());
        self.state.opens.set(self.state.opens.get() + 1);
        let open = self.state.open_handles.get() + 1;
        self.state.open_handles.set(open);
        self.state
            .max_open_handles
            .set(self.state.max_open_handles.get().max(open));

        Ok(Box::new(FakeInputStream {
            state: self.state.clone(),
            counted: true,
            closed: false,
        }))
    }
}

pub struct FakeInputStream {
    state: Rc<MicState>,
    counted: bool,
    closed: bool,
}

impl InputStream for FakeInputStream {
    fn sample_rate(&self) -> u32 {
        FAKE_SAMPLE_RATE
    }

    fn analysis_frame(&self) -> Vec<f32> {
        if self.closed {
            return Vec::new();
        }
        vec![self.state.level.get(); FAKE_FRAME_LEN]
    }

    fn drain(&mut self) -> Vec<f32> {
        if self.closed {
            return Vec::new();
        }
        vec![self.state.level.get(); self.state.samples_per_drain.get()]
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.counted {
            self.state
                .open_handles
                .set(self.state.open_handles.get() - 1);
        }
    }
}

impl Drop for FakeInputStream {
    fn drop(&mut self) {
        self.close();
    }
}

struct HandleState {
    status: RefCell<PlaybackStatus>,
    stopped: Cell<bool>,
}

#[derive(Default)]
struct OutputState {
    handles: RefCell<Vec<Rc<HandleState>>>,
    live: Cell<usize>,
    max_live: Cell<usize>,
    last_volume: Cell<Option<f32>>,
}

/// Speaker whose clips only end when the test says so
#[derive(Clone, Default)]
pub struct FakeOutput {
    state: Rc<OutputState>,
}

impl FakeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of clips ever started
    pub fn started(&self) -> usize {
        self.state.handles.borrow().len()
    }

    pub fn live_handles(&self) -> usize {
        self.state.live.get()
    }

    pub fn max_live_handles(&self) -> usize {
        self.state.max_live.get()
    }

    pub fn handle_stopped(&self, index: usize) -> bool {
        self.state.handles.borrow()[index].stopped.get()
    }

    pub fn last_volume(&self) -> Option<f32> {
        self.state.last_volume.get()
    }

    /// Let the most recent clip reach its end
    pub fn finish_current(&self) {
        self.set_current_status(PlaybackStatus::Finished);
    }

    pub fn fail_current(&self, reason: &str) {
        self.set_current_status(PlaybackStatus::Failed(reason.to_string()));
    }

    fn set_current_status(&self, status: PlaybackStatus) {
        if let Some(handle) = self.state.handles.borrow().last() {
            if !handle.stopped.get() {
                *handle.status.borrow_mut() = status;
            }
        }
    }
}

impl AudioOutput for FakeOutput {
    fn start(
        &mut self,
        _audio: DecodedAudio,
        volume: f32,
    ) -> Result<Box<dyn PlaybackHandle>, VoiceError> {
        let handle = Rc::new(HandleState {
            status: RefCell::new(PlaybackStatus::Playing),
            stopped: Cell::new(false),
        });
        self.state.handles.borrow_mut().push(handle.clone());
        self.state.last_volume.set(Some(volume));
        let live = self.state.live.get() + 1;
        self.state.live.set(live);
        self.state.max_live.set(self.state.max_live.get().max(live));

        Ok(Box::new(FakeHandle {
            handle,
            output: self.state.clone(),
        }))
    }
}

struct FakeHandle {
    handle: Rc<HandleState>,
    output: Rc<OutputState>,
}

impl PlaybackHandle for FakeHandle {
    fn status(&mut self) -> PlaybackStatus {
        self.handle.status.borrow().clone()
    }

    fn stop(&mut self) {
        if self.handle.stopped.get() {
            return;
        }
        self.handle.stopped.set(true);
        self.output.live.set(self.output.live.get() - 1);
    }
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Exchange that records every dispatched utterance and never answers
#[derive(Clone, Default)]
pub struct RecordingExchange {
    calls: Rc<RefCell<Vec<(Ticket, Utterance)>>>,
}

impl RecordingExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn last_ticket(&self) -> Option<Ticket> {
        self.calls.borrow().last().map(|(ticket, _)| *ticket)
    }

    pub fn last_utterance(&self) -> Option<Utterance> {
        self.calls.borrow().last().map(|(_, utterance)| utterance.clone())
    }
}

impl ExchangeDispatcher for RecordingExchange {
    fn dispatch(&mut self, ticket: Ticket, utterance: Utterance) {
        self.calls.borrow_mut().push((ticket, utterance));
    }
}

/// Base64 WAV payload of `samples` quiet samples at 16kHz
pub fn wav_payload(samples: usize) -> String {
    let wav = encode_wav(&vec![0.1; samples], FAKE_SAMPLE_RATE).expect("encode test wav");
    base64::engine::general_purpose::STANDARD.encode(wav)
}

pub fn reply_with_audio(audio: String) -> ExchangeReply {
    ExchangeReply {
        transcription: "what's the weather".to_string(),
        response: "Sunny and warm.".to_string(),
        audio,
        language: "en".to_string(),
    }
}
