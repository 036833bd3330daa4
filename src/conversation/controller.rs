//! The conversation state machine
//!
//! `ConversationController` sequences capture, voice activity detection, the
//! remote exchange and playback. It is the only component the UI talks to and
//! the only one that changes [`ConversationState`].
//!
//! The controller does no I/O waiting of its own. Time is always passed in,
//! loops are deadlines in [`Timers`], and the exchange result is delivered back
//! through [`ConversationController::on_exchange_result`]. A driver calls
//! [`ConversationController::handle_timeout`] whenever
//! [`ConversationController::poll_timeout`] passes.
//!
//! Teardown: every exit from listening, processing or speaking goes through
//! [`ConversationController::release_resources`], which closes the microphone,
//! stops playback, cancels every timer and forgets any in-flight exchange.

use log::{debug, error, info, warn};
use std::time::Instant;
use uuid::Uuid;

use super::state::{ConversationSnapshot, ConversationState};
use super::timer::RecordingTimer;
use super::timers::{Repeating, Timers};
use super::vad::{StopReason, VoiceActivityDetector};
use crate::audio::{
    AudioLevelMonitor, AudioOutput, CaptureSession, Microphone, PlaybackController,
    PlaybackStatus,
};
use crate::config::VoiceConfig;
use crate::error::VoiceError;
use crate::exchange::{ExchangeDispatcher, ExchangeReply, Ticket};
use crate::models::{ChatMessage, UtteranceMeta};

const STATUS_READY: &str = "Ready. Press the mic to talk.";
const STATUS_LISTENING: &str = "Listening...";
const STATUS_PROCESSING: &str = "Thinking...";
const STATUS_SPEAKING: &str = "Speaking...";

pub struct ConversationController {
    config: VoiceConfig,
    state: ConversationState,
    voice_mode: bool,
    status: String,
    level: f32,
    session_id: Uuid,
    microphone: Box<dyn Microphone>,
    /// Exists while voice mode is on; its input is open only while listening
    capture: Option<CaptureSession>,
    monitor: AudioLevelMonitor,
    timer: RecordingTimer,
    vad: VoiceActivityDetector,
    playback: PlaybackController,
    exchange: Box<dyn ExchangeDispatcher>,
    timers: Timers,
    last_ticket: Ticket,
    in_flight: Option<Ticket>,
    last_stop: Option<StopReason>,
    messages: Vec<ChatMessage>,
}

impl ConversationController {
    pub fn new(
        config: VoiceConfig,
        microphone: Box<dyn Microphone>,
        output: Box<dyn AudioOutput>,
        exchange: Box<dyn ExchangeDispatcher>,
    ) -> Self {
        Self {
            monitor: AudioLevelMonitor::new(config.level_gain),
            vad: VoiceActivityDetector::from_config(&config),
            playback: PlaybackController::new(output, config.muted),
            state: ConversationState::Idle,
            voice_mode: false,
            status: String::new(),
            level: 0.0,
            session_id: Uuid::new_v4(),
            microphone,
            capture: None,
            timer: RecordingTimer::new(),
            exchange,
            timers: Timers::default(),
            last_ticket: 0,
            in_flight: None,
            last_stop: None,
            messages: Vec::new(),
            config,
        }
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn voice_mode(&self) -> bool {
        self.voice_mode
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Latest loudness sample for the level meter
    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn elapsed_ms(&self, now: Instant) -> u64 {
        self.timer.elapsed_ms(now)
    }

    /// Why the most recent recording ended
    pub fn last_stop_reason(&self) -> Option<StopReason> {
        self.last_stop
    }

    /// Check if the microphone is currently held
    pub fn is_microphone_open(&self) -> bool {
        self.capture.as_ref().is_some_and(|c| c.is_open())
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_active()
    }

    /// Number of armed timers, including a scheduled silence stop
    pub fn pending_timers(&self) -> usize {
        self.timers.pending_count() + usize::from(self.vad.pending_deadline().is_some())
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.playback.set_muted(muted);
    }

    pub fn snapshot(&self, now: Instant) -> ConversationSnapshot {
        ConversationSnapshot {
            state: self.state,
            voice_mode: self.voice_mode,
            status: self.status.clone(),
            level: self.level,
            elapsed_ms: self.elapsed_ms(now),
        }
    }

    /// Drain chat messages produced since the last call
    pub fn take_messages(&mut self) -> Vec<ChatMessage> {
        std::mem::take(&mut self.messages)
    }

    /// Earliest moment the controller needs [`Self::handle_timeout`]
    pub fn poll_timeout(&self) -> Option<Instant> {
        [self.timers.next_deadline(), self.vad.pending_deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    // ------------------------------------------------------------------
    // Commands

    /// Context-sensitive mic button: start, stop, interrupt or retry
    pub fn toggle(&mut self, now: Instant) {
        if !self.voice_mode {
            debug!("Toggle ignored: voice mode is off");
            self.status = "Voice mode is off.".to_string();
            return;
        }
        if self.state.is_cancellable() {
            self.cancel(now);
            return;
        }
        match self.state {
            ConversationState::Idle => self.start_listening(now),
            ConversationState::Error => self.enable_voice_mode(),
            state => debug!("Toggle ignored in {}", state),
        }
    }

    /// Turn voice mode on, or recover from the error state
    pub fn enable_voice_mode(&mut self) {
        if self.voice_mode && self.state != ConversationState::Error {
            debug!("Voice mode already enabled");
            return;
        }
        self.release_resources();
        self.voice_mode = true;
        self.session_id = Uuid::new_v4();
        self.capture = Some(CaptureSession::new(&self.config));
        info!("Voice mode enabled (session {})", self.session_id);
        self.transition(ConversationState::Idle, STATUS_READY);
    }

    /// Global teardown, reachable from every state
    pub fn disable_voice_mode(&mut self) {
        self.release_resources();
        self.capture = None;
        if self.voice_mode {
            info!("Voice mode disabled (session {})", self.session_id);
        }
        self.voice_mode = false;
        self.transition(ConversationState::Idle, "Voice mode off.");
    }

    // ------------------------------------------------------------------
    // Events

    /// Run every timer that is due at `now`
    pub fn handle_timeout(&mut self, now: Instant) {
        match self.state {
            ConversationState::Listening => self.on_listening_timeout(now),
            ConversationState::Processing => {
                if self.timers.exchange_deadline.is_some_and(|d| now >= d) {
                    warn!(
                        "Exchange timed out after {}ms",
                        self.config.exchange_timeout_ms
                    );
                    self.reject(VoiceError::Exchange("request timed out".to_string()));
                }
            }
            ConversationState::Speaking => {
                if self
                    .timers
                    .playback_watch
                    .as_mut()
                    .is_some_and(|t| t.fire(now))
                {
                    self.check_playback();
                }
            }
            ConversationState::Idle | ConversationState::Error => {}
        }
    }

    /// Deliver the outcome of an exchange call
    ///
    /// Results for a superseded ticket, or arriving after voice mode was
    /// disabled, are discarded.
    pub fn on_exchange_result(
        &mut self,
        ticket: Ticket,
        result: Result<ExchangeReply, VoiceError>,
        now: Instant,
    ) {
        if !self.voice_mode
            || self.state != ConversationState::Processing
            || self.in_flight != Some(ticket)
        {
            debug!("Discarding stale exchange result #{}", ticket);
            return;
        }
        self.in_flight = None;
        self.timers.exchange_deadline = None;

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                self.reject(e);
                return;
            }
        };

        if !reply.transcription.trim().is_empty() {
            self.messages.push(ChatMessage::user(reply.transcription.trim()));
        }
        if !reply.response.trim().is_empty() {
            self.messages.push(ChatMessage::assistant(reply.response.trim()));
        }

        if reply.audio.trim().is_empty() {
            debug!("Reply carried no audio");
            self.to_idle(STATUS_READY);
            return;
        }

        match self.playback.play(&reply.audio) {
            Ok(()) => {
                self.timers.playback_watch =
                    Some(Repeating::starting_at(now, self.config.playback_poll()));
                self.transition(ConversationState::Speaking, STATUS_SPEAKING);
            }
            Err(e) => self.reject(e),
        }
    }

    // ------------------------------------------------------------------
    // Transitions

    fn start_listening(&mut self, now: Instant) {
        let Some(capture) = self.capture.as_mut() else {
            warn!("No capture session while voice mode is on");
            return;
        };

        if let Err(e) = capture.open(self.microphone.as_mut()) {
            self.fail(e);
            return;
        }
        if !capture.start_recording(now) {
            capture.close();
            self.to_idle(STATUS_READY);
            return;
        }

        self.timer.start(now);
        self.vad.reset(now);
        self.level = 0.0;
        self.timers.sampling = Some(Repeating::starting_at(now, self.config.sample_interval()));
        self.timers.boundary = Some(Repeating::starting_at(now, self.config.boundary_interval()));
        self.transition(ConversationState::Listening, STATUS_LISTENING);
    }

    fn on_listening_timeout(&mut self, now: Instant) {
        if self.timers.sampling.as_mut().is_some_and(|t| t.fire(now)) {
            self.on_sample_tick(now);
            if self.state != ConversationState::Listening {
                return;
            }
        }

        if self.timers.boundary.as_mut().is_some_and(|t| t.fire(now))
            && self
                .timer
                .has_reached_maximum(self.config.max_recording_ms, now)
        {
            self.finish_recording(StopReason::MaxDuration, now);
            return;
        }

        if let Some(reason) = self.vad.on_timeout(now) {
            self.finish_recording(reason, now);
        }
    }

    fn on_sample_tick(&mut self, now: Instant) {
        let Some(capture) = self.capture.as_mut() else {
            return;
        };
        self.level = self.monitor.sample(capture.input());
        capture.poll(now);

        let Some(window) =
            self.timer
                .window(now, self.config.min_recording_ms, self.config.max_recording_ms)
        else {
            return;
        };
        if let Some(reason) = self.vad.on_sample(self.level, &window, now) {
            self.finish_recording(reason, now);
        }
    }

    /// Leave listening: stop the loops, finalize the recording, release the
    /// microphone, then either dispatch the utterance or reject it
    fn finish_recording(&mut self, reason: StopReason, now: Instant) {
        // Loops go first so nothing samples a released input
        self.timers.cancel_listening();
        self.vad.clear();
        let elapsed_ms = self.timer.elapsed_ms(now);
        self.timer.stop();
        self.level = 0.0;
        self.last_stop = Some(reason);

        let meta = UtteranceMeta {
            session_id: self.session_id,
            language: self.config.language.clone(),
            voice_profile: self.config.voice_profile.clone(),
        };
        let result = match self.capture.as_mut() {
            Some(capture) => {
                let result = capture.stop_recording(meta);
                capture.close();
                result
            }
            None => Err(VoiceError::EmptyRecording),
        };
        info!(
            "Recording stopped ({}) after {}ms",
            reason.label(),
            elapsed_ms
        );

        if reason == StopReason::Manual && elapsed_ms < self.config.min_recording_ms {
            self.reject(VoiceError::TooShort {
                elapsed_ms,
                min_ms: self.config.min_recording_ms,
            });
            return;
        }

        match result {
            Ok(utterance) => {
                self.last_ticket += 1;
                let ticket = self.last_ticket;
                self.in_flight = Some(ticket);
                self.timers.exchange_deadline = Some(now + self.config.exchange_timeout());
                self.transition(ConversationState::Processing, STATUS_PROCESSING);
                self.exchange.dispatch(ticket, utterance);
            }
            Err(e) => self.reject(e),
        }
    }

    fn check_playback(&mut self) {
        match self.playback.poll() {
            Some(PlaybackStatus::Playing) => {}
            Some(PlaybackStatus::Finished) | None => self.to_idle(STATUS_READY),
            Some(PlaybackStatus::Failed(e)) => self.reject(VoiceError::Playback(e)),
        }
    }

    /// Leave a cancellable state: listening ends the recording, speaking stops
    /// the reply
    fn cancel(&mut self, now: Instant) {
        if self.state == ConversationState::Listening {
            self.finish_recording(StopReason::Manual, now);
        } else {
            info!("Playback interrupted by user");
            self.to_idle(STATUS_READY);
        }
    }

    /// Recoverable failure of one attempt: back to idle with a prompt
    fn reject(&mut self, e: VoiceError) {
        warn!("{}", e);
        let prompt = e.user_prompt();
        self.messages.push(ChatMessage::system(prompt.clone()));
        self.to_idle(&prompt);
    }

    /// Fatal failure: tear the capture session down and enter the error state
    fn fail(&mut self, e: VoiceError) {
        error!("{}", e);
        self.release_resources();
        self.capture = None;
        let prompt = e.user_prompt();
        self.messages.push(ChatMessage::system(prompt.clone()));
        self.transition(ConversationState::Error, &prompt);
    }

    fn to_idle(&mut self, status: &str) {
        self.release_resources();
        self.transition(ConversationState::Idle, status);
    }

    /// The single release path: close capture, stop playback, clear timers
    fn release_resources(&mut self) {
        self.timers.clear();
        self.vad.clear();
        self.timer.stop();
        if let Some(capture) = self.capture.as_mut() {
            capture.close();
        }
        self.playback.stop();
        self.in_flight = None;
        self.level = 0.0;
    }

    fn transition(&mut self, next: ConversationState, status: &str) {
        if self.state != next {
            info!("Conversation {} -> {}", self.state, next);
        }
        self.state = next;
        self.status = status.to_string();
    }
}
