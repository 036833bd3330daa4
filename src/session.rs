//! Session driver
//!
//! Runs a [`ConversationController`] on the calling thread. Commands from the
//! UI and exchange results from the network arrive on one channel; between
//! events the loop sleeps until the controller's next deadline.

use log::{debug, info};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Instant;

use crate::conversation::{ConversationController, ConversationSnapshot};
use crate::error::VoiceError;
use crate::exchange::{ExchangeReply, Ticket};
use crate::models::ChatMessage;

/// User commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// The mic button
    Toggle,
    EnableVoiceMode,
    DisableVoiceMode,
    SetMuted(bool),
}

#[derive(Debug)]
pub enum SessionEvent {
    Command(Command),
    ExchangeFinished {
        ticket: Ticket,
        result: Result<ExchangeReply, VoiceError>,
    },
    Shutdown,
}

/// Receives what the UI should show
pub trait SessionObserver {
    /// Called after every event or timer with the current state
    fn on_snapshot(&mut self, snapshot: &ConversationSnapshot);

    fn on_message(&mut self, message: &ChatMessage);
}

pub struct VoiceSession<O: SessionObserver> {
    controller: ConversationController,
    events: Receiver<SessionEvent>,
    observer: O,
}

impl<O: SessionObserver> VoiceSession<O> {
    pub fn new(controller: ConversationController, events: Receiver<SessionEvent>, observer: O) -> Self {
        Self {
            controller,
            events,
            observer,
        }
    }

    pub fn controller(&self) -> &ConversationController {
        &self.controller
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Process events until shutdown or until every sender is gone
    ///
    /// Voice mode is always disabled on the way out.
    pub fn run(&mut self) {
        info!("Voice session started");
        loop {
            let event = match self.controller.poll_timeout() {
                Some(deadline) => {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match self.events.recv_timeout(wait) {
                        Ok(event) => Some(event),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match self.events.recv() {
                    Ok(event) => Some(event),
                    Err(_) => break,
                },
            };

            let now = Instant::now();
            match event {
                Some(SessionEvent::Shutdown) => break,
                Some(event) => self.apply(event, now),
                None => {}
            }
            if self.controller.poll_timeout().is_some_and(|d| d <= now) {
                self.controller.handle_timeout(now);
            }
            self.publish(now);
        }

        self.controller.disable_voice_mode();
        self.publish(Instant::now());
        info!("Voice session ended");
    }

    fn apply(&mut self, event: SessionEvent, now: Instant) {
        match event {
            SessionEvent::Command(command) => {
                debug!("Command: {:?}", command);
                match command {
                    Command::Toggle => self.controller.toggle(now),
                    Command::EnableVoiceMode => self.controller.enable_voice_mode(),
                    Command::DisableVoiceMode => self.controller.disable_voice_mode(),
                    Command::SetMuted(muted) => self.controller.set_muted(muted),
                }
            }
            SessionEvent::ExchangeFinished { ticket, result } => {
                self.controller.on_exchange_result(ticket, result, now);
            }
            SessionEvent::Shutdown => {}
        }
    }

    fn publish(&mut self, now: Instant) {
        for message in self.controller.take_messages() {
            self.observer.on_message(&message);
        }
        let snapshot = self.controller.snapshot(now);
        self.observer.on_snapshot(&snapshot);
    }
}
