//! Talkback - a hands-free voice conversation pipeline
//!
//! Captures speech from the microphone, ends the recording on sustained
//! silence, sends the utterance to a remote exchange service and plays the
//! spoken reply. [`conversation::ConversationController`] owns the whole
//! cycle; [`session::VoiceSession`] drives it from a channel of events.

pub mod audio;
pub mod config;
pub mod conversation;
pub mod error;
pub mod exchange;
pub mod models;
pub mod session;
pub mod tokio_runtime;

#[cfg(test)]
pub(crate) mod testing;
