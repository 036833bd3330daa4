//! Conversation control: recording window, voice activity detection and the
//! state machine that sequences a voice turn

mod controller;
mod state;
mod timer;
mod timers;
mod vad;

pub use controller::ConversationController;
pub use state::{ConversationSnapshot, ConversationState};
pub use timer::{RecordingTimer, RecordingWindow};
pub use timers::{Repeating, Timers};
pub use vad::{PendingStop, SilenceTracker, StopReason, VoiceActivityDetector};
