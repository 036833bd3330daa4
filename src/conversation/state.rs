use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the conversation currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationState {
    #[default]
    Idle,
    Listening,
    Processing,
    Speaking,
    Error,
}

impl ConversationState {
    pub fn label(&self) -> &'static str {
        match self {
            ConversationState::Idle => "idle",
            ConversationState::Listening => "listening",
            ConversationState::Processing => "processing",
            ConversationState::Speaking => "speaking",
            ConversationState::Error => "error",
        }
    }

    /// Whether the user may cancel out of this state with a toggle
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            ConversationState::Listening | ConversationState::Speaking
        )
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything the UI needs to render the voice controls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    pub state: ConversationState,
    pub voice_mode: bool,
    /// Human-readable status line
    pub status: String,
    /// Latest loudness sample (0.0 - 1.0) for the level meter
    pub level: f32,
    /// Elapsed recording time, 0 when not listening
    pub elapsed_ms: u64,
}

impl Default for ConversationSnapshot {
    fn default() -> Self {
        Self {
            state: ConversationState::Idle,
            voice_mode: false,
            status: String::new(),
            level: 0.0,
            elapsed_ms: 0,
        }
    }
}
