use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One finalized recording plus the metadata the exchange service needs
///
/// Built once when a recording stops and moved into the exchange call, so it
/// can only be consumed once.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    /// Encoded audio (WAV, mono)
    pub audio: Vec<u8>,
    /// Sample rate of the encoded audio
    pub sample_rate: u32,
    /// Number of recorder chunks that went into the blob
    pub chunk_count: usize,
    /// Duration of the encoded audio in milliseconds
    pub duration_ms: u64,
    pub session_id: Uuid,
    pub language: String,
    pub voice_profile: String,
    pub recorded_at: DateTime<Utc>,
}

/// Session-level metadata attached to every utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtteranceMeta {
    pub session_id: Uuid,
    pub language: String,
    pub voice_profile: String,
}

/// Who a chat message is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A message for the chat transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: Role,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }
}
