//! Error taxonomy for the voice pipeline
//!
//! Every variant is caught at the boundary of the operation that produced it
//! and turned into a state transition plus a user-facing message. None of them
//! escape the controller.

use thiserror::Error;

/// Errors produced while capturing, exchanging or playing back audio
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoiceError {
    /// Microphone access was denied or no input device exists
    #[error("microphone unavailable: {0}")]
    Permission(String),

    /// The recorder stopped without capturing any audio
    #[error("no audio was captured")]
    EmptyRecording,

    /// The encoded recording is implausibly small
    #[error("recording too small ({bytes} bytes, need at least {min})")]
    TooSmall { bytes: usize, min: usize },

    /// The recording was stopped before the minimum duration
    #[error("recording too short ({elapsed_ms} ms, need at least {min_ms} ms)")]
    TooShort { elapsed_ms: u64, min_ms: u64 },

    /// The exchange service failed or returned an error payload
    #[error("exchange failed: {0}")]
    Exchange(String),

    /// The reply audio could not be decoded or played
    #[error("playback failed: {0}")]
    Playback(String),
}

impl VoiceError {
    /// Whether the error ends the voice session rather than a single attempt
    pub fn is_fatal(&self) -> bool {
        matches!(self, VoiceError::Permission(_))
    }

    /// Short prompt shown to the user after the error
    pub fn user_prompt(&self) -> String {
        match self {
            VoiceError::Permission(_) => {
                "Microphone access is required. Enable voice mode again to retry.".to_string()
            }
            VoiceError::EmptyRecording | VoiceError::TooSmall { .. } => {
                "I didn't catch that. Please try again.".to_string()
            }
            VoiceError::TooShort { .. } => {
                "Recording too short. Hold on a little longer and try again.".to_string()
            }
            VoiceError::Exchange(detail) => format!("Sorry, something went wrong: {}", detail),
            VoiceError::Playback(detail) => format!("Could not play the reply: {}", detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_permission_is_fatal() {
        assert!(VoiceError::Permission("denied".into()).is_fatal());
        assert!(!VoiceError::EmptyRecording.is_fatal());
        assert!(!VoiceError::Exchange("rate_limited".into()).is_fatal());
        assert!(!VoiceError::Playback("bad header".into()).is_fatal());
    }

    #[test]
    fn test_exchange_prompt_keeps_detail() {
        let prompt = VoiceError::Exchange("rate_limited".into()).user_prompt();
        assert!(prompt.contains("rate_limited"));
    }
}
