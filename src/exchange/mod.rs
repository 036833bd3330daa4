//! Remote exchange: transcription, response and speech synthesis
//!
//! The service is opaque. One utterance goes in; a transcription, a text
//! response and base64 reply audio come back, or an error payload. Any
//! failure is reported the same way and never retried.

mod http;

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::VoiceError;
use crate::models::Utterance;

pub use http::HttpExchange;

/// Ties an exchange result to the request that produced it
pub type Ticket = u64;

/// Starts exchange calls; results come back to the controller later
///
/// Implementations must not block. The result for `ticket` is delivered
/// through `ConversationController::on_exchange_result`.
pub trait ExchangeDispatcher {
    fn dispatch(&mut self, ticket: Ticket, utterance: Utterance);
}

/// Request body sent to the exchange service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRequest {
    /// Base64-encoded WAV audio
    pub audio: String,
    pub language: String,
    pub voice_profile: String,
    pub session_id: Uuid,
}

impl From<Utterance> for ExchangeRequest {
    fn from(utterance: Utterance) -> Self {
        Self {
            audio: base64::engine::general_purpose::STANDARD.encode(&utterance.audio),
            language: utterance.language,
            voice_profile: utterance.voice_profile,
            session_id: utterance.session_id,
        }
    }
}

/// Successful reply from the exchange service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeReply {
    /// What the service heard
    pub transcription: String,
    /// Text of the spoken reply
    pub response: String,
    /// Base64-encoded reply audio
    pub audio: String,
    #[serde(default)]
    pub language: String,
}

/// Error payload from the exchange service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeFailure {
    pub error: String,
    #[serde(default)]
    pub details: Option<String>,
}

impl ExchangeFailure {
    fn describe(&self) -> String {
        match &self.details {
            Some(details) if !details.is_empty() => format!("{} ({})", self.error, details),
            _ => self.error.clone(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExchangeResponse {
    Failure(ExchangeFailure),
    Reply(ExchangeReply),
}

/// Interpret a response body and HTTP status
///
/// An error payload wins over the status code so the service's own message
/// reaches the user.
pub fn parse_response(status: u16, body: &str) -> Result<ExchangeReply, VoiceError> {
    let parsed = serde_json::from_str::<ExchangeResponse>(body);
    let success = (200..300).contains(&status);

    match parsed {
        Ok(ExchangeResponse::Failure(failure)) => Err(VoiceError::Exchange(failure.describe())),
        Ok(ExchangeResponse::Reply(reply)) if success => Ok(reply),
        Ok(ExchangeResponse::Reply(_)) => Err(VoiceError::Exchange(format!("HTTP {}", status))),
        Err(_) if !success => Err(VoiceError::Exchange(format!("HTTP {}", status))),
        Err(e) => Err(VoiceError::Exchange(format!("malformed response: {}", e))),
    }
}
