//! HTTP client for the exchange service

use log::{debug, info, warn};
use std::sync::mpsc::Sender;
use std::time::Duration;

use super::{parse_response, ExchangeDispatcher, ExchangeReply, ExchangeRequest, Ticket};
use crate::error::VoiceError;
use crate::models::Utterance;
use crate::session::SessionEvent;
use crate::tokio_runtime;

/// Posts utterances as JSON and reports results back to the session
pub struct HttpExchange {
    client: reqwest::Client,
    endpoint: String,
    events: Sender<SessionEvent>,
}

impl HttpExchange {
    /// Build a client with the caller-defined timeout
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        events: Sender<SessionEvent>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            events,
        })
    }
}

impl ExchangeDispatcher for HttpExchange {
    fn dispatch(&mut self, ticket: Ticket, utterance: Utterance) {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let events = self.events.clone();
        debug!(
            "Dispatching exchange #{} ({} bytes, {}ms)",
            ticket,
            utterance.audio.len(),
            utterance.duration_ms
        );

        let spawned = tokio_runtime::spawn(async move {
            let result = post_utterance(&client, &endpoint, utterance).await;
            if events
                .send(SessionEvent::ExchangeFinished { ticket, result })
                .is_err()
            {
                debug!("Session closed before exchange #{} finished", ticket);
            }
        });

        if let Err(e) = spawned {
            warn!("Could not start exchange #{}: {}", ticket, e);
            let _ = self.events.send(SessionEvent::ExchangeFinished {
                ticket,
                result: Err(VoiceError::Exchange(e)),
            });
        }
    }
}

async fn post_utterance(
    client: &reqwest::Client,
    endpoint: &str,
    utterance: Utterance,
) -> Result<ExchangeReply, VoiceError> {
    let request = ExchangeRequest::from(utterance);

    let response = client
        .post(endpoint)
        .json(&request)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                VoiceError::Exchange("request timed out".to_string())
            } else {
                VoiceError::Exchange(format!("request failed: {}", e))
            }
        })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| VoiceError::Exchange(format!("failed to read response: {}", e)))?;

    let reply = parse_response(status.as_u16(), &body)?;
    info!(
        "Exchange succeeded: heard {:?} ({} chars of reply audio)",
        reply.transcription,
        reply.audio.len()
    );
    Ok(reply)
}
