//! Scripted provider backends and event helpers shared by the integration
//! tests. Nothing here touches the network.
#![allow(dead_code)] // each test binary uses a different subset

use async_trait::async_trait;
use collabchat::api::{DeltaStream, LlmProvider};
use collabchat::error::ChatError;
use collabchat::models::GenerationRequest;
use collabchat::{EventReceiver, ProviderCredentials, UiEvent};
use futures::stream;
use std::time::Duration;
use tokio::time::timeout;

/// Replays a fixed script of deltas, with a small pause before the stream
/// opens so tests can interleave stop requests deterministically enough.
pub struct ScriptedProvider {
    deltas: Vec<Result<String, String>>,
    delay: Duration,
}

impl ScriptedProvider {
    pub fn ok(deltas: &[&str]) -> Self {
        Self {
            deltas: deltas.iter().map(|d| Ok(d.to_string())).collect(),
            delay: Duration::from_millis(5),
        }
    }

    pub fn failing_after(deltas: &[&str], error: &str) -> Self {
        let mut script: Vec<Result<String, String>> =
            deltas.iter().map(|d| Ok(d.to_string())).collect();
        script.push(Err(error.to_string()));
        Self {
            deltas: script,
            delay: Duration::from_millis(5),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn stream_request(
        &self,
        _request: &GenerationRequest,
        _credential: &str,
    ) -> Result<DeltaStream, ChatError> {
        tokio::time::sleep(self.delay).await;
        let items: Vec<Result<String, ChatError>> = self
            .deltas
            .iter()
            .map(|r| r.clone().map_err(ChatError::Provider))
            .collect();
        Ok(Box::pin(stream::iter(items)))
    }
}

pub fn ollama_credentials() -> ProviderCredentials {
    ProviderCredentials {
        ollama_host: Some("localhost".to_string()),
        ..Default::default()
    }
}

pub async fn next_event(rx: &mut EventReceiver) -> UiEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Drain events until the collaboration reports stopped, returning
/// everything seen up to and including that event.
pub async fn collect_until_stopped(rx: &mut EventReceiver) -> Vec<UiEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(rx).await;
        let done = event == UiEvent::CollaborationStopped;
        events.push(event);
        if done {
            return events;
        }
    }
}

pub fn turn_completions(events: &[UiEvent]) -> Vec<(String, f64)> {
    events
        .iter()
        .filter_map(|e| match e {
            UiEvent::TurnCompleted { model, elapsed_secs } => {
                Some((model.clone(), *elapsed_secs))
            }
            _ => None,
        })
        .collect()
}

pub fn completed_rounds(events: &[UiEvent]) -> Vec<u32> {
    events
        .iter()
        .filter_map(|e| match e {
            UiEvent::RoundCompleted { round } => Some(*round),
            _ => None,
        })
        .collect()
}
