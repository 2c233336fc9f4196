use crate::api::LlmProvider;
use crate::error::ChatError;
use crate::events::{emit, EventSender, UiEvent};
use crate::models::GenerationRequest;
use dashmap::DashMap;
use futures::StreamExt;
use std::time::Instant;
use uuid::Uuid;

/// Lifecycle of one in-flight generation. Terminal states are absorbing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Cancelled
        )
    }
}

/// What a settled session hands back to the scheduler. Elapsed time is
/// measured from session start to the terminal transition, whatever the
/// outcome.
#[derive(Debug)]
pub struct SessionOutcome {
    pub text: String,
    pub elapsed_secs: f64,
    pub state: SessionState,
}

/// Wraps one in-flight generation: owns the accumulation buffer, emits
/// per-chunk events, measures wall-clock duration, and honors cooperative
/// cancellation via the shared map (checked between received chunks).
pub struct StreamSession {
    pub id: Uuid,
    request: GenerationRequest,
    speaker: String,
    accumulated: String,
    started_at: Instant,
    state: SessionState,
}

impl StreamSession {
    pub fn new(request: GenerationRequest, speaker: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            speaker: speaker.into(),
            accumulated: String::new(),
            started_at: Instant::now(),
            state: SessionState::Pending,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the session to a terminal state, folding every delta into the
    /// accumulation buffer in arrival order and mirroring it to the shell.
    ///
    /// A failure at any point ends up in the buffer as `"Error: <details>"`
    /// text so it is visible in-line rather than unwinding the scheduler.
    pub async fn run(
        mut self,
        provider: &dyn LlmProvider,
        credential: &str,
        cancelled: &DashMap<Uuid, bool>,
        tx: &EventSender,
    ) -> SessionOutcome {
        self.drive(provider, credential, cancelled, tx).await;
        // A stop that races the terminal transition leaves its flag
        // unobserved; the entry must not outlive the session either way.
        cancelled.remove(&self.id);
        self.finish()
    }

    async fn drive(
        &mut self,
        provider: &dyn LlmProvider,
        credential: &str,
        cancelled: &DashMap<Uuid, bool>,
        tx: &EventSender,
    ) {
        let mut stream = match provider.stream_request(&self.request, credential).await {
            Ok(stream) => stream,
            Err(e) => return self.fail(&e, tx),
        };

        while let Some(delta_result) = stream.next().await {
            // Cooperative stop: anything still buffered is discarded and no
            // further delta events fire.
            if cancelled.remove(&self.id).is_some() {
                log::warn!("Session {}: cancellation requested, stopping stream", self.id);
                self.state = SessionState::Cancelled;
                return;
            }

            match delta_result {
                Ok(text) => self.push_delta(&text, tx),
                Err(e) if e.is_recoverable() => {
                    // Adapters already skip these, but tolerate one anyway.
                    log::warn!("Session {}: skipping recoverable error: {}", self.id, e);
                }
                Err(e) => return self.fail(&e, tx),
            }
        }

        self.state = SessionState::Completed;
    }

    fn push_delta(&mut self, text: &str, tx: &EventSender) {
        let first = self.state == SessionState::Pending;
        if first {
            self.state = SessionState::Streaming;
        }
        self.accumulated.push_str(text);
        emit(
            tx,
            UiEvent::TextDelta {
                speaker: first.then(|| self.speaker.clone()),
                text: text.to_string(),
                first,
            },
        );
    }

    fn fail(&mut self, error: &ChatError, tx: &EventSender) {
        log::error!("Session {}: {}", self.id, error);
        self.push_delta(&format!("Error: {}", error), tx);
        self.state = SessionState::Failed;
    }

    fn finish(self) -> SessionOutcome {
        debug_assert!(self.state.is_terminal());
        SessionOutcome {
            text: self.accumulated,
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
            state: self.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::DeltaStream;
    use crate::models::{ModelRef, Provider};
    use async_trait::async_trait;
    use futures::stream;

    struct Scripted(Vec<Result<String, String>>);

    #[async_trait]
    impl LlmProvider for Scripted {
        async fn stream_request(
            &self,
            _request: &GenerationRequest,
            _credential: &str,
        ) -> Result<DeltaStream, ChatError> {
            let items: Vec<Result<String, ChatError>> = self
                .0
                .iter()
                .map(|r| r.clone().map_err(ChatError::Provider))
                .collect();
            Ok(Box::pin(stream::iter(items)))
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            model: ModelRef::new(Provider::Ollama, "llama3"),
            prompt: "hi".to_string(),
            max_tokens: 100,
            temperature: 0.5,
        }
    }

    #[tokio::test]
    async fn accumulates_deltas_in_arrival_order() {
        let provider = Scripted(vec![
            Ok("Hel".to_string()),
            Ok("lo ".to_string()),
            Ok("world".to_string()),
        ]);
        let (tx, mut rx) = crate::events::channel();
        let cancelled = DashMap::new();
        let session = StreamSession::new(request(), "llama3");
        let outcome = session.run(&provider, "host", &cancelled, &tx).await;

        assert_eq!(outcome.state, SessionState::Completed);
        assert_eq!(outcome.text, "Hello world");
        assert!(outcome.elapsed_secs >= 0.0);

        let first = rx.try_recv().unwrap();
        assert_eq!(
            first,
            UiEvent::TextDelta {
                speaker: Some("llama3".to_string()),
                text: "Hel".to_string(),
                first: true,
            }
        );
        let second = rx.try_recv().unwrap();
        assert_eq!(
            second,
            UiEvent::TextDelta {
                speaker: None,
                text: "lo ".to_string(),
                first: false,
            }
        );
    }

    #[tokio::test]
    async fn failure_surfaces_as_inline_error_text() {
        let provider = Scripted(vec![
            Ok("partial".to_string()),
            Err("backend overloaded".to_string()),
            Ok("never seen".to_string()),
        ]);
        let (tx, mut rx) = crate::events::channel();
        let cancelled = DashMap::new();
        let outcome = StreamSession::new(request(), "m")
            .run(&provider, "host", &cancelled, &tx)
            .await;

        assert_eq!(outcome.state, SessionState::Failed);
        assert_eq!(
            outcome.text,
            "partialError: provider rejected request: backend overloaded"
        );
        // Both the partial delta and the error text reached the shell
        assert!(matches!(rx.try_recv().unwrap(), UiEvent::TextDelta { first: true, .. }));
        assert!(matches!(rx.try_recv().unwrap(), UiEvent::TextDelta { first: false, .. }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancellation_discards_buffered_deltas() {
        let provider = Scripted(vec![
            Ok("a".to_string()),
            Ok("b".to_string()),
            Ok("c".to_string()),
        ]);
        let (tx, mut rx) = crate::events::channel();
        let cancelled = DashMap::new();
        let session = StreamSession::new(request(), "m");
        // Stop is already flagged when the first buffered chunk arrives
        cancelled.insert(session.id, true);
        let outcome = session.run(&provider, "host", &cancelled, &tx).await;

        assert_eq!(outcome.state, SessionState::Cancelled);
        assert_eq!(outcome.text, "");
        assert!(rx.try_recv().is_err(), "no delta events after cancellation");
        assert!(cancelled.is_empty(), "cancellation flag is consumed");
    }

    #[tokio::test]
    async fn stop_racing_a_closed_stream_still_cleans_up_its_flag() {
        // The stream closes without another chunk, so the flag is never
        // observed mid-loop; the session completes and must still take its
        // entry out of the map.
        let provider = Scripted(vec![]);
        let (tx, _rx) = crate::events::channel();
        let cancelled = DashMap::new();
        let session = StreamSession::new(request(), "m");
        cancelled.insert(session.id, true);
        let outcome = session.run(&provider, "host", &cancelled, &tx).await;

        assert_eq!(outcome.state, SessionState::Completed);
        assert!(cancelled.is_empty(), "stale cancellation entries must not accumulate");
    }

    #[tokio::test]
    async fn open_failure_is_a_failed_session_with_elapsed_time() {
        struct FailsToOpen;
        #[async_trait]
        impl LlmProvider for FailsToOpen {
            async fn stream_request(
                &self,
                _request: &GenerationRequest,
                _credential: &str,
            ) -> Result<DeltaStream, ChatError> {
                Err(ChatError::Provider("status 500: boom".to_string()))
            }
        }
        let (tx, mut rx) = crate::events::channel();
        let cancelled = DashMap::new();
        let outcome = StreamSession::new(request(), "m")
            .run(&FailsToOpen, "host", &cancelled, &tx)
            .await;

        assert_eq!(outcome.state, SessionState::Failed);
        assert_eq!(outcome.text, "Error: provider rejected request: status 500: boom");
        assert!(matches!(
            rx.try_recv().unwrap(),
            UiEvent::TextDelta { first: true, .. }
        ));
    }
}
