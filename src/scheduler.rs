use crate::config::ProviderCredentials;
use crate::error::ChatError;
use crate::events::{channel, emit, EventReceiver, UiEvent};
use crate::models::{CollabSettings, GenerationRequest, Message, ModelRef, Provider};
use crate::roles::{role_prompt, CHAIN_OF_THOUGHT_SCAFFOLD, COLLABORATION_SYSTEM_PROMPT};
use crate::session::{SessionOutcome, SessionState, StreamSession};
use crate::state::{EngineState, ProviderRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Scheduler position. `CollabRunning` means a background task is driving
/// turns; everything else is quiescent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Idle,
    AwaitingUserInput,
    CollabRunning,
    Stopped,
}

#[derive(Clone, Debug)]
struct Participant {
    model: ModelRef,
    role: String,
    // Resolved once at collaboration start so a turn never blocks on config
    credential: String,
}

struct SchedulerInner {
    state: SchedulerState,
    participants: Option<Vec<Participant>>,
    /// Settings snapshot for the active run; live settings changes apply to
    /// the next run only.
    run_settings: CollabSettings,
    round: u32,
    index: usize,
    active_session: Option<Uuid>,
    stop_requested: bool,
    // Single-model mode selection
    selected_model: Option<ModelRef>,
    selected_role: String,
    chain_of_thought: bool,
}

impl Default for SchedulerInner {
    fn default() -> Self {
        Self {
            state: SchedulerState::Idle,
            participants: None,
            run_settings: CollabSettings::default(),
            round: 1,
            index: 0,
            active_session: None,
            stop_requested: false,
            selected_model: None,
            selected_role: "General Assistant".to_string(),
            chain_of_thought: false,
        }
    }
}

/// The collaboration engine: owns the transcript, telemetry and scheduler
/// position, and drives at most one streaming session at a time. All shell
/// inputs are methods here; all shell outputs arrive on the event channel
/// handed out by [`ChatEngine::new`].
#[derive(Clone)]
pub struct ChatEngine {
    state: EngineState,
    scheduler: Arc<Mutex<SchedulerInner>>,
}

impl ChatEngine {
    pub fn new(credentials: ProviderCredentials) -> (Self, EventReceiver) {
        Self::with_providers(credentials, ProviderRegistry::new())
    }

    /// Constructor with an explicit provider registry, used by tests to
    /// substitute scripted backends.
    pub fn with_providers(
        credentials: ProviderCredentials,
        providers: ProviderRegistry,
    ) -> (Self, EventReceiver) {
        let (tx, rx) = channel();
        let engine = Self {
            state: EngineState::new(credentials, providers, tx),
            scheduler: Arc::new(Mutex::new(SchedulerInner::default())),
        };
        (engine, rx)
    }

    pub async fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.lock().await.state
    }

    // --- single-model selection, mirroring the provider/model/role pickers ---

    pub async fn select_model(&self, model: ModelRef) {
        let mut sched = self.scheduler.lock().await;
        sched.selected_model = Some(model);
        if sched.state == SchedulerState::Idle {
            sched.state = SchedulerState::AwaitingUserInput;
        }
    }

    pub async fn set_role(&self, role: impl Into<String>) {
        self.scheduler.lock().await.selected_role = role.into();
    }

    pub async fn set_chain_of_thought(&self, enabled: bool) {
        self.scheduler.lock().await.chain_of_thought = enabled;
    }

    // --- shell inputs ---

    /// Replace the stored collaboration settings. An active run keeps the
    /// snapshot it started with.
    pub async fn update_settings(&self, settings: CollabSettings) {
        *self.state.settings.lock().await = settings;
    }

    pub async fn update_credentials(&self, credentials: ProviderCredentials) {
        *self.state.credentials.lock().await = credentials;
        self.refresh_models().await;
    }

    /// Fetch (or re-fetch) the per-provider model lists. Fetch failures are
    /// surfaced as error events, never returned.
    pub async fn refresh_models(&self) -> HashMap<Provider, Vec<String>> {
        let credentials = self.state.credentials.lock().await.clone();
        let mut catalog = self.state.catalog.lock().await;
        for warning in catalog.refresh(&credentials).await {
            emit(&self.state.events, UiEvent::Error(warning));
        }
        Provider::ALL
            .into_iter()
            .filter_map(|p| {
                let models = catalog.models(p);
                (!models.is_empty()).then(|| (p, models.to_vec()))
            })
            .collect()
    }

    /// Empties the transcript. The response-time log is left untouched; it
    /// has its own `clear` on the telemetry handle.
    pub async fn clear_conversation(&self) {
        self.state.conversation.lock().await.clear();
        log::info!("Conversation cleared");
    }

    pub async fn clear_telemetry(&self) {
        self.state.telemetry.lock().await.clear();
    }

    pub async fn transcript(&self) -> Vec<Message> {
        self.state.conversation.lock().await.messages().to_vec()
    }

    pub async fn response_times(&self) -> HashMap<String, Vec<f64>> {
        self.state.telemetry.lock().await.snapshot()
    }

    /// User pressed send. In single-model mode this schedules one turn; with
    /// a collaboration configured it appends the user turn and restarts the
    /// round loop from round 1.
    pub async fn submit_user_message(&self, text: &str) -> Result<(), ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        {
            let sched = self.scheduler.lock().await;
            if sched.state == SchedulerState::CollabRunning || sched.active_session.is_some() {
                let msg = "A generation is already in progress.".to_string();
                emit(&self.state.events, UiEvent::Error(msg.clone()));
                return Err(ChatError::Configuration(msg));
            }
        }

        let mut sched = self.scheduler.lock().await;
        if sched.participants.is_some() {
            self.state.conversation.lock().await.append_user(text);
            // Collaboration turn order restarts; roles and limits come from
            // the freshest stored settings.
            let settings = self.state.settings.lock().await.clone();
            if let Some(participants) = sched.participants.as_mut() {
                participants[0].role = settings.model1_role.clone();
                participants[1].role = settings.model2_role.clone();
            }
            sched.run_settings = settings;
            sched.round = 1;
            sched.index = 0;
            sched.stop_requested = false;
            sched.state = SchedulerState::CollabRunning;
            drop(sched);

            let engine = self.clone();
            tokio::spawn(async move { engine.run_collab_loop().await });
            return Ok(());
        }

        let Some(model) = sched.selected_model.clone() else {
            let msg = "Please select a provider and model.".to_string();
            emit(&self.state.events, UiEvent::Error(msg.clone()));
            return Err(ChatError::Configuration(msg));
        };
        let credential = {
            let creds = self.state.credentials.lock().await;
            match creds.credential_for(model.provider) {
                Ok(c) => c,
                Err(e) => {
                    emit(&self.state.events, UiEvent::Error(e.to_string()));
                    return Err(e);
                }
            }
        };

        self.state.conversation.lock().await.append_user(text);

        let settings = self.state.settings.lock().await.clone();
        let mut prompt = format!("{}\n{}", role_prompt(&sched.selected_role), text);
        if sched.chain_of_thought {
            prompt.push_str(CHAIN_OF_THOUGHT_SCAFFOLD);
        }
        let request = GenerationRequest {
            model,
            prompt,
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        };
        sched.stop_requested = false;
        sched.state = SchedulerState::AwaitingUserInput;
        drop(sched);

        let engine = self.clone();
        tokio::spawn(async move { engine.run_single_turn(request, credential).await });
        Ok(())
    }

    /// Validate both participants, reset the transcript, inject the
    /// collaboration system message and start the round loop.
    pub async fn start_collaboration(
        &self,
        model1: ModelRef,
        model2: ModelRef,
        settings: CollabSettings,
    ) -> Result<(), ChatError> {
        let (credential1, credential2) = {
            let creds = self.state.credentials.lock().await;
            let resolve = |model: &ModelRef| {
                creds.credential_for(model.provider).map_err(|e| {
                    emit(&self.state.events, UiEvent::Error(e.to_string()));
                    e
                })
            };
            (resolve(&model1)?, resolve(&model2)?)
        };

        {
            let mut sched = self.scheduler.lock().await;
            if sched.state == SchedulerState::CollabRunning || sched.active_session.is_some() {
                let msg = "A collaboration is already running.".to_string();
                emit(&self.state.events, UiEvent::Error(msg.clone()));
                return Err(ChatError::Configuration(msg));
            }
            sched.participants = Some(vec![
                Participant {
                    model: model1,
                    role: settings.model1_role.clone(),
                    credential: credential1,
                },
                Participant {
                    model: model2,
                    role: settings.model2_role.clone(),
                    credential: credential2,
                },
            ]);
            sched.run_settings = settings;
            sched.round = 1;
            sched.index = 0;
            sched.stop_requested = false;
            sched.state = SchedulerState::CollabRunning;
        }

        {
            let mut convo = self.state.conversation.lock().await;
            convo.clear();
            convo.append_system(COLLABORATION_SYSTEM_PROMPT);
        }
        log::info!("Collaboration started");

        let engine = self.clone();
        tokio::spawn(async move { engine.run_collab_loop().await });
        Ok(())
    }

    /// Cooperative stop: cancels the in-flight session (if any) and halts
    /// auto-continuation. The notice goes out here, at request time, never
    /// from the worker; a hung stream must not delay user feedback. Deltas
    /// still buffered on the wire are discarded.
    pub async fn stop(&self) {
        let mut sched = self.scheduler.lock().await;
        // A worker left running clears the flag once it settles
        sched.stop_requested =
            sched.active_session.is_some() || sched.state == SchedulerState::CollabRunning;
        sched.state = SchedulerState::Stopped;
        if let Some(id) = sched.active_session {
            log::warn!("Stop requested; cancelling session {}", id);
            self.state.cancelled_streams.insert(id, true);
        }
        drop(sched);
        emit(&self.state.events, UiEvent::CollaborationStopped);
        log::info!("Collaboration stopped");
    }

    // --- turn execution (one worker at a time, by construction) ---

    async fn run_single_turn(&self, request: GenerationRequest, credential: String) {
        let speaker = request.model.display_name().to_string();
        let provider = self.state.providers.get(request.model.provider);
        let session = StreamSession::new(request, &speaker);
        self.scheduler.lock().await.active_session = Some(session.id);

        let outcome = session
            .run(
                provider.as_ref(),
                &credential,
                &self.state.cancelled_streams,
                &self.state.events,
            )
            .await;

        self.scheduler.lock().await.active_session = None;
        self.fold_outcome(&speaker, outcome).await;
        // A stop can race the final chunk: the session then settles as
        // completed without ever observing its flag, and the settle falls
        // to us. The notice itself already went out from `stop`.
        let mut sched = self.scheduler.lock().await;
        if sched.stop_requested {
            sched.stop_requested = false;
            sched.state = SchedulerState::Stopped;
        }
    }

    async fn run_collab_loop(&self) {
        loop {
            let turn = {
                let sched = self.scheduler.lock().await;
                if sched.stop_requested {
                    None
                } else {
                    let participants = sched
                        .participants
                        .as_ref()
                        .expect("collab loop runs only with participants set");
                    Some((
                        participants[sched.index].clone(),
                        sched.run_settings.clone(),
                        participants.len(),
                    ))
                }
            };
            let Some((participant, settings, participant_count)) = turn else {
                self.settle_stop().await;
                return;
            };

            let history = self.state.conversation.lock().await.format_for_prompt();
            let request = GenerationRequest {
                model: participant.model.clone(),
                prompt: format!("{}\n{}", role_prompt(&participant.role), history),
                max_tokens: settings.max_tokens,
                temperature: settings.temperature,
            };
            let speaker = participant.model.display_name().to_string();
            let provider = self.state.providers.get(participant.model.provider);

            let session = StreamSession::new(request, &speaker);
            self.scheduler.lock().await.active_session = Some(session.id);
            let outcome = session
                .run(
                    provider.as_ref(),
                    &participant.credential,
                    &self.state.cancelled_streams,
                    &self.state.events,
                )
                .await;
            self.scheduler.lock().await.active_session = None;

            // A failed turn is folded like a completed one (error text as
            // the response) so the collaboration advances instead of
            // deadlocking.
            let terminal = self.fold_outcome(&speaker, outcome).await;
            if terminal == SessionState::Cancelled {
                self.settle_stop().await;
                return;
            }

            let mut sched = self.scheduler.lock().await;
            if sched.stop_requested {
                drop(sched);
                self.settle_stop().await;
                return;
            }
            sched.index += 1;
            if sched.index == participant_count {
                let round = sched.round;
                emit(&self.state.events, UiEvent::RoundCompleted { round });
                log::info!("Collaboration round {} finished", round);
                let budget = sched.run_settings.rounds;
                if budget == 0 || sched.round < budget {
                    sched.round += 1;
                    sched.index = 0;
                } else {
                    sched.state = SchedulerState::Stopped;
                    drop(sched);
                    emit(&self.state.events, UiEvent::CollaborationStopped);
                    return;
                }
            }
        }
    }

    /// Fold a settled session into the shared state. Elapsed time is always
    /// recorded; the transcript and turn events are skipped for a cancelled
    /// session since its partial output is discarded.
    async fn fold_outcome(&self, speaker: &str, outcome: SessionOutcome) -> SessionState {
        self.state
            .telemetry
            .lock()
            .await
            .record(speaker, outcome.elapsed_secs);
        if outcome.state == SessionState::Cancelled {
            return outcome.state;
        }

        self.state
            .conversation
            .lock()
            .await
            .append_assistant(speaker, &outcome.text);
        emit(
            &self.state.events,
            UiEvent::TurnCompleted {
                model: speaker.to_string(),
                elapsed_secs: outcome.elapsed_secs,
            },
        );
        let snapshot = self.state.telemetry.lock().await.snapshot();
        emit(&self.state.events, UiEvent::ResponseTimes(snapshot));
        outcome.state
    }

    /// Settle scheduler bookkeeping after a stop. The notice already went
    /// out from [`ChatEngine::stop`]; emitting it again here would double
    /// the acknowledgment.
    async fn settle_stop(&self) {
        let mut sched = self.scheduler.lock().await;
        sched.state = SchedulerState::Stopped;
        sched.stop_requested = false;
        log::info!("Collaboration worker settled after stop");
    }
}
