use crate::api::{AnthropicProvider, GroqProvider, LlmProvider, OllamaProvider, OpenAiProvider};
use crate::catalog::ModelCatalog;
use crate::config::ProviderCredentials;
use crate::conversation::ConversationState;
use crate::events::EventSender;
use crate::models::{CollabSettings, Provider};
use crate::telemetry::ResponseTimeLog;
use dashmap::DashMap;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// One client per backend, behind the common [`LlmProvider`] trait. Tests
/// swap individual entries for scripted adapters.
#[derive(Clone)]
pub struct ProviderRegistry {
    client: Client,
    providers: HashMap<Provider, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    /// The real four backends, sharing one HTTP client.
    pub fn new() -> Self {
        let client = Client::new();
        let mut providers: HashMap<Provider, Arc<dyn LlmProvider>> = HashMap::new();
        providers.insert(Provider::OpenAi, Arc::new(OpenAiProvider::new(client.clone())));
        providers.insert(Provider::Anthropic, Arc::new(AnthropicProvider::new(client.clone())));
        providers.insert(Provider::Groq, Arc::new(GroqProvider::new(client.clone())));
        providers.insert(Provider::Ollama, Arc::new(OllamaProvider::new(client.clone())));
        Self { client, providers }
    }

    /// The client the adapters share; the model catalog reuses it so the
    /// process holds a single connection pool.
    pub fn http_client(&self) -> Client {
        self.client.clone()
    }

    pub fn set(&mut self, provider: Provider, client: Arc<dyn LlmProvider>) {
        self.providers.insert(provider, client);
    }

    pub fn get(&self, provider: Provider) -> Arc<dyn LlmProvider> {
        Arc::clone(
            self.providers
                .get(&provider)
                .expect("registry is constructed with every provider present"),
        )
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// Shared engine state, cloned into every background task. The one-worker
// invariant keeps mutation effectively single-threaded; the mutexes only
// satisfy the borrow rules across task boundaries.
#[derive(Clone)]
pub struct EngineState {
    pub conversation: Arc<Mutex<ConversationState>>,
    pub telemetry: Arc<Mutex<ResponseTimeLog>>,
    pub credentials: Arc<Mutex<ProviderCredentials>>,
    pub settings: Arc<Mutex<CollabSettings>>,
    pub providers: ProviderRegistry,
    pub catalog: Arc<Mutex<ModelCatalog>>,
    pub cancelled_streams: Arc<DashMap<Uuid, bool>>,
    pub events: EventSender,
}

impl EngineState {
    pub fn new(
        credentials: ProviderCredentials,
        providers: ProviderRegistry,
        events: EventSender,
    ) -> Self {
        Self {
            conversation: Arc::new(Mutex::new(ConversationState::new())),
            telemetry: Arc::new(Mutex::new(ResponseTimeLog::new())),
            credentials: Arc::new(Mutex::new(credentials)),
            settings: Arc::new(Mutex::new(CollabSettings::default())),
            catalog: Arc::new(Mutex::new(ModelCatalog::new(providers.http_client()))),
            providers,
            cancelled_streams: Arc::new(DashMap::new()),
            events,
        }
    }
}
