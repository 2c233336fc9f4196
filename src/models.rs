use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Who produced a transcript entry.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

// Represents a single message in the conversation transcript
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    #[serde(default = "Uuid::new_v4")] // Generate a new UUID if missing during deserialization
    pub id: Uuid,
    pub role: ChatRole,
    pub content: String,
    // Display name of the model that spoke, for assistant turns only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            speaker: None,
            timestamp: Utc::now(),
        }
    }
}

/// The four supported streaming backends.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Groq,
    Ollama,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::OpenAi,
        Provider::Anthropic,
        Provider::Groq,
        Provider::Ollama,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OpenAI",
            Provider::Anthropic => "Anthropic",
            Provider::Groq => "Groq",
            Provider::Ollama => "Ollama",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Identifies one generation target: a backend plus a model id on it
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ModelRef {
    pub provider: Provider,
    pub model_id: String,
}

impl ModelRef {
    pub fn new(provider: Provider, model_id: impl Into<String>) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
        }
    }

    /// Short name shown in the transcript and telemetry, without the
    /// provider prefix.
    pub fn display_name(&self) -> &str {
        &self.model_id
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.model_id)
    }
}

/// One turn's generation parameters. Built per turn, immutable, discarded
/// once the session has settled.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    pub model: ModelRef,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

// Snapshot of collaboration configuration. A running collaboration keeps the
// snapshot it started with; updates apply to the next run.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CollabSettings {
    /// Number of interaction rounds; 0 means unbounded.
    pub rounds: u32,
    pub max_tokens: u32,
    pub temperature: f32,
    pub model1_role: String,
    pub model2_role: String,
}

impl Default for CollabSettings {
    fn default() -> Self {
        Self {
            rounds: 0,
            max_tokens: 1000,
            temperature: 0.7,
            model1_role: "General Assistant".to_string(),
            model2_role: "Technical Expert".to_string(),
        }
    }
}
