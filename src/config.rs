use crate::error::ChatError;
use crate::models::Provider;
use anyhow::{Context, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};

const KEYRING_SERVICE_PREFIX: &str = "collabchat_api_key";

/// Where to find each provider's credential. A `None` entry means the
/// provider is unconfigured: it is omitted from the model catalog and any
/// attempt to generate against it is blocked before a session starts.
///
/// Key references use the same scheme for every keyed provider:
/// `"env:SOME_VAR"` reads an environment variable, `"keyring"` reads the OS
/// keyring. Ollama needs a reachable host instead of a key.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ProviderCredentials {
    pub openai_key_ref: Option<String>,
    pub anthropic_key_ref: Option<String>,
    pub groq_key_ref: Option<String>,
    pub ollama_host: Option<String>,
}

impl ProviderCredentials {
    /// Credentials taken from conventional environment variables, the
    /// no-configuration default for the terminal shell.
    pub fn from_env() -> Self {
        let env_ref = |var: &str| {
            std::env::var(var)
                .ok()
                .filter(|v| !v.is_empty())
                .map(|_| format!("env:{}", var))
        };
        Self {
            openai_key_ref: env_ref("OPENAI_API_KEY"),
            anthropic_key_ref: env_ref("ANTHROPIC_API_KEY"),
            groq_key_ref: env_ref("GROQ_API_KEY"),
            ollama_host: std::env::var("OLLAMA_HOST").ok().filter(|v| !v.is_empty()),
        }
    }

    pub fn is_configured(&self, provider: Provider) -> bool {
        match provider {
            Provider::OpenAi => self.openai_key_ref.is_some(),
            Provider::Anthropic => self.anthropic_key_ref.is_some(),
            Provider::Groq => self.groq_key_ref.is_some(),
            Provider::Ollama => self.ollama_host.is_some(),
        }
    }

    /// Resolve the credential a provider client needs: an API key for the
    /// keyed backends, the host for Ollama. Fails with `Configuration`
    /// before any network request is made.
    pub fn credential_for(&self, provider: Provider) -> Result<String, ChatError> {
        let missing = || {
            ChatError::Configuration(format!(
                "{} is not configured. Set its API key or host in settings.",
                provider
            ))
        };
        match provider {
            Provider::Ollama => self.ollama_host.clone().ok_or_else(missing),
            Provider::OpenAi | Provider::Anthropic | Provider::Groq => {
                let key_ref = match provider {
                    Provider::OpenAi => &self.openai_key_ref,
                    Provider::Anthropic => &self.anthropic_key_ref,
                    Provider::Groq => &self.groq_key_ref,
                    Provider::Ollama => unreachable!(),
                };
                let key_ref = key_ref.as_deref().ok_or_else(missing)?;
                resolve_key_ref(provider, key_ref)
                    .map_err(|e| ChatError::Configuration(format!("{:#}", e)))
            }
        }
    }
}

/// Dereference an `env:`/`keyring` credential reference.
fn resolve_key_ref(provider: Provider, key_ref: &str) -> Result<String> {
    if let Some(env_var_name) = key_ref.strip_prefix("env:") {
        log::debug!("Retrieving {} API key from environment variable {}", provider, env_var_name);
        return std::env::var(env_var_name).context(format!(
            "Failed to get API key from environment variable '{}'",
            env_var_name
        ));
    }
    if key_ref == "keyring" {
        let service_name = keyring_service(provider);
        let entry = Entry::new(&service_name, provider.name())
            .context("Failed to create keyring entry")?;
        log::debug!("Retrieving API key from keyring for service: {}", service_name);
        return entry.get_password().context(format!(
            "Failed to get API key from keyring for '{}'. Please set it in settings.",
            provider
        ));
    }
    anyhow::bail!("Unsupported api key reference format: {}", key_ref)
}

/// Stores an API key in the OS keyring for the given provider.
pub fn set_api_key_in_keyring(provider: Provider, api_key: &str) -> Result<()> {
    let service_name = keyring_service(provider);
    let entry = Entry::new(&service_name, provider.name())
        .context("Failed to create keyring entry for setting password")?;
    log::info!("Setting API key in keyring for service: {}", service_name);
    entry.set_password(api_key).context(format!(
        "Failed to set API key in keyring for '{}'",
        provider
    ))
}

fn keyring_service(provider: Provider) -> String {
    format!("{}-{}", KEYRING_SERVICE_PREFIX, provider.name().to_lowercase())
}
