use crate::config::ProviderCredentials;
use crate::models::Provider;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;

const GROQ_MODELS_URL: &str = "https://api.groq.com/openai/v1/models";
const OPENAI_MODELS_URL: &str = "https://api.openai.com/v1/models";

// Anthropic ships no list endpoint worth depending on; the catalog is fixed.
const ANTHROPIC_MODELS: [&str; 6] = [
    "claude-3-opus-20240229",
    "claude-3-sonnet-20240229",
    "claude-3-haiku-20240307",
    "claude-2.1",
    "claude-2.0",
    "claude-3-5-sonnet-20240620",
];

#[derive(Deserialize, Debug)]
struct ModelListResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize, Debug)]
struct ModelEntry {
    id: String,
}

#[derive(Deserialize, Debug)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaTag>,
}

#[derive(Deserialize, Debug)]
struct OllamaTag {
    name: String,
}

/// Cached per-provider model lists. Refreshed once at startup and again on
/// credential change; a provider with no configured credential is simply
/// absent from the cache, which calling code treats as "selection disabled".
pub struct ModelCatalog {
    client: Client,
    cache: HashMap<Provider, Vec<String>>,
}

impl ModelCatalog {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            cache: HashMap::new(),
        }
    }

    pub fn models(&self, provider: Provider) -> &[String] {
        self.cache.get(&provider).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn available_providers(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.cache.contains_key(p))
            .collect()
    }

    /// Re-fetch every configured provider's model list. A fetch failure
    /// drops that provider from the cache and is reported back as text for
    /// the status surface; it never fails the refresh as a whole.
    pub async fn refresh(&mut self, credentials: &ProviderCredentials) -> Vec<String> {
        let mut warnings = Vec::new();
        self.cache.clear();

        for provider in Provider::ALL {
            let credential = match credentials.credential_for(provider) {
                Ok(c) => c,
                Err(_) => continue, // unconfigured: omitted, not an error
            };
            match self.fetch(provider, &credential).await {
                Ok(models) => {
                    log::info!("Fetched {} {} models", models.len(), provider);
                    self.cache.insert(provider, models);
                }
                Err(e) => {
                    log::error!("Failed to fetch {} models: {:?}", provider, e);
                    warnings.push(format!("Error fetching {} models: {:#}", provider, e));
                }
            }
        }
        warnings
    }

    async fn fetch(&self, provider: Provider, credential: &str) -> Result<Vec<String>> {
        match provider {
            Provider::Groq => self.fetch_openai_style(GROQ_MODELS_URL, credential, false).await,
            Provider::OpenAi => self.fetch_openai_style(OPENAI_MODELS_URL, credential, true).await,
            Provider::Anthropic => Ok(ANTHROPIC_MODELS.iter().map(|s| s.to_string()).collect()),
            Provider::Ollama => self.fetch_ollama(credential).await,
        }
    }

    async fn fetch_openai_style(
        &self,
        url: &str,
        api_key: &str,
        gpt_only: bool,
    ) -> Result<Vec<String>> {
        let response = self
            .client
            .get(url)
            .bearer_auth(api_key)
            .send()
            .await
            .context("Failed to send model list request")?
            .error_for_status()
            .context("Model list request was rejected")?;
        let listing: ModelListResponse = response
            .json()
            .await
            .context("Failed to parse model list response")?;
        let mut ids: Vec<String> = listing
            .data
            .into_iter()
            .map(|m| m.id)
            .filter(|id| !gpt_only || id.to_lowercase().contains("gpt"))
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn fetch_ollama(&self, host: &str) -> Result<Vec<String>> {
        let url = format!("http://{}:11434/api/tags", host);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to reach Ollama")?
            .error_for_status()
            .context("Ollama tags request was rejected")?;
        let tags: OllamaTagsResponse = response
            .json()
            .await
            .context("Failed to parse Ollama tags response")?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_providers_are_omitted() {
        let catalog = ModelCatalog::new(Client::new());
        assert!(catalog.models(Provider::Groq).is_empty());
        assert!(catalog.available_providers().is_empty());
    }

    #[tokio::test]
    async fn anthropic_catalog_is_static() {
        let mut catalog = ModelCatalog::new(Client::new());
        let credentials = ProviderCredentials {
            anthropic_key_ref: Some("env:COLLABCHAT_CATALOG_TEST_KEY".to_string()),
            ..Default::default()
        };
        std::env::set_var("COLLABCHAT_CATALOG_TEST_KEY", "sk-ant");
        let warnings = catalog.refresh(&credentials).await;
        assert!(warnings.is_empty());
        assert_eq!(catalog.available_providers(), vec![Provider::Anthropic]);
        assert!(catalog
            .models(Provider::Anthropic)
            .contains(&"claude-3-haiku-20240307".to_string()));
    }

    #[test]
    fn model_list_json_shapes_parse() {
        let listing: ModelListResponse =
            serde_json::from_str(r#"{"data":[{"id":"gpt-4o"},{"id":"whisper-1"}]}"#).unwrap();
        assert_eq!(listing.data.len(), 2);

        let tags: OllamaTagsResponse =
            serde_json::from_str(r#"{"models":[{"name":"llama3:latest"}]}"#).unwrap();
        assert_eq!(tags.models[0].name, "llama3:latest");
    }
}
