//! Generation backends: a local Ollama server and the hosted Anthropic API.

use async_trait::async_trait;
use mizan_core::config::MizanConfig;
use mizan_core::error::{MizanError, Result};
use mizan_core::traits::Generator;
use mizan_core::types::GenerationOptions;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_API_VERSION: &str = "2023-06-01";

fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| MizanError::config(format!("Failed to build HTTP client: {}", e)))
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Chat completion against Ollama's `/api/chat`.
pub struct OllamaGenerator {
    client: Client,
    host: String,
    model: String,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: i32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

impl OllamaGenerator {
    pub fn new(
        host: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            host: host.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        debug!("Ollama chat request to model {}", self.model);

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &options.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let request = OllamaChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: OllamaOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens as i32,
            },
        };

        let url = format!("{}/api/chat", self.host);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| MizanError::generation(format!("Ollama request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(MizanError::generation(format!("Ollama API error: {}", error_text)));
        }

        let response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| MizanError::generation(format!("Invalid Ollama response: {}", e)))?;
        Ok(response.message.content)
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Claude models through the Anthropic messages API.
pub struct AnthropicGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl AnthropicGenerator {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: ANTHROPIC_API_BASE.to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}

#[async_trait]
impl Generator for AnthropicGenerator {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        debug!("Anthropic messages request to model {}", self.model);

        let request = AnthropicRequest {
            model: &self.model,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            system: options.system_prompt.as_deref(),
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| MizanError::generation(format!("Anthropic request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(MizanError::generation(format!(
                "Anthropic API error {}: {}",
                status, error_text
            )));
        }

        let response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| MizanError::generation(format!("Invalid Anthropic response: {}", e)))?;

        let text: String = response
            .content
            .into_iter()
            .filter(|c| c.kind == "text")
            .map(|c| c.text)
            .collect();
        Ok(text)
    }

    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Which kind of backend a caller prefers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    Local,
    Hosted,
}

impl fmt::Display for BackendPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Hosted => f.write_str("hosted"),
        }
    }
}

impl FromStr for BackendPreference {
    type Err = MizanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "hosted" => Ok(Self::Hosted),
            other => Err(MizanError::invalid_input(format!(
                "unknown backend '{}', expected local or hosted",
                other
            ))),
        }
    }
}

/// Generation backends keyed by preference, with a configured default.
pub struct GeneratorRegistry {
    backends: HashMap<BackendPreference, Arc<dyn Generator>>,
    default: BackendPreference,
}

impl GeneratorRegistry {
    pub fn new(default: BackendPreference) -> Self {
        Self {
            backends: HashMap::new(),
            default,
        }
    }

    pub fn register(
        mut self,
        preference: BackendPreference,
        generator: Arc<dyn Generator>,
    ) -> Self {
        self.backends.insert(preference, generator);
        self
    }

    /// Ollama is always registered; Anthropic only when an API key is set.
    /// A hosted default without a key falls back to the local backend.
    pub fn from_config(config: &MizanConfig) -> Result<Self> {
        let providers = &config.providers;
        let timeout = Duration::from_secs(providers.http_timeout_secs);
        let api_key = providers
            .anthropic_api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty());

        let mut default: BackendPreference = config.generation.default_backend.parse()?;
        if default == BackendPreference::Hosted && api_key.is_none() {
            warn!("Default backend 'hosted' has no Anthropic API key, using 'local'");
            default = BackendPreference::Local;
        }

        let mut registry = Self::new(default).register(
            BackendPreference::Local,
            Arc::new(OllamaGenerator::new(
                providers.ollama_url.clone(),
                providers.ollama_model.clone(),
                timeout,
            )?),
        );

        if let Some(api_key) = api_key {
            registry = registry.register(
                BackendPreference::Hosted,
                Arc::new(AnthropicGenerator::new(
                    api_key,
                    providers.anthropic_model.clone(),
                    timeout,
                )?),
            );
        }

        info!("Generation backends: {:?} (default {})", registry.available(), default);
        Ok(registry)
    }

    pub fn default_preference(&self) -> BackendPreference {
        self.default
    }

    pub fn available(&self) -> Vec<BackendPreference> {
        let mut available: Vec<_> = self.backends.keys().copied().collect();
        available.sort_by_key(|p| *p as u8);
        available
    }

    /// Backend for `preference`, falling back to the default.
    pub fn select(&self, preference: Option<BackendPreference>) -> Result<Arc<dyn Generator>> {
        if let Some(preference) = preference {
            if let Some(generator) = self.backends.get(&preference) {
                return Ok(generator.clone());
            }
            warn!(
                "Backend '{}' is not configured, using default '{}'",
                preference, self.default
            );
        }

        self.backends
            .get(&self.default)
            .cloned()
            .ok_or_else(|| {
                MizanError::config(format!("default backend '{}' is not configured", self.default))
            })
    }
}
