//! LLM invocation service
//!
//! Provides a uniform `LlmClient` seam over text-generation providers.
//! Exactly one provider is targeted per client instance; provider selection
//! is a configuration value, so callers stay provider-agnostic. The client
//! validates and normalizes raw responses but applies no retry policy of its
//! own: retries belong to the caller.

use crate::error::{DigestError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
}

impl LlmProvider {
    /// Default model identifier for this provider
    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "gpt-4o",
            LlmProvider::Anthropic => "claude-sonnet-4-5-20250929",
        }
    }

    /// Environment variable holding this provider's credential
    pub fn api_key_var(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "OPENAI_API_KEY",
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::OpenAi => write!(f, "openai"),
            LlmProvider::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// Configuration for an LLM client instance
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Target provider
    pub provider: LlmProvider,

    /// Model to use
    pub model: String,

    /// API key for the provider
    pub api_key: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Max tokens for completions
    pub max_tokens: u32,
}

impl LlmConfig {
    pub fn new(provider: LlmProvider, api_key: String) -> Self {
        Self {
            provider,
            model: provider.default_model().to_string(),
            api_key,
            temperature: 0.3,
            max_tokens: 8000,
        }
    }
}

/// Model configuration snapshot for logging and digest metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub provider: LlmProvider,
    pub model: String,
}

/// Uniform invocation seam for text-generation providers.
///
/// Implementations suspend on network I/O and surface normalized errors;
/// tests inject scripted fakes at this seam.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a completion from system and user prompt text.
    async fn generate(&self, system_text: &str, user_text: &str) -> Result<String>;

    /// Describe the configured provider and model.
    fn model_info(&self) -> ModelInfo;
}

/// HTTP-backed LLM client for OpenAI and Anthropic
pub struct HttpLlmClient {
    config: LlmConfig,
    client: reqwest::Client,
}

// OpenAI chat completions wire format

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

// Anthropic messages wire format

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    system: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    text: Option<String>,
}

impl HttpLlmClient {
    /// Create a new client for the configured provider.
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(DigestError::Config(config::ConfigError::Message(format!(
                "{} not set",
                config.provider.api_key_var()
            ))));
        }

        Ok(Self {
            config,
            client: reqwest::Client::new(),
        })
    }

    async fn generate_openai(&self, system_text: &str, user_text: &str) -> Result<String> {
        let request = OpenAiRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_text.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_text.to_string(),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(OPENAI_ENDPOINT)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.provider_error(e))?;

        let body: OpenAiResponse = self.check_and_decode(response).await?;
        Self::extract_openai(body)
    }

    async fn generate_anthropic(&self, system_text: &str, user_text: &str) -> Result<String> {
        let request = AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            system: system_text.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: user_text.to_string(),
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_ENDPOINT)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| self.provider_error(e))?;

        let body: AnthropicResponse = self.check_and_decode(response).await?;
        Self::extract_anthropic(body)
    }

    /// Surface non-success statuses before attempting to decode a body.
    async fn check_and_decode<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!(
                provider = %self.config.provider,
                status = status.as_u16(),
                %detail,
                "Provider rejected the request"
            );
            return Err(DigestError::ProviderStatus {
                provider: self.config.provider.to_string(),
                status: status.as_u16(),
            });
        }

        response.json::<T>().await.map_err(|e| self.provider_error(e))
    }

    fn provider_error(&self, source: reqwest::Error) -> DigestError {
        // Full cause stays on the error chain; display stays sanitized
        error!(provider = %self.config.provider, cause = %source, "Provider call failed");
        DigestError::Provider {
            provider: self.config.provider.to_string(),
            source,
        }
    }

    fn extract_openai(body: OpenAiResponse) -> Result<String> {
        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| DigestError::EmptyResponse(LlmProvider::OpenAi.to_string()))?;
        choice
            .message
            .content
            .ok_or_else(|| DigestError::NullContent(LlmProvider::OpenAi.to_string()))
    }

    fn extract_anthropic(body: AnthropicResponse) -> Result<String> {
        let block = body
            .content
            .into_iter()
            .next()
            .ok_or_else(|| DigestError::EmptyResponse(LlmProvider::Anthropic.to_string()))?;
        block
            .text
            .ok_or_else(|| DigestError::NullContent(LlmProvider::Anthropic.to_string()))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn generate(&self, system_text: &str, user_text: &str) -> Result<String> {
        debug!(
            provider = %self.config.provider,
            model = %self.config.model,
            system_len = system_text.len(),
            user_len = user_text.len(),
            "Generating completion"
        );

        match self.config.provider {
            LlmProvider::OpenAi => self.generate_openai(system_text, user_text).await,
            LlmProvider::Anthropic => self.generate_anthropic(system_text, user_text).await,
        }
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: self.config.provider,
            model: self.config.model.clone(),
        }
    }
}
