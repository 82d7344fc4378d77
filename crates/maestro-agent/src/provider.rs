use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use maestro_core::config::ProvidersConfig;
use maestro_core::engines::{EngineSpec, ProviderKind};

/// Tool definition sent to the LLM API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// A tool call extracted from the LLM response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Request to an LLM provider.
///
/// `messages` is the canonical history: a list of `{role, content}` objects
/// where content is either a plain string or an Anthropic-shaped block list
/// (`text` / `tool_use` / `tool_result` / `image`). Each driver translates
/// this into its own wire format.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<serde_json::Value>,
    pub max_tokens: u32,
    pub tools: Vec<ToolDefinition>,
}

/// Response from an LLM provider.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    /// Canonicalized: `"tool_use"` whenever the model requested tools,
    /// regardless of the provider's native finish-reason vocabulary.
    pub stop_reason: String,
    pub tool_calls: Vec<ToolCall>,
}

/// Common interface for the three LLM drivers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging and error messages.
    fn name(&self) -> &str;

    /// Whether tool results may carry inline images. Only the Anthropic
    /// wire format allows this; the other drivers substitute a textual
    /// placeholder.
    fn supports_image_results(&self) -> bool {
        false
    }

    /// Send one chat request and wait for the full response.
    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

/// Shared reqwest client with the per-call timeout applied.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// Construct the driver for an engine from the configured credentials.
pub fn build_provider(
    engine: &EngineSpec,
    providers: &ProvidersConfig,
    timeout: Duration,
) -> Result<Box<dyn LlmProvider>, ProviderError> {
    match engine.provider {
        ProviderKind::Anthropic => {
            let cfg = providers.anthropic.as_ref().ok_or_else(|| {
                ProviderError::Unavailable("anthropic API key not configured".into())
            })?;
            Ok(Box::new(crate::anthropic::AnthropicProvider::new(
                cfg.api_key.clone(),
                cfg.base_url.clone(),
                timeout,
            )))
        }
        ProviderKind::OpenAi => {
            let cfg = providers.openai.as_ref().ok_or_else(|| {
                ProviderError::Unavailable("openai API key not configured".into())
            })?;
            Ok(Box::new(crate::openai::OpenAiProvider::new(
                cfg.api_key.clone(),
                cfg.base_url.clone(),
                timeout,
            )))
        }
        ProviderKind::Google => {
            let cfg = providers.google.as_ref().ok_or_else(|| {
                ProviderError::Unavailable("google API key not configured".into())
            })?;
            Ok(Box::new(crate::google::GoogleProvider::new(
                cfg.api_key.clone(),
                cfg.base_url.clone(),
                timeout,
            )))
        }
    }
}

/// Plain-text user message in canonical form.
pub fn user_message(text: &str) -> serde_json::Value {
    serde_json::json!({ "role": "user", "content": text })
}

/// Plain-text assistant message in canonical form.
pub fn assistant_message(text: &str) -> serde_json::Value {
    serde_json::json!({ "role": "assistant", "content": text })
}
