//! HTTP client for the text-generation service.
//!
//! Anthropic is spoken natively through the Messages API. OpenAI and Ollama both go through the
//! OpenAI-compatible chat completions endpoint. The client only moves text; decoding and
//! validation of generated trees stay in the core.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use cartwise_core::config::{LlmConfig, LlmProvider};
use cartwise_core::llm::{GenerationError, GenerationParams, TextGenerator};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, warn};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";
const ERROR_BODY_LIMIT: usize = 500;

pub struct HttpTextGenerator {
    client: reqwest::Client,
    provider: LlmProvider,
    base_url: String,
    api_key: Option<SecretString>,
}

impl HttpTextGenerator {
    /// Builds a client carrying the configured request timeout. Hosted providers need a key.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let requires_key = matches!(config.provider, LlmProvider::Anthropic | LlmProvider::OpenAi);
        let api_key = config.api_key.clone().filter(|key| !key.expose_secret().trim().is_empty());
        if requires_key && api_key.is_none() {
            bail!("llm provider {:?} requires an api key", config.provider);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .context("failed to build http client for text generation")?;

        let base_url = config
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(default_base_url(config.provider))
            .trim_end_matches('/')
            .to_string();

        Ok(Self { client, provider: config.provider, base_url, api_key })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn endpoint(&self) -> String {
        match self.provider {
            LlmProvider::Anthropic => format!("{}/v1/messages", self.base_url),
            LlmProvider::OpenAi | LlmProvider::Ollama => {
                format!("{}/v1/chat/completions", self.base_url)
            }
        }
    }

    async fn post(&self, body: &Value) -> Result<Value, GenerationError> {
        let mut request = self.client.post(self.endpoint()).json(body);
        request = match (self.provider, self.api_key.as_ref()) {
            (LlmProvider::Anthropic, Some(key)) => request
                .header("x-api-key", key.expose_secret())
                .header("anthropic-version", ANTHROPIC_VERSION),
            (LlmProvider::Anthropic, None) => {
                request.header("anthropic-version", ANTHROPIC_VERSION)
            }
            (_, Some(key)) => request.bearer_auth(key.expose_secret()),
            (_, None) => request,
        };

        let response =
            request.send().await.map_err(|error| GenerationError::Transport(error.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return response
                .json::<Value>()
                .await
                .map_err(|error| GenerationError::Transport(error.to_string()));
        }

        let body = response.text().await.unwrap_or_else(|_| "(unreadable body)".to_string());
        Err(GenerationError::Upstream {
            status: status.as_u16(),
            message: body.chars().take(ERROR_BODY_LIMIT).collect(),
        })
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GenerationError> {
        let body = request_body(self.provider, prompt, params);
        debug!(
            event_name = "llm.request",
            provider = ?self.provider,
            model = %params.model,
            prompt_chars = prompt.len(),
            "sending text generation request"
        );

        match self.post(&body).await.and_then(|raw| extract_text(self.provider, &raw)) {
            Ok(text) => Ok(text),
            Err(error) => {
                warn!(
                    event_name = "llm.request_failed",
                    provider = ?self.provider,
                    model = %params.model,
                    error = %error,
                    "text generation request failed"
                );
                Err(error)
            }
        }
    }
}

/// Generation parameters the tree generator should use for this configuration.
pub fn generation_params(config: &LlmConfig) -> GenerationParams {
    GenerationParams {
        model: config.model.clone(),
        max_tokens: config.max_tokens,
        temperature: config.temperature,
    }
}

pub fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::Anthropic => ANTHROPIC_BASE_URL,
        LlmProvider::OpenAi => OPENAI_BASE_URL,
        LlmProvider::Ollama => OLLAMA_BASE_URL,
    }
}

pub fn request_body(provider: LlmProvider, prompt: &str, params: &GenerationParams) -> Value {
    let messages = json!([{ "role": "user", "content": prompt }]);
    match provider {
        LlmProvider::Anthropic => json!({
            "model": params.model,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "messages": messages,
        }),
        LlmProvider::OpenAi | LlmProvider::Ollama => json!({
            "model": params.model,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "stream": false,
            "messages": messages,
        }),
    }
}

/// Pulls the generated text out of a provider response. Anthropic text blocks are joined.
pub fn extract_text(provider: LlmProvider, response: &Value) -> Result<String, GenerationError> {
    let text = match provider {
        LlmProvider::Anthropic => response
            .get("content")
            .and_then(Value::as_array)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                    .filter_map(|block| block.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("")
            }),
        LlmProvider::OpenAi | LlmProvider::Ollama => response
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string),
    };

    text.filter(|text| !text.trim().is_empty()).ok_or(GenerationError::EmptyResponse)
}
