use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self { model: "default".to_string(), max_tokens: 2_000, temperature: 0.3 }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("text generation request failed: {0}")]
    Transport(String),
    #[error("text generation service returned status {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("text generation response had no text content")]
    EmptyResponse,
}

/// General-purpose text-generation service. Output is free text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GenerationError>;
}

/// Replays fixed responses in order, repeating the last one. Records prompts and call count.
#[derive(Debug, Default)]
pub struct CannedTextGenerator {
    responses: Vec<Result<String, GenerationError>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl CannedTextGenerator {
    pub fn new(response: impl Into<String>) -> Self {
        Self::sequence(vec![Ok(response.into())])
    }

    pub fn failing(error: GenerationError) -> Self {
        Self::sequence(vec![Err(error)])
    }

    pub fn sequence(responses: Vec<Result<String, GenerationError>>) -> Self {
        Self { responses, calls: AtomicUsize::new(0), prompts: Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        match self.prompts.lock() {
            Ok(prompts) => prompts.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl TextGenerator for CannedTextGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _params: &GenerationParams,
    ) -> Result<String, GenerationError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.prompts.lock() {
            Ok(mut prompts) => prompts.push(prompt.to_string()),
            Err(poisoned) => poisoned.into_inner().push(prompt.to_string()),
        }
        match self.responses.get(index).or_else(|| self.responses.last()) {
            Some(response) => response.clone(),
            None => Err(GenerationError::EmptyResponse),
        }
    }
}
