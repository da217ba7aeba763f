//! Embedding and text-generation capabilities.
//!
//! The pipeline depends only on [`EmbeddingClient`] and [`GenerationClient`]. Concrete backends
//! talk to a local Ollama runtime or to any OpenAI-compatible endpoint and are chosen once at
//! startup by [`create_embedding_client`] and [`create_generation_client`].

pub mod ollama;
pub mod openai;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use crate::config::{Config, LlmProvider};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by model backends.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Provider was misconfigured or unreachable.
    #[error("Model provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider answered with an error status.
    #[error("Model request failed: {0}")]
    GenerationFailed(String),
    /// Provider response could not be decoded.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// Provider answered successfully but returned nothing usable.
    #[error("Provider returned an empty result")]
    EmptyResponse,
    /// Input text was empty after trimming.
    #[error("Input text is empty")]
    EmptyInput,
}

/// Produces fixed-size embedding vectors.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Dimensionality of every vector returned by [`EmbeddingClient::embed_text`].
    fn embedding_size(&self) -> usize;

    /// Embed a single piece of text.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}

/// Produces text completions from a prompt.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate_text(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Model identifiers and request limits shared by every backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    /// Model used by [`GenerationClient::generate_text`].
    pub generation_model_id: String,
    /// Model used by [`EmbeddingClient::embed_text`].
    pub embedding_model_id: String,
    /// Declared embedding dimensionality.
    pub embedding_size: usize,
    /// Inputs are truncated to this many characters when set.
    pub max_input_characters: Option<usize>,
    /// Completion token limit passed to the backend when set.
    pub max_output_tokens: Option<u32>,
    /// Sampling temperature passed to the backend when set.
    pub temperature: Option<f32>,
}

impl ModelSettings {
    /// Extract the model settings from the process configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            generation_model_id: config.generation_model_id.clone(),
            embedding_model_id: config.embedding_model_id.clone(),
            embedding_size: config.embedding_model_size,
            max_input_characters: config.input_default_max_characters,
            max_output_tokens: config.generation_default_max_tokens,
            temperature: config.generation_default_temperature,
        }
    }

    /// Trim `text` and cut it to `max_input_characters`, rejecting empty input.
    pub fn prepare_input<'a>(&self, text: &'a str) -> Result<&'a str, LlmError> {
        let trimmed = truncate_input(text.trim(), self.max_input_characters);
        if trimmed.is_empty() {
            return Err(LlmError::EmptyInput);
        }
        Ok(trimmed)
    }
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_input(text: &str, max_chars: Option<usize>) -> &str {
    match max_chars {
        Some(limit) => match text.char_indices().nth(limit) {
            Some((offset, _)) => &text[..offset],
            None => text,
        },
        None => text,
    }
}

/// Build the embedding backend selected by `EMBEDDING_BACKEND`.
pub fn create_embedding_client(config: &Config) -> Result<Arc<dyn EmbeddingClient>, LlmError> {
    let settings = ModelSettings::from_config(config);
    if settings.embedding_size == 0 {
        return Err(LlmError::ProviderUnavailable(
            "EMBEDDING_MODEL_SIZE must be greater than zero".into(),
        ));
    }
    tracing::info!(
        backend = ?config.embedding_backend,
        model = %settings.embedding_model_id,
        dimension = settings.embedding_size,
        "Embedding backend selected"
    );
    let client: Arc<dyn EmbeddingClient> = match config.embedding_backend {
        LlmProvider::Ollama => Arc::new(OllamaClient::from_config(config, settings)?),
        LlmProvider::OpenAI => Arc::new(OpenAiClient::from_config(config, settings)?),
    };
    Ok(client)
}

/// Build the generation backend selected by `GENERATION_BACKEND`.
pub fn create_generation_client(config: &Config) -> Result<Arc<dyn GenerationClient>, LlmError> {
    let settings = ModelSettings::from_config(config);
    tracing::info!(
        backend = ?config.generation_backend,
        model = %settings.generation_model_id,
        "Generation backend selected"
    );
    let client: Arc<dyn GenerationClient> = match config.generation_backend {
        LlmProvider::Ollama => Arc::new(OllamaClient::from_config(config, settings)?),
        LlmProvider::OpenAI => Arc::new(OpenAiClient::from_config(config, settings)?),
    };
    Ok(client)
}

pub(crate) fn http_client(user_agent: &str) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .build()
        .map_err(|error| LlmError::ProviderUnavailable(format!("failed to build HTTP client: {error}")))
}

pub(crate) fn join_endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
pub(crate) fn test_settings(max_input_characters: Option<usize>) -> ModelSettings {
    ModelSettings {
        generation_model_id: "gen-model".into(),
        embedding_model_id: "embed-model".into(),
        embedding_size: 3,
        max_input_characters,
        max_output_tokens: Some(64),
        temperature: Some(0.1),
    }
}
