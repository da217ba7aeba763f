//! Ollama runtime backend for embeddings and generation.

use super::{EmbeddingClient, GenerationClient, LlmError, ModelSettings, http_client, join_endpoint};
use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Client for a local Ollama runtime.
pub struct OllamaClient {
    http: Client,
    base_url: String,
    settings: ModelSettings,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    done: bool,
}

impl OllamaClient {
    /// Create a client for the runtime at `base_url`.
    pub fn new(base_url: impl Into<String>, settings: ModelSettings) -> Result<Self, LlmError> {
        Ok(Self {
            http: http_client("docrag/ollama")?,
            base_url: base_url.into(),
            settings,
        })
    }

    /// Create a client from `OLLAMA_URL`, defaulting to the local runtime.
    pub fn from_config(config: &Config, settings: ModelSettings) -> Result<Self, LlmError> {
        let base_url = config
            .ollama_url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
        Self::new(base_url, settings)
    }

    async fn post(&self, path: &str, payload: &Value) -> Result<reqwest::Response, LlmError> {
        let endpoint = join_endpoint(&self.base_url, path);
        let response = self
            .http
            .post(&endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|error| {
                LlmError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(LlmError::ProviderUnavailable(format!(
                "Ollama endpoint {endpoint} returned 404"
            )));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl EmbeddingClient for OllamaClient {
    fn embedding_size(&self) -> usize {
        self.settings.embedding_size
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let input = self.settings.prepare_input(text)?;
        let payload = json!({
            "model": self.settings.embedding_model_id,
            "input": input,
        });

        let body: EmbedResponse = self
            .post("api/embed", &payload)
            .await?
            .json()
            .await
            .map_err(|error| {
                LlmError::InvalidResponse(format!("failed to decode Ollama embedding: {error}"))
            })?;

        body.embeddings
            .into_iter()
            .next()
            .filter(|vector| !vector.is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

#[async_trait]
impl GenerationClient for OllamaClient {
    async fn generate_text(&self, prompt: &str) -> Result<String, LlmError> {
        let prompt = self.settings.prepare_input(prompt)?;
        let mut options = Map::new();
        if let Some(temperature) = self.settings.temperature {
            options.insert("temperature".into(), json!(temperature));
        }
        if let Some(max_tokens) = self.settings.max_output_tokens {
            options.insert("num_predict".into(), json!(max_tokens));
        }
        let payload = json!({
            "model": self.settings.generation_model_id,
            "prompt": prompt,
            "stream": false,
            "options": options,
        });

        let body: GenerateResponse = self
            .post("api/generate", &payload)
            .await?
            .json()
            .await
            .map_err(|error| {
                LlmError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
            })?;

        if !body.done {
            return Err(LlmError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }
        let text = body.response.trim();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::test_settings;
    use httpmock::{Method::POST, MockServer};

    fn client(server: &MockServer, max_input_characters: Option<usize>) -> OllamaClient {
        OllamaClient::new(server.base_url(), test_settings(max_input_characters)).expect("client")
    }

    #[tokio::test]
    async fn embeds_truncated_input() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/embed")
                    .json_body(json!({ "model": "embed-model", "input": "cats" }));
                then.status(200)
                    .json_body(json!({ "model": "embed-model", "embeddings": [[0.1, 0.2, 0.3]] }));
            })
            .await;

        let vector = client(&server, Some(4))
            .embed_text("  cats are mammals ")
            .await
            .expect("embedding");

        mock.assert_async().await;
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn empty_embedding_list_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(200).json_body(json!({ "embeddings": [] }));
            })
            .await;

        let error = client(&server, None).embed_text("text").await.unwrap_err();
        assert!(matches!(error, LlmError::EmptyResponse));
    }

    #[tokio::test]
    async fn blank_input_never_reaches_the_runtime() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(200).json_body(json!({ "embeddings": [[1.0]] }));
            })
            .await;

        let error = client(&server, None).embed_text("   ").await.unwrap_err();
        assert!(matches!(error, LlmError::EmptyInput));
        mock.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn generates_with_options() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate").json_body_includes(
                    r#"{ "model": "gen-model", "stream": false, "options": { "num_predict": 64 } }"#,
                );
                then.status(200)
                    .json_body(json!({ "response": "  Cats are mammals.\n", "done": true }));
            })
            .await;

        let answer = client(&server, None)
            .generate_text("Question: what is a mammal?")
            .await
            .expect("answer");

        mock.assert_async().await;
        assert_eq!(answer, "Cats are mammals.");
    }

    #[tokio::test]
    async fn error_status_maps_to_generation_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(500).body("model crashed");
            })
            .await;

        let error = client(&server, None).generate_text("prompt").await.unwrap_err();
        match error {
            LlmError::GenerationFailed(message) => assert!(message.contains("model crashed")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_endpoint_is_reported_as_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(404);
            })
            .await;

        let error = client(&server, None).generate_text("prompt").await.unwrap_err();
        assert!(matches!(error, LlmError::ProviderUnavailable(_)));
    }
}
