//! OpenAI-compatible backend (`/embeddings` and `/chat/completions`).

use super::{EmbeddingClient, GenerationClient, LlmError, ModelSettings, http_client, join_endpoint};
use crate::config::Config;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Client for OpenAI or any server exposing the same REST surface.
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    settings: ModelSettings,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    /// Create a client for `base_url`, authenticating with `api_key` when present.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        settings: ModelSettings,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            http: http_client("docrag/openai")?,
            base_url: base_url.into(),
            api_key: api_key.filter(|key| !key.is_empty()),
            settings,
        })
    }

    /// Create a client from `OPENAI_API_URL` and `OPENAI_API_KEY`.
    ///
    /// The public endpoint requires a key; self-hosted compatible servers may not.
    pub fn from_config(config: &Config, settings: ModelSettings) -> Result<Self, LlmError> {
        let base_url = config
            .openai_api_url
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string());
        if config.openai_api_url.is_none() && config.openai_api_key.is_none() {
            return Err(LlmError::ProviderUnavailable(
                "OPENAI_API_KEY is required for the public OpenAI endpoint".into(),
            ));
        }
        Self::new(base_url, config.openai_api_key.clone(), settings)
    }

    async fn post(&self, path: &str, payload: &Value) -> Result<reqwest::Response, LlmError> {
        let mut request = self
            .http
            .post(join_endpoint(&self.base_url, path))
            .json(payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|error| {
            LlmError::ProviderUnavailable(format!(
                "failed to reach {}: {error}",
                self.base_url
            ))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::GenerationFailed(format!(
                "provider returned {status}: {body}"
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiClient {
    fn embedding_size(&self) -> usize {
        self.settings.embedding_size
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let input = self.settings.prepare_input(text)?;
        let payload = json!({
            "model": self.settings.embedding_model_id,
            "input": input,
        });

        let body: EmbeddingResponse = self
            .post("embeddings", &payload)
            .await?
            .json()
            .await
            .map_err(|error| {
                LlmError::InvalidResponse(format!("failed to decode embedding response: {error}"))
            })?;

        body.data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .filter(|vector| !vector.is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

#[async_trait]
impl GenerationClient for OpenAiClient {
    async fn generate_text(&self, prompt: &str) -> Result<String, LlmError> {
        let prompt = self.settings.prepare_input(prompt)?;
        let mut payload = json!({
            "model": self.settings.generation_model_id,
            "messages": [ { "role": "user", "content": prompt } ],
        });
        if let Some(obj) = payload.as_object_mut() {
            if let Some(max_tokens) = self.settings.max_output_tokens {
                obj.insert("max_tokens".into(), json!(max_tokens));
            }
            if let Some(temperature) = self.settings.temperature {
                obj.insert("temperature".into(), json!(temperature));
            }
        }

        let body: ChatResponse = self
            .post("chat/completions", &payload)
            .await?
            .json()
            .await
            .map_err(|error| {
                LlmError::InvalidResponse(format!("failed to decode completion: {error}"))
            })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::test_settings;
    use httpmock::{Method::POST, MockServer};

    fn client(server: &MockServer) -> OpenAiClient {
        OpenAiClient::new(
            server.url("/v1"),
            Some("sk-test".into()),
            test_settings(None),
        )
        .expect("client")
    }

    #[tokio::test]
    async fn embeds_with_bearer_key() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/embeddings")
                    .header("authorization", "Bearer sk-test")
                    .json_body(json!({ "model": "embed-model", "input": "dogs" }));
                then.status(200).json_body(json!({
                    "object": "list",
                    "data": [ { "object": "embedding", "index": 0, "embedding": [0.5, 0.5, 0.0] } ]
                }));
            })
            .await;

        let vector = client(&server).embed_text("dogs").await.expect("embedding");
        mock.assert_async().await;
        assert_eq!(vector, vec![0.5, 0.5, 0.0]);
    }

    #[tokio::test]
    async fn completes_chat_prompt() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions").json_body_includes(
                    r#"{ "model": "gen-model", "max_tokens": 64, "messages": [ { "role": "user", "content": "Say hi" } ] }"#,
                );
                then.status(200).json_body(json!({
                    "choices": [ { "index": 0, "message": { "role": "assistant", "content": " hi " } } ]
                }));
            })
            .await;

        let answer = client(&server).generate_text("Say hi").await.expect("answer");
        mock.assert_async().await;
        assert_eq!(answer, "hi");
    }

    #[tokio::test]
    async fn empty_choices_are_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let error = client(&server).generate_text("prompt").await.unwrap_err();
        assert!(matches!(error, LlmError::EmptyResponse));
    }

    #[tokio::test]
    async fn unauthorized_status_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(401).body("invalid api key");
            })
            .await;

        let error = client(&server).embed_text("text").await.unwrap_err();
        match error {
            LlmError::GenerationFailed(message) => assert!(message.contains("401")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
