//! Text-model client abstraction.
//!
//! This module defines the `TextModel` trait so the report and insight flows
//! can run against a hosted model in production and a mock in tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::TextModelConfig;
use crate::error::{BarangayError, Result};

/// A single-shot prompt: one system instruction and one user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelPrompt {
    /// Name of the flow issuing the prompt, used for logs and metrics
    pub flow: &'static str,
    pub system: String,
    pub user: String,
}

/// Trait for calling a hosted language model.
///
/// # Errors
/// Returns an error if the call fails at the transport level, times out, or
/// the model answers with a non-success status. There are no retries.
#[async_trait]
pub trait TextModel: Send + Sync {
    /// Send the prompt and return the model's reply text, expected to be a
    /// JSON document.
    async fn complete(&self, prompt: &ModelPrompt) -> Result<String>;
}

// ============================================================================
// Production Implementation using reqwest
// ============================================================================

/// Client for an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct ReqwestTextModel {
    client: reqwest::Client,
    config: TextModelConfig,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl ReqwestTextModel {
    pub fn new(config: TextModelConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl TextModel for ReqwestTextModel {
    #[tracing::instrument(skip(self, prompt), fields(flow = prompt.flow, model = %self.config.model))]
    async fn complete(&self, prompt: &ModelPrompt) -> Result<String> {
        let url = self.url();
        let body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user },
            ],
            "response_format": { "type": "json_object" },
        });

        tracing::debug!(url = %url, timeout_ms = self.config.timeout_ms, "Calling text model");

        let mut req = self
            .client
            .post(&url)
            .timeout(Duration::from_millis(self.config.timeout_ms))
            .json(&body);

        // Only add Authorization header if api_key is not empty
        if !self.config.api_key.is_empty() {
            req = req.bearer_auth(&self.config.api_key);
        }

        let response = req.send().await.map_err(|e| {
            tracing::error!(url = %url, error = %e, "Text model request failed");
            e
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), "Text model returned an error status");
            return Err(BarangayError::TextModel(format!(
                "model endpoint returned {}: {}",
                status.as_u16(),
                text
            )));
        }

        let completion: ChatCompletion = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| BarangayError::TextModel("model returned no content".to_string()))?;

        tracing::info!(response_len = content.len(), "Text model call completed");
        Ok(content)
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

/// Mock text model for testing.
///
/// Replies are returned in FIFO order; every prompt is recorded.
///
/// # Example
/// ```ignore
/// let mock = MockTextModel::new();
/// mock.add_response(Ok(r#"{"analysis": "Most requests are clearances."}"#.to_string()));
/// ```
#[derive(Clone, Default)]
pub struct MockTextModel {
    responses: Arc<Mutex<VecDeque<Result<String>>>>,
    prompts: Arc<Mutex<Vec<ModelPrompt>>>,
}

impl MockTextModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next call.
    pub fn add_response(&self, response: Result<String>) {
        self.responses.lock().push_back(response);
    }

    /// Get all prompts that have been sent to this mock.
    pub fn get_prompts(&self) -> Vec<ModelPrompt> {
        self.prompts.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl TextModel for MockTextModel {
    async fn complete(&self, prompt: &ModelPrompt) -> Result<String> {
        self.prompts.lock().push(prompt.clone());
        self.responses.lock().pop_front().unwrap_or_else(|| {
            Err(BarangayError::TextModel(format!(
                "no mock response configured for flow '{}'",
                prompt.flow
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> ModelPrompt {
        ModelPrompt {
            flow: "test",
            system: "You answer in JSON.".to_string(),
            user: "Say hi".to_string(),
        }
    }

    fn config(endpoint: String) -> TextModelConfig {
        TextModelConfig {
            endpoint,
            model: "test-model".to_string(),
            api_key: "test-key".to_string(),
            timeout_ms: 5000,
        }
    }

    #[tokio::test]
    async fn test_reqwest_model_extracts_message_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(mockito::Matcher::PartialJson(json!({
                "model": "test-model",
                "response_format": { "type": "json_object" }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"{\"analysis\":\"ok\"}"}}]}"#)
            .create_async()
            .await;

        let model = ReqwestTextModel::new(config(server.url()));
        let reply = model.complete(&prompt()).await.unwrap();

        assert_eq!(reply, r#"{"analysis":"ok"}"#);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_reqwest_model_surfaces_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(503)
            .with_body("overloaded")
            .expect(1)
            .create_async()
            .await;

        let model = ReqwestTextModel::new(config(server.url()));
        let err = model.complete(&prompt()).await.unwrap_err();
        match err {
            BarangayError::TextModel(msg) => assert!(msg.contains("503")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mock_returns_queued_responses_in_order() {
        let mock = MockTextModel::new();
        mock.add_response(Ok("first".to_string()));
        mock.add_response(Ok("second".to_string()));

        assert_eq!(mock.complete(&prompt()).await.unwrap(), "first");
        assert_eq!(mock.complete(&prompt()).await.unwrap(), "second");
        assert!(mock.complete(&prompt()).await.is_err());
        assert_eq!(mock.call_count(), 3);
    }
}
