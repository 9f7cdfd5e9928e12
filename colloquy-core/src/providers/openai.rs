//! OpenAI-compatible chat-completions adapter.
//!
//! Works against any endpoint speaking the `/chat/completions` dialect
//! (OpenAI, OpenRouter, llama.cpp server, vLLM, …) — the host picks the
//! base URL and model name.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::error::{ColloquyError, Result};
use crate::providers::{CompletionRequest, LanguageModel};

/// Chat-completions client with bearer auth and a per-request timeout.
#[derive(Clone)]
pub struct OpenAiCompatLlm {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatLlm {
    /// # Errors
    /// Returns `Transport` if the TLS-backed HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ColloquyError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));

        let body = json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        debug!(model = %request.model, prompt_chars = request.prompt.len(), "LLM request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| ColloquyError::Parse(format!("chat completion body: {e}")))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ColloquyError::Parse("chat completion returned no content".into()))
    }
}

fn classify_send_error(err: reqwest::Error) -> ColloquyError {
    if err.is_timeout() {
        ColloquyError::Transport("LLM request timed out".into())
    } else {
        ColloquyError::Transport(format!("LLM request failed: {err}"))
    }
}

fn status_error(status: StatusCode, body: &str) -> ColloquyError {
    let snippet: String = body.chars().take(200).collect();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ColloquyError::Auth(format!("LLM API rejected credentials ({status})"))
        }
        _ => ColloquyError::Transport(format!("LLM API returned {status}: {snippet}")),
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_a_standard_completion_body() {
        let body = r#"{
            "id": "chatcmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "{\"topic\": \"Tides\"}"},
                 "finish_reason": "stop"}
            ],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5}
        }"#;
        let parsed: ChatCompletion = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("{\"topic\": \"Tides\"}")
        );
    }

    #[test]
    fn auth_statuses_map_to_auth_errors() {
        assert_eq!(status_error(StatusCode::UNAUTHORIZED, "").kind(), "auth");
        assert_eq!(status_error(StatusCode::FORBIDDEN, "").kind(), "auth");
        assert_eq!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "slow down").kind(),
            "transport"
        );
        assert_eq!(
            status_error(StatusCode::INTERNAL_SERVER_ERROR, "").kind(),
            "transport"
        );
    }
}
