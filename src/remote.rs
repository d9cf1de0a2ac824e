//! Client for the hosted language model (OpenAI-compatible chat completions).

use crate::config::RemoteConfig;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Failures of a remote completion. None of them reach the end user as an error;
/// see [`RemoteError::user_message`].
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("provider rate limit exceeded")]
    RateLimited,
    #[error("provider returned {status}: {message}")]
    Api { status: StatusCode, message: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl RemoteError {
    /// Text shown to the user in place of an answer.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::RateLimited => "OpenAI rate limit exceeded. Please try again later.",
            Self::Api { .. } => "An error occurred while processing your request.",
            Self::Transport(_) | Self::Malformed(_) => "An unexpected error occurred.",
        }
    }

    fn from_status(status: StatusCode, body: &str) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Self::RateLimited;
        }
        let message = serde_json::from_str::<ApiErrorResponse>(body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| body.chars().take(200).collect());
        Self::Api { status, message }
    }
}

/// The protected operation: one question in, one answer out.
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    async fn complete(&self, question: &str) -> Result<String, RemoteError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    config: RemoteConfig,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("model", &self.config.model)
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    pub fn new(config: RemoteConfig, api_key: String) -> Result<Self, RemoteError> {
        let client =
            reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Ok(Self { client, api_key, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn request_body<'a>(&'a self, question: &str) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![
                Message { role: "system".into(), content: self.config.system_prompt.clone() },
                Message { role: "user".into(), content: question.to_string() },
            ],
        }
    }
}

#[async_trait]
impl ChatCompleter for OpenAiClient {
    async fn complete(&self, question: &str) -> Result<String, RemoteError> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&self.request_body(question))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(RemoteError::from_status(status, &body));
        }

        let parsed: ChatCompletionResponse =
            serde_json::from_str(&body).map_err(|e| RemoteError::Malformed(e.to_string()))?;
        tracing::debug!(model = %self.config.model, choices = parsed.choices.len(), "completion received");
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| RemoteError::Malformed("response has no choices".into()))
    }
}
