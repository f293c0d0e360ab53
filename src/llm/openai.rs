//! OpenAI-compatible `chat/completions` client.

use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ChatMessage;
use crate::error::GenerationError;

const PROVIDER: &str = "openai";

/// Default endpoint for chat completions.
pub const DEFAULT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Configuration for the completion client.
#[derive(Debug, Clone)]
pub struct CompletionsConfig {
    /// Bearer credential. `None` makes every call fail with `MissingCredential`.
    pub api_key: Option<SecretString>,
    pub model: String,
    pub url: String,
    /// Per-request timeout applied by the HTTP client.
    pub timeout: Duration,
}

impl Default for CompletionsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            url: DEFAULT_COMPLETIONS_URL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    response_format: ResponseFormat,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Sends message lists to the completion endpoint and returns the first choice.
pub struct CompletionsClient {
    client: Client,
    config: CompletionsConfig,
}

impl CompletionsClient {
    pub fn new(config: CompletionsConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GenerationError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, config })
    }

    pub fn model_name(&self) -> &str {
        &self.config.model
    }

    /// Request one completion for `messages`.
    ///
    /// Non-2xx answers are returned as [`GenerationError::Upstream`] carrying
    /// the status and raw body.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<ChatMessage, GenerationError> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .filter(|k| !k.expose_secret().trim().is_empty())
            .ok_or_else(|| GenerationError::MissingCredential {
                provider: PROVIDER.to_string(),
            })?;

        let request = CompletionRequest {
            model: &self.config.model,
            response_format: ResponseFormat { kind: "text" },
            messages,
        };

        debug!(model = %self.config.model, messages = messages.len(), "Requesting completion");

        let response = self
            .client
            .post(&self.config.url)
            .bearer_auth(api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout {
                        provider: PROVIDER.to_string(),
                        timeout: self.config.timeout,
                    }
                } else {
                    GenerationError::RequestFailed {
                        provider: PROVIDER.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GenerationError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to read response: {e}"),
            })?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "Completion service returned an error");
            return Err(GenerationError::Upstream {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse =
            serde_json::from_str(&body).map_err(|e| GenerationError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: format!("{e} - body: {body}"),
            })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| GenerationError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: "response contained no choices".to_string(),
            })
    }
}
