//! HTTP client for the interview API.
//!
//! Keeps the session cookie between calls, so one `InterviewClient` is one
//! visitor.

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ClientError;
use crate::interview::wire::{
    AnswerEntry, AnswerListResponse, AnswerRequest, AnswerResponse, AskQuestionRequest,
    AskQuestionResponse, ErrorResponse, RegisterRequest, RegisterResponse, WhichQuestionResponse,
};
use crate::llm::ChatMessage;

/// Clones share the cookie store, and with it the session.
#[derive(Clone)]
pub struct InterviewClient {
    http: Client,
    base_url: String,
}

impl InterviewClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| ClientError::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Decode a success body, or turn a failure body into [`ClientError::Api`].
    async fn read<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let text = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), body = %text, "API request failed");
        match serde_json::from_str::<ErrorResponse>(&text) {
            Ok(body) => Err(ClientError::Api {
                status: status.as_u16(),
                kind: body.error.kind,
                message: body.error.message,
                upstream_status: body.error.upstream.map(|u| u.status),
            }),
            Err(_) => Err(ClientError::Api {
                status: status.as_u16(),
                kind: "unknown".to_string(),
                message: text,
                upstream_status: None,
            }),
        }
    }

    /// GET /whichQuestion
    pub async fn which_question(&self) -> Result<WhichQuestionResponse, ClientError> {
        let response = self.http.get(self.url("/whichQuestion")).send().await?;
        Self::read(response).await
    }

    /// GET /answerList
    pub async fn answer_list(&self) -> Result<Vec<AnswerEntry>, ClientError> {
        let response = self.http.get(self.url("/answerList")).send().await?;
        let body: AnswerListResponse = Self::read(response).await?;
        Ok(body.answer_list)
    }

    /// POST /register. Returns the stored name.
    pub async fn register(&self, name: &str) -> Result<String, ClientError> {
        let response = self
            .http
            .post(self.url("/register"))
            .json(&RegisterRequest {
                name: name.to_string(),
            })
            .send()
            .await?;
        let body: RegisterResponse = Self::read(response).await?;
        Ok(body.name)
    }

    /// POST /answer. Returns the new progress.
    pub async fn answer(
        &self,
        question: &str,
        answer: &str,
        question_index: Option<u32>,
    ) -> Result<u32, ClientError> {
        let response = self
            .http
            .post(self.url("/answer"))
            .json(&AnswerRequest {
                question: question.to_string(),
                answer: answer.to_string(),
                question_index,
            })
            .send()
            .await?;
        let body: AnswerResponse = Self::read(response).await?;
        Ok(body.question_index)
    }

    /// POST /askQuestion
    pub async fn ask_question(&self, history: &[ChatMessage]) -> Result<ChatMessage, ClientError> {
        let response = self
            .http
            .post(self.url("/askQuestion"))
            .json(&AskQuestionRequest {
                message_queue: history.to_vec(),
            })
            .send()
            .await?;
        let body: AskQuestionResponse = Self::read(response).await?;
        Ok(body.message)
    }
}
