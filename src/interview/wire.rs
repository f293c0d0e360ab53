//! JSON bodies of the HTTP API, shared by the server routes and the client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::AnswerRecord;
use super::state::TurnState;
use crate::llm::ChatMessage;
use crate::questions::Onboarding;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhichQuestionResponse {
    pub success: bool,
    pub question_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub onboarding: Onboarding,
    pub state: TurnState,
}

/// One ledger entry as exposed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerEntry {
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}

impl From<AnswerRecord> for AnswerEntry {
    fn from(record: AnswerRecord) -> Self {
        Self {
            question: record.question,
            answer: record.answer,
            timestamp: record.answered_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerListResponse {
    pub success: bool,
    pub answer_list: Vec<AnswerEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub question: String,
    pub answer: String,
    /// The progress the client believes it is answering at. When present,
    /// a mismatch is rejected instead of appended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_index: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResponse {
    pub success: bool,
    pub question_index: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskQuestionRequest {
    #[serde(default)]
    pub message_queue: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskQuestionResponse {
    pub success: bool,
    pub message: ChatMessage,
}

/// Body of every failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// One of `validation`, `conflict`, `exhausted`, `persistence_failure`,
    /// `generation_failed`.
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<UpstreamDetail>,
}

/// What the completion service answered, for generation failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamDetail {
    pub status: u16,
    pub body: String,
}
