//! Question sources, i.e. where the bot's next question comes from.
//!
//! Two interchangeable strategies sit behind [`QuestionSource`]:
//! a fixed ordered list ([`StaticQuestions`]) and a chat-completion call
//! ([`GenerativeQuestions`]). The strategy is picked once at startup and also
//! fixes how a conversation is opened (see [`Onboarding`]).

pub mod generative;
pub mod prompts;
pub mod static_list;

pub use generative::GenerativeQuestions;
pub use prompts::GenerationStage;
pub use static_list::StaticQuestions;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::QuestionError;
use crate::llm::ChatMessage;

/// How a conversation is opened before the first real question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Onboarding {
    /// The visitor registers a display name before any question is asked.
    RegisterName,
    /// The first generated message greets the visitor and asks their name;
    /// the reply is recorded like any other answer.
    GeneratedGreeting,
}

/// Produces the next question of an interview.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// The onboarding policy this strategy implies.
    fn onboarding(&self) -> Onboarding;

    /// Total number of questions, or `None` when the interview is open-ended.
    fn budget(&self) -> Option<u32>;

    /// Produce the question to ask after `progress` answers, given the
    /// conversation so far.
    async fn next_question(
        &self,
        progress: u32,
        history: &[ChatMessage],
    ) -> Result<String, QuestionError>;
}
