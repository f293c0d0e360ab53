//! Fixed, ordered question list.

use std::path::Path;

use async_trait::async_trait;

use super::{Onboarding, QuestionSource};
use crate::error::{ConfigError, QuestionError};
use crate::llm::ChatMessage;

/// Built-in questions used when no list file is configured.
pub const DEFAULT_QUESTIONS: &[&str] = &[
    "Do you share your home with a cat?",
    "What is your cat's name, or what would you name one?",
    "Which do you prefer: long-haired or short-haired cats?",
    "What is the funniest thing a cat has ever done in front of you?",
    "If cats could talk, what is the first thing you would ask one?",
];

/// Questions served in order, indexed by progress.
#[derive(Debug, Clone)]
pub struct StaticQuestions {
    questions: Vec<String>,
}

impl StaticQuestions {
    pub fn new(questions: Vec<String>) -> Result<Self, ConfigError> {
        if questions.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "questions".to_string(),
                message: "question list is empty".to_string(),
            });
        }
        Ok(Self { questions })
    }

    /// Load one question per non-blank line.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let questions = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();
        Self::new(questions)
    }

    pub fn get(&self, index: u32) -> Option<&str> {
        self.questions.get(index as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

impl Default for StaticQuestions {
    fn default() -> Self {
        Self {
            questions: DEFAULT_QUESTIONS.iter().map(|q| q.to_string()).collect(),
        }
    }
}

#[async_trait]
impl QuestionSource for StaticQuestions {
    fn name(&self) -> &str {
        "static"
    }

    fn onboarding(&self) -> Onboarding {
        Onboarding::RegisterName
    }

    fn budget(&self) -> Option<u32> {
        Some(u32::try_from(self.questions.len()).unwrap_or(u32::MAX))
    }

    async fn next_question(
        &self,
        progress: u32,
        _history: &[ChatMessage],
    ) -> Result<String, QuestionError> {
        self.get(progress)
            .map(String::from)
            .ok_or_else(|| QuestionError::Exhausted {
                progress,
                total: self.budget().unwrap_or(0),
            })
    }
}
