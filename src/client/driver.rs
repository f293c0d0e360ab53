//! Presentation driver: the client's view of the conversation.
//!
//! Holds the ordered message list and decides when the visitor may type and
//! when the next question should be requested. It performs no I/O: the
//! caller feeds it server results and reveal completions, and acts on what
//! it reports.

use crate::interview::TurnState;
use crate::interview::wire::{AnswerEntry, WhichQuestionResponse};
use crate::llm::ChatMessage;
use crate::questions::Onboarding;

/// Shown before the first question when a name has to be registered.
pub const NAME_PROMPT: &str = "Welcome to the cat survey! Before we start, what's your name?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Bot,
    User,
}

/// One line of the conversation as displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationMessage {
    pub speaker: Speaker,
    pub text: String,
    /// Freshly generated bot messages are revealed gradually; replayed ones
    /// appear at once.
    pub fresh: bool,
}

/// Where submitted input goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Input registers the visitor's display name.
    Name,
    /// Input answers the last question.
    Answer,
}

/// What the caller has to send to the server for a submitted line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Register {
        name: String,
    },
    Answer {
        question: String,
        answer: String,
        /// Progress at submit time, sent as `questionIndex`.
        expected: u32,
    },
}

#[derive(Debug, Clone)]
pub struct PresentationDriver {
    messages: Vec<ConversationMessage>,
    mode: InputMode,
    progress: u32,
    mounted: bool,
    /// A fresh bot message has not finished revealing.
    revealing: bool,
    /// A submission has not been acknowledged by the server yet.
    persisting: bool,
    /// A question request is in flight.
    requesting: bool,
    /// The last question request failed and waits for an explicit retry.
    stalled: bool,
    complete: bool,
}

impl Default for PresentationDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentationDriver {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            mode: InputMode::Answer,
            progress: 0,
            mounted: false,
            revealing: false,
            persisting: false,
            requesting: false,
            stalled: false,
            complete: false,
        }
    }

    /// Rebuild the conversation from the server's resume point and ledger.
    ///
    /// Nothing can be submitted or requested before this runs. Mounting
    /// again discards the local transcript and any pending work.
    pub fn mount(&mut self, point: &WhichQuestionResponse, ledger: &[AnswerEntry]) {
        self.messages.clear();
        self.revealing = false;
        self.persisting = false;
        self.requesting = false;
        self.stalled = false;
        for entry in ledger {
            self.messages.push(ConversationMessage {
                speaker: Speaker::Bot,
                text: entry.question.clone(),
                fresh: false,
            });
            self.messages.push(ConversationMessage {
                speaker: Speaker::User,
                text: entry.answer.clone(),
                fresh: false,
            });
        }

        self.progress = point.question_index;
        self.complete = point.state.is_terminal();
        self.mode = match (point.onboarding, point.state) {
            (Onboarding::RegisterName, TurnState::AwaitingName | TurnState::NotStarted) => {
                InputMode::Name
            }
            _ => InputMode::Answer,
        };
        self.mounted = true;

        if self.mode == InputMode::Name {
            self.push_bot(NAME_PROMPT, true);
        }
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn progress(&self) -> u32 {
        self.progress
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn is_revealing(&self) -> bool {
        self.revealing
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    fn last_speaker(&self) -> Option<Speaker> {
        self.messages.last().map(|m| m.speaker)
    }

    /// Append a bot message. A fresh one closes the gate until
    /// [`reveal_complete`](Self::reveal_complete).
    pub fn push_bot(&mut self, text: impl Into<String>, fresh: bool) {
        self.messages.push(ConversationMessage {
            speaker: Speaker::Bot,
            text: text.into(),
            fresh,
        });
        self.requesting = false;
        self.stalled = false;
        if fresh {
            self.revealing = true;
        }
    }

    /// The current reveal finished (or was skipped).
    pub fn reveal_complete(&mut self) {
        self.revealing = false;
    }

    /// Whether the visitor may type: the last bot message is fully shown
    /// and is waiting for a reply.
    pub fn gate_open(&self) -> bool {
        self.mounted
            && !self.revealing
            && !self.persisting
            && !self.complete
            && self.last_speaker() == Some(Speaker::Bot)
    }

    pub fn can_submit(&self, input: &str) -> bool {
        self.gate_open() && !input.trim().is_empty()
    }

    /// Accept a line of input. Appends it as a user message and returns what
    /// has to be sent, or `None` if input is not accepted right now.
    pub fn submit(&mut self, input: &str) -> Option<Submission> {
        if !self.can_submit(input) {
            return None;
        }
        let text = input.trim().to_string();
        let question = self
            .messages
            .last()
            .map(|m| m.text.clone())
            .unwrap_or_default();

        self.messages.push(ConversationMessage {
            speaker: Speaker::User,
            text: text.clone(),
            fresh: false,
        });
        self.persisting = true;

        Some(match self.mode {
            InputMode::Name => Submission::Register { name: text },
            InputMode::Answer => Submission::Answer {
                question,
                answer: text,
                expected: self.progress,
            },
        })
    }

    /// The server stored the name. Input answers questions from now on.
    pub fn name_registered(&mut self) {
        self.persisting = false;
        self.mode = InputMode::Answer;
    }

    /// The server recorded the answer and reports `progress`.
    pub fn answer_recorded(&mut self, progress: u32) {
        self.persisting = false;
        self.progress = self.progress.max(progress);
    }

    /// The server refused or failed to store the last submission. The
    /// optimistic user message is withdrawn so it can be typed again.
    pub fn submission_failed(&mut self) {
        if self.persisting && self.last_speaker() == Some(Speaker::User) {
            self.messages.pop();
        }
        self.persisting = false;
    }

    /// Whether the next question should be requested now.
    pub fn should_request_next(&self) -> bool {
        self.mounted
            && self.mode == InputMode::Answer
            && !self.revealing
            && !self.persisting
            && !self.requesting
            && !self.stalled
            && !self.complete
            && matches!(self.last_speaker(), None | Some(Speaker::User))
    }

    /// Mark a question request as in flight.
    pub fn begin_request(&mut self) {
        self.requesting = true;
    }

    /// The question request failed; hold until [`retry`](Self::retry).
    pub fn request_failed(&mut self) {
        self.requesting = false;
        self.stalled = true;
    }

    pub fn retry(&mut self) {
        self.stalled = false;
    }

    /// No more questions will come.
    pub fn mark_complete(&mut self) {
        self.requesting = false;
        self.complete = true;
    }

    /// The conversation in the role-tagged form sent with question requests.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .map(|m| match m.speaker {
                Speaker::Bot => ChatMessage::assistant(m.text.clone()),
                Speaker::User => ChatMessage::user(m.text.clone()),
            })
            .collect()
    }
}
