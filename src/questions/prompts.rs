//! Fixed prompts for the generative question source.

/// System prompt placed ahead of every conversation.
pub const INTERVIEWER_PERSONA: &str = "\
You are a friendly chatbot running a short conversational survey about cats.
Guidelines:
- Write one or two sentences per message.
- Ask exactly ONE question per message and nothing else.
- Never answer on the visitor's behalf.";

/// Which steering instruction accompanies a generation request.
///
/// Picked from the session's progress: nothing answered yet means greeting,
/// one answer (the visitor's name) means the opening question, anything
/// beyond that is a follow-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStage {
    Greeting,
    Opening,
    FollowUp,
}

impl GenerationStage {
    pub fn for_progress(progress: u32) -> Self {
        match progress {
            0 => Self::Greeting,
            1 => Self::Opening,
            _ => Self::FollowUp,
        }
    }

    /// The steering instruction appended after the history.
    pub fn instruction(&self) -> &'static str {
        match self {
            Self::Greeting => {
                "Greet the visitor warmly, introduce yourself as the cat survey bot, \
                 and ask for their name."
            }
            Self::Opening => {
                "The visitor has just told you their name. Thank them by name and ask \
                 the first question of the survey: a question about cats."
            }
            Self::FollowUp => {
                "Based on everything the visitor has said so far, ask one relevant \
                 follow-up question about cats. Do not repeat an earlier question."
            }
        }
    }
}

impl std::fmt::Display for GenerationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Greeting => "greeting",
            Self::Opening => "opening",
            Self::FollowUp => "follow_up",
        };
        write!(f, "{s}")
    }
}
