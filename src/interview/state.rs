//! Turn state machine: where a session stands in the interview.

use serde::{Deserialize, Serialize};

use super::model::Session;
use crate::questions::Onboarding;

/// The state of one session's conversation.
///
/// Derived from the persisted session, the onboarding policy of the
/// configured question source, and its question budget. Static interviews
/// progress NotStarted → AwaitingName → InProgress(k) → Complete; generative
/// interviews progress NotStarted → Unbounded(k) with no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TurnState {
    NotStarted,
    AwaitingName,
    InProgress { answered: u32 },
    Complete { answered: u32 },
    Unbounded { answered: u32 },
}

impl TurnState {
    /// Derive the state of `session` (or of a session that does not exist yet).
    pub fn derive(session: Option<&Session>, onboarding: Onboarding, budget: Option<u32>) -> Self {
        let Some(session) = session else {
            return Self::NotStarted;
        };
        let answered = session.progress;
        match onboarding {
            Onboarding::GeneratedGreeting => Self::Unbounded { answered },
            Onboarding::RegisterName => {
                if answered == 0 && session.display_name.is_none() {
                    return Self::AwaitingName;
                }
                match budget {
                    Some(total) if answered >= total => Self::Complete { answered },
                    _ => Self::InProgress { answered },
                }
            }
        }
    }

    /// The state a freshly initialized session enters.
    pub fn initial(onboarding: Onboarding) -> Self {
        match onboarding {
            Onboarding::RegisterName => Self::AwaitingName,
            Onboarding::GeneratedGreeting => Self::Unbounded { answered: 0 },
        }
    }

    /// Whether a display name may be (re)registered.
    ///
    /// A name can be replaced until the first answer is recorded.
    pub fn accepts_name(&self) -> bool {
        matches!(self, Self::AwaitingName | Self::InProgress { answered: 0 })
    }

    /// Whether the interview is over.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }

    /// The state reached after one more recorded answer, if answering is
    /// allowed here at all.
    pub fn after_answer(&self, budget: Option<u32>) -> Option<TurnState> {
        match self {
            Self::InProgress { answered } => {
                let answered = answered + 1;
                Some(match budget {
                    Some(total) if answered >= total => Self::Complete { answered },
                    _ => Self::InProgress { answered },
                })
            }
            Self::Unbounded { answered } => Some(Self::Unbounded {
                answered: answered + 1,
            }),
            Self::NotStarted | Self::AwaitingName | Self::Complete { .. } => None,
        }
    }

    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: TurnState) -> bool {
        use TurnState::*;
        match (*self, target) {
            (NotStarted, AwaitingName) | (NotStarted, Unbounded { answered: 0 }) => true,
            (AwaitingName, InProgress { answered: 0 }) => true,
            (InProgress { answered: a }, InProgress { answered: b })
            | (InProgress { answered: a }, Complete { answered: b })
            | (Unbounded { answered: a }, Unbounded { answered: b }) => b == a + 1,
            _ => false,
        }
    }
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::AwaitingName => write!(f, "awaiting_name"),
            Self::InProgress { answered } => write!(f, "in_progress({answered})"),
            Self::Complete { answered } => write!(f, "complete({answered})"),
            Self::Unbounded { answered } => write!(f, "unbounded({answered})"),
        }
    }
}
