//! TurnCoordinator: sequences resume, name registration, answers, and
//! question requests for one session at a time.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::model::{AnswerRecord, Session, SessionId};
use super::state::TurnState;
use crate::error::{DatabaseError, TurnError};
use crate::llm::ChatMessage;
use crate::questions::{Onboarding, QuestionSource};
use crate::store::Database;

/// Session lifetime settings.
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    /// How long a session lives after its last refresh.
    pub ttl: chrono::Duration,
    /// Minimum age of the last refresh before the TTL is extended again.
    pub touch_after: chrono::Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            ttl: chrono::Duration::days(7),
            touch_after: chrono::Duration::hours(24),
        }
    }
}

/// The result of one coordinator operation, tagged with the session it ran
/// against.
///
/// `created` is set when no live session matched the caller's id and a new
/// one was started; the caller must hand the new id back to the visitor.
/// `refreshed` is set when an existing session's expiry was pushed forward,
/// so the visitor's copy of the id should be renewed too.
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub session_id: SessionId,
    pub created: bool,
    pub refreshed: bool,
    pub state: TurnState,
    pub value: T,
}

/// Where a visitor picks the conversation back up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePoint {
    pub progress: u32,
    /// Only reported once at least one answer has been recorded.
    pub display_name: Option<String>,
}

/// A session as resolved for one request.
struct Lease {
    session: Session,
    created: bool,
    refreshed: bool,
}

/// Coordinates turns between the visitor, the session store, and the
/// question source.
pub struct TurnCoordinator {
    db: Arc<dyn Database>,
    source: Arc<dyn QuestionSource>,
    policy: SessionPolicy,
}

impl TurnCoordinator {
    pub fn new(
        db: Arc<dyn Database>,
        source: Arc<dyn QuestionSource>,
        policy: SessionPolicy,
    ) -> Self {
        Self { db, source, policy }
    }

    pub fn onboarding(&self) -> Onboarding {
        self.source.onboarding()
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    fn state_of(&self, session: &Session) -> TurnState {
        TurnState::derive(Some(session), self.source.onboarding(), self.source.budget())
    }

    /// Load the live session for `id`, or start a new one.
    ///
    /// An existing session gets its TTL refreshed (lazily).
    async fn load_or_start(&self, id: Option<&SessionId>) -> Result<Lease, TurnError> {
        if let Some(id) = id {
            if let Some(session) = self.db.get_session(id).await? {
                let refreshed = match self
                    .db
                    .touch_session(id, self.policy.ttl, self.policy.touch_after)
                    .await
                {
                    Ok(refreshed) => refreshed,
                    Err(e) => {
                        warn!(session_id = %id, error = %e, "Failed to refresh session TTL");
                        false
                    }
                };
                return Ok(Lease {
                    session,
                    created: false,
                    refreshed,
                });
            }
            debug!(session_id = %id, "Unknown or expired session, starting a new one");
        }

        let session = Session::new(SessionId::generate(), self.policy.ttl);
        self.db.put_session(&session).await?;
        let state = TurnState::initial(self.source.onboarding());
        debug_assert!(TurnState::NotStarted.can_transition_to(state));
        info!(
            session_id = %session.id,
            state = %state,
            source = self.source.name(),
            "Session started"
        );
        Ok(Lease {
            session,
            created: true,
            refreshed: false,
        })
    }

    /// Resolve where the visitor stands, starting a session if needed.
    ///
    /// Calling this repeatedly without intervening writes returns the same
    /// resume point.
    pub async fn resume(
        &self,
        id: Option<&SessionId>,
    ) -> Result<Outcome<ResumePoint>, TurnError> {
        let Lease {
            session,
            created,
            refreshed,
        } = self.load_or_start(id).await?;
        let state = self.state_of(&session);
        let display_name = if session.progress > 0 {
            session.display_name.clone()
        } else {
            None
        };

        Ok(Outcome {
            session_id: session.id,
            created,
            refreshed,
            state,
            value: ResumePoint {
                progress: session.progress,
                display_name,
            },
        })
    }

    /// Store the visitor's display name. Does not advance progress.
    ///
    /// Only available with name-registration onboarding, and only until the
    /// first answer is recorded.
    pub async fn register_name(
        &self,
        id: Option<&SessionId>,
        name: &str,
    ) -> Result<Outcome<String>, TurnError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TurnError::Validation("name must not be blank".to_string()));
        }

        let Lease {
            session,
            created,
            refreshed,
        } = self.load_or_start(id).await?;
        let state = self.state_of(&session);
        if self.source.onboarding() != Onboarding::RegisterName {
            return Err(TurnError::Conflict {
                state: state.to_string(),
                reason: "this interview asks for the name itself".to_string(),
            });
        }
        if !state.accepts_name() {
            return Err(TurnError::Conflict {
                state: state.to_string(),
                reason: "name can no longer be changed".to_string(),
            });
        }

        let session = self.db.set_display_name(&session.id, name).await?;
        let new_state = self.state_of(&session);
        info!(session_id = %session.id, from = %state, to = %new_state, "Name registered");

        Ok(Outcome {
            session_id: session.id,
            created,
            refreshed,
            state: new_state,
            value: name.to_string(),
        })
    }

    /// Append an answer to the session's ledger and advance progress by one.
    ///
    /// With `expected_progress`, the write only happens if the stored progress
    /// still matches; otherwise the answer is appended unconditionally.
    /// Returns the new progress.
    pub async fn record_answer(
        &self,
        id: Option<&SessionId>,
        question: &str,
        answer: &str,
        expected_progress: Option<u32>,
    ) -> Result<Outcome<u32>, TurnError> {
        if question.trim().is_empty() {
            return Err(TurnError::Validation("question must not be blank".to_string()));
        }
        if answer.trim().is_empty() {
            return Err(TurnError::Validation("answer must not be blank".to_string()));
        }

        let Lease {
            session,
            created,
            refreshed,
        } = self.load_or_start(id).await?;
        let state = self.state_of(&session);
        let Some(expected_next) = state.after_answer(self.source.budget()) else {
            return Err(match state {
                TurnState::Complete { answered } => TurnError::Exhausted { total: answered },
                _ => TurnError::Conflict {
                    state: state.to_string(),
                    reason: "register a name before answering".to_string(),
                },
            });
        };

        let record = AnswerRecord::new(session.id.clone(), question, answer);
        let progress = match self
            .db
            .append_answer_and_advance(&record, expected_progress)
            .await
        {
            Ok(progress) => progress,
            Err(e @ DatabaseError::ProgressMismatch { .. }) => {
                info!(session_id = %session.id, error = %e, "Duplicate or stale answer rejected");
                return Err(e.into());
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Failed to record answer");
                return Err(e.into());
            }
        };

        let mut advanced = session;
        advanced.progress = progress;
        let new_state = self.state_of(&advanced);
        if new_state != expected_next {
            // Another request for the same session committed in between.
            debug!(
                session_id = %advanced.id,
                expected = %expected_next,
                actual = %new_state,
                "Concurrent answer observed"
            );
        }
        info!(session_id = %advanced.id, progress, state = %new_state, "Answer recorded");

        Ok(Outcome {
            session_id: advanced.id,
            created,
            refreshed,
            state: new_state,
            value: progress,
        })
    }

    /// Produce the bot's next question for the session.
    ///
    /// `history` is the conversation as the visitor sees it; the static list
    /// ignores it.
    pub async fn next_question(
        &self,
        id: Option<&SessionId>,
        history: &[ChatMessage],
    ) -> Result<Outcome<ChatMessage>, TurnError> {
        let Lease {
            session,
            created,
            refreshed,
        } = self.load_or_start(id).await?;
        let state = self.state_of(&session);
        match state {
            TurnState::AwaitingName => {
                return Err(TurnError::Conflict {
                    state: state.to_string(),
                    reason: "register a name before asking".to_string(),
                });
            }
            TurnState::Complete { answered } => {
                return Err(TurnError::Exhausted { total: answered });
            }
            TurnState::NotStarted | TurnState::InProgress { .. } | TurnState::Unbounded { .. } => {}
        }

        let question = match self.source.next_question(session.progress, history).await {
            Ok(question) => question,
            Err(e) => {
                warn!(
                    session_id = %session.id,
                    progress = session.progress,
                    source = self.source.name(),
                    error = %e,
                    "Question source failed"
                );
                return Err(e.into());
            }
        };
        info!(session_id = %session.id, progress = session.progress, "Question issued");

        Ok(Outcome {
            session_id: session.id,
            created,
            refreshed,
            state,
            value: ChatMessage::assistant(question),
        })
    }

    /// The session's recorded answers in order. Empty when there is no
    /// session or nothing has been answered yet.
    pub async fn answer_list(&self, id: Option<&SessionId>) -> Result<Vec<AnswerRecord>, TurnError> {
        let Some(id) = id else {
            return Ok(Vec::new());
        };
        Ok(self
            .db
            .get_ledger(id)
            .await?
            .map(|ledger| ledger.entries)
            .unwrap_or_default())
    }
}
