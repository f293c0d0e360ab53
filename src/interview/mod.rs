//! The interview: session model, turn state machine, coordinator, and the
//! HTTP surface in front of it.

pub mod coordinator;
pub mod model;
pub mod routes;
pub mod state;
pub mod wire;

pub use coordinator::{Outcome, ResumePoint, SessionPolicy, TurnCoordinator};
pub use model::{AnswerLedger, AnswerRecord, Session, SessionId};
pub use routes::{AppState, SESSION_COOKIE, cors_layer, interview_routes};
pub use state::TurnState;
