//! `Database` trait: the single async interface for session and ledger persistence.

use async_trait::async_trait;
use chrono::Duration;

use crate::error::DatabaseError;
use crate::interview::model::{AnswerLedger, AnswerRecord, Session, SessionId};

/// Backend-agnostic database trait covering sessions and answer ledgers.
///
/// Sessions are TTL-bound: anything past `expires_at` reads as absent.
/// Ledgers are append-only and never deleted.
#[async_trait]
pub trait Database: Send + Sync {
    // ── Sessions ────────────────────────────────────────────────────

    /// Insert or replace a session.
    async fn put_session(&self, session: &Session) -> Result<(), DatabaseError>;

    /// Get a live (unexpired) session by id.
    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, DatabaseError>;

    /// Set the display name of a live session. Returns the updated session.
    async fn set_display_name(
        &self,
        id: &SessionId,
        name: &str,
    ) -> Result<Session, DatabaseError>;

    /// Extend a live session's expiry to now + `ttl`, unless it was already
    /// touched within `touch_after`. Returns whether a write happened.
    async fn touch_session(
        &self,
        id: &SessionId,
        ttl: Duration,
        touch_after: Duration,
    ) -> Result<bool, DatabaseError>;

    /// Delete expired sessions. Returns the number of sessions removed.
    async fn delete_expired_sessions(&self) -> Result<usize, DatabaseError>;

    // ── Answer ledger ───────────────────────────────────────────────

    /// Get the ledger of a session, entries in insertion order.
    async fn get_ledger(&self, id: &SessionId) -> Result<Option<AnswerLedger>, DatabaseError>;

    /// Append `record` to its session's ledger (creating the ledger if
    /// needed) and advance the session's progress by one, atomically.
    ///
    /// When `expected_progress` is set and differs from the stored progress,
    /// nothing is written and `ProgressMismatch` is returned.
    /// Returns the new progress.
    async fn append_answer_and_advance(
        &self,
        record: &AnswerRecord,
        expected_progress: Option<u32>,
    ) -> Result<u32, DatabaseError>;
}
