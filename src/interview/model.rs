//! Session and answer-ledger data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier carried in the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Mint a fresh random session id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A visitor's conversation progress record.
///
/// Stored in the `sessions` table. `progress` never decreases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// Number of questions answered so far.
    pub progress: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Last time the TTL was refreshed.
    pub touched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// A brand-new session with no progress, expiring after `ttl`.
    pub fn new(id: SessionId, ttl: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            id,
            progress: 0,
            display_name: None,
            created_at: now,
            touched_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// One answered question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub session_id: SessionId,
    pub question: String,
    pub answer: String,
    pub answered_at: DateTime<Utc>,
}

impl AnswerRecord {
    pub fn new(session_id: SessionId, question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            session_id,
            question: question.into(),
            answer: answer.into(),
            answered_at: Utc::now(),
        }
    }
}

/// The append-only answer log of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerLedger {
    pub session_id: SessionId,
    /// Records in insertion order.
    pub entries: Vec<AnswerRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
