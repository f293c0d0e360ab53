//! libSQL implementation of the async `Database` trait.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::interview::model::{AnswerLedger, AnswerRecord, Session, SessionId};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations. A
/// connection can hold only one open transaction, and any statement issued
/// on it while a transaction is open joins that transaction, so every
/// operation runs under `op_lock`.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    op_lock: Mutex<()>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;

        Ok(Self {
            db: Arc::new(db),
            conn,
            op_lock: Mutex::new(()),
        })
    }

    /// Get the connection together with the guard that serializes its use.
    async fn conn(&self) -> (MutexGuard<'_, ()>, &Connection) {
        (self.op_lock.lock().await, &self.conn)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical write format. Fixed width, so text comparison in SQL orders
/// timestamps correctly.
fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn progress_from_db(value: i64) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

const SESSION_COLUMNS: &str = "id, progress, display_name, created_at, touched_at, expires_at";

/// Map a libsql Row to a Session.
///
/// Column order matches SESSION_COLUMNS.
fn row_to_session(row: &libsql::Row) -> Result<Session, libsql::Error> {
    let id: String = row.get(0)?;
    let progress: i64 = row.get(1)?;
    let created_str: String = row.get(3)?;
    let touched_str: String = row.get(4)?;
    let expires_str: String = row.get(5)?;

    Ok(Session {
        id: SessionId::from(id),
        progress: progress_from_db(progress),
        display_name: row.get::<String>(2).ok(),
        created_at: parse_datetime(&created_str),
        touched_at: parse_datetime(&touched_str),
        expires_at: parse_datetime(&expires_str),
    })
}

/// Read the progress of a live session inside the current transaction.
async fn live_progress(
    conn: &Connection,
    id: &SessionId,
    now: &str,
) -> Result<Option<u32>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT progress FROM sessions WHERE id = ?1 AND expires_at > ?2",
            params![id.as_str(), now],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("read progress: {e}")))?;

    match rows.next().await {
        Ok(Some(row)) => {
            let progress: i64 = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("read progress: {e}")))?;
            Ok(Some(progress_from_db(progress)))
        }
        Ok(None) => Ok(None),
        Err(e) => Err(DatabaseError::Query(format!("read progress: {e}"))),
    }
}

/// Ledger append + progress increment, run inside an open transaction.
async fn append_in_tx(
    conn: &Connection,
    record: &AnswerRecord,
    expected_progress: Option<u32>,
) -> Result<u32, DatabaseError> {
    let session_id = &record.session_id;
    let now = format_datetime(Utc::now());

    let current = live_progress(conn, session_id, &now)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "session".to_string(),
            id: session_id.to_string(),
        })?;

    if let Some(expected) = expected_progress {
        if expected != current {
            return Err(DatabaseError::ProgressMismatch {
                session_id: session_id.to_string(),
                expected,
                actual: current,
            });
        }
    }

    conn.execute(
        "INSERT INTO answer_ledgers (session_id, created_at, updated_at) VALUES (?1, ?2, ?2)
         ON CONFLICT (session_id) DO UPDATE SET updated_at = ?2",
        params![session_id.as_str(), now.clone()],
    )
    .await
    .map_err(|e| DatabaseError::Query(format!("upsert ledger: {e}")))?;

    conn.execute(
        "INSERT INTO answer_records (id, session_id, seq, question, answer, answered_at)
         VALUES (?1, ?2,
                 (SELECT COALESCE(MAX(seq), 0) + 1 FROM answer_records WHERE session_id = ?2),
                 ?3, ?4, ?5)",
        params![
            Uuid::new_v4().to_string(),
            session_id.as_str(),
            record.question.as_str(),
            record.answer.as_str(),
            format_datetime(record.answered_at)
        ],
    )
    .await
    .map_err(|e| DatabaseError::Query(format!("append answer: {e}")))?;

    conn.execute(
        "UPDATE sessions SET progress = progress + 1 WHERE id = ?1",
        params![session_id.as_str()],
    )
    .await
    .map_err(|e| DatabaseError::Query(format!("advance progress: {e}")))?;

    Ok(current + 1)
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    // ── Sessions ────────────────────────────────────────────────────

    async fn put_session(&self, session: &Session) -> Result<(), DatabaseError> {
        let (_guard, conn) = self.conn().await;
        conn.execute(
            "INSERT INTO sessions (id, progress, display_name, created_at, touched_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (id) DO UPDATE SET
                progress = MAX(sessions.progress, excluded.progress),
                display_name = excluded.display_name,
                touched_at = excluded.touched_at,
                expires_at = excluded.expires_at",
            params![
                session.id.as_str(),
                i64::from(session.progress),
                opt_text(session.display_name.as_deref()),
                format_datetime(session.created_at),
                format_datetime(session.touched_at),
                format_datetime(session.expires_at)
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("put_session: {e}")))?;

        debug!(session_id = %session.id, "Session stored");
        Ok(())
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, DatabaseError> {
        let (_guard, conn) = self.conn().await;
        let now = format_datetime(Utc::now());
        let mut rows = conn
            .query(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1 AND expires_at > ?2"),
                params![id.as_str(), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_session: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_session(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Serialization(format!("get_session: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_session: {e}"))),
        }
    }

    async fn set_display_name(
        &self,
        id: &SessionId,
        name: &str,
    ) -> Result<Session, DatabaseError> {
        let (_guard, conn) = self.conn().await;
        let now = format_datetime(Utc::now());
        let mut rows = conn
            .query(
                &format!(
                    "UPDATE sessions SET display_name = ?2
                     WHERE id = ?1 AND expires_at > ?3
                     RETURNING {SESSION_COLUMNS}"
                ),
                params![id.as_str(), name, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_display_name: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_session(&row)
                .map_err(|e| DatabaseError::Serialization(format!("set_display_name: {e}"))),
            Ok(None) => Err(DatabaseError::NotFound {
                entity: "session".to_string(),
                id: id.to_string(),
            }),
            Err(e) => Err(DatabaseError::Query(format!("set_display_name: {e}"))),
        }
    }

    async fn touch_session(
        &self,
        id: &SessionId,
        ttl: Duration,
        touch_after: Duration,
    ) -> Result<bool, DatabaseError> {
        let (_guard, conn) = self.conn().await;
        let now = Utc::now();
        let count = conn
            .execute(
                "UPDATE sessions SET touched_at = ?2, expires_at = ?3
                 WHERE id = ?1 AND expires_at > ?2 AND touched_at <= ?4",
                params![
                    id.as_str(),
                    format_datetime(now),
                    format_datetime(now + ttl),
                    format_datetime(now - touch_after)
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("touch_session: {e}")))?;
        Ok(count > 0)
    }

    async fn delete_expired_sessions(&self) -> Result<usize, DatabaseError> {
        let (_guard, conn) = self.conn().await;
        let now = format_datetime(Utc::now());
        let count = conn
            .execute(
                "DELETE FROM sessions WHERE expires_at <= ?1",
                params![now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_expired_sessions: {e}")))?;
        Ok(count as usize)
    }

    // ── Answer ledger ───────────────────────────────────────────────

    async fn get_ledger(&self, id: &SessionId) -> Result<Option<AnswerLedger>, DatabaseError> {
        let (_guard, conn) = self.conn().await;
        let mut rows = conn
            .query(
                "SELECT created_at, updated_at FROM answer_ledgers WHERE session_id = ?1",
                params![id.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_ledger: {e}")))?;

        let (created_at, updated_at) = match rows.next().await {
            Ok(Some(row)) => {
                let created_str: String = row.get(0).unwrap_or_default();
                let updated_str: String = row.get(1).unwrap_or_default();
                (parse_datetime(&created_str), parse_datetime(&updated_str))
            }
            Ok(None) => return Ok(None),
            Err(e) => return Err(DatabaseError::Query(format!("get_ledger: {e}"))),
        };

        let mut rows = conn
            .query(
                "SELECT question, answer, answered_at FROM answer_records
                 WHERE session_id = ?1 ORDER BY seq ASC",
                params![id.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_ledger entries: {e}")))?;

        let mut entries = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => {
                    let question: String = row.get(0).unwrap_or_default();
                    let answer: String = row.get(1).unwrap_or_default();
                    let answered_str: String = row.get(2).unwrap_or_default();
                    entries.push(AnswerRecord {
                        session_id: id.clone(),
                        question,
                        answer,
                        answered_at: parse_datetime(&answered_str),
                    });
                }
                Ok(None) => break,
                Err(e) => return Err(DatabaseError::Query(format!("get_ledger entries: {e}"))),
            }
        }

        Ok(Some(AnswerLedger {
            session_id: id.clone(),
            entries,
            created_at,
            updated_at,
        }))
    }

    async fn append_answer_and_advance(
        &self,
        record: &AnswerRecord,
        expected_progress: Option<u32>,
    ) -> Result<u32, DatabaseError> {
        let (_guard, conn) = self.conn().await;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("begin transaction: {e}")))?;

        match append_in_tx(&tx, record, expected_progress).await {
            Ok(progress) => {
                tx.commit()
                    .await
                    .map_err(|e| DatabaseError::Query(format!("commit: {e}")))?;
                Ok(progress)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback failed");
                }
                Err(e)
            }
        }
    }
}
