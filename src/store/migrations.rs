//! Schema for sessions and their answer ledgers.
//!
//! Applied versions are recorded in `_migrations`; startup applies whatever
//! is newer than the highest recorded one.

use libsql::Connection;

use crate::error::DatabaseError;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Ordered by version. Append only.
static MIGRATIONS: &[Migration] = &[
    // V1: one row per visitor session plus the ordered answers given in it.
    // Timestamps are fixed-width RFC 3339 so text comparison orders them.
    Migration {
        version: 1,
        name: "sessions_and_ledgers",
        sql: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                progress INTEGER NOT NULL DEFAULT 0 CHECK (progress >= 0),
                display_name TEXT,
                created_at TEXT NOT NULL,
                touched_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);

            -- Created on the first answer, so a missing row means "no answers yet".
            CREATE TABLE IF NOT EXISTS answer_ledgers (
                session_id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- seq is the 1-based position of the answer within its ledger.
            CREATE TABLE IF NOT EXISTS answer_records (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES answer_ledgers(session_id),
                seq INTEGER NOT NULL,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                answered_at TEXT NOT NULL,
                UNIQUE (session_id, seq)
            );
            CREATE INDEX IF NOT EXISTS idx_answer_records_session
                ON answer_records(session_id, seq);
        "#,
    },
];

fn migration_error(context: &str) -> impl Fn(libsql::Error) -> DatabaseError + '_ {
    move |e| DatabaseError::Migration(format!("{context}: {e}"))
}

/// Bring the schema up to the latest version.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(migration_error("create _migrations"))?;

    let applied = get_current_version(conn).await?;
    let pending = MIGRATIONS.iter().filter(|m| m.version > applied);

    for migration in pending {
        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        let context = format!("V{} ({})", migration.version, migration.name);
        conn.execute_batch(migration.sql)
            .await
            .map_err(migration_error(&context))?;
        conn.execute(
            "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
            libsql::params![migration.version, migration.name],
        )
        .await
        .map_err(migration_error(&context))?;
    }

    tracing::info!(from = applied, to = get_current_version(conn).await?, "Schema up to date");
    Ok(())
}

/// Highest applied version, 0 on a fresh database.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(migration_error("query schema version"))?;
    let Some(row) = rows.next().await.map_err(migration_error("read schema version"))? else {
        return Ok(0);
    };
    row.get::<i64>(0).map_err(migration_error("parse schema version"))
}
