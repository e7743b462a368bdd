//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS` — safe to
//! re-run on every worker startup. Produces a convergent result.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// Creates both tables idempotently. Safe to call on every startup.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS work_session (
    id                TEXT PRIMARY KEY NOT NULL,
    requester_id      TEXT NOT NULL,
    worker_id         TEXT,
    kind              TEXT NOT NULL,
    title             TEXT NOT NULL,
    priority          TEXT NOT NULL CHECK(priority IN ('critical','high','medium','low')),
    status            TEXT NOT NULL CHECK(status IN ('active','paused','completed','failed','cancelled')),
    working_directory TEXT,
    resume_handle     TEXT,
    metadata          TEXT,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS work_message (
    id              TEXT PRIMARY KEY NOT NULL,
    session_id      TEXT NOT NULL,
    role            TEXT NOT NULL CHECK(role IN ('user','worker')),
    content         TEXT NOT NULL,
    status          TEXT NOT NULL CHECK(status IN ('pending','processing','completed','failed')),
    result          TEXT,
    duration_ms     INTEGER,
    error_text      TEXT,
    progress        TEXT,
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_message_session ON work_message(session_id);
CREATE INDEX IF NOT EXISTS idx_message_status ON work_message(status);
CREATE INDEX IF NOT EXISTS idx_session_status ON work_session(status);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
