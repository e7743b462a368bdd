//! Work session repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::Utc;

use crate::models::session::{Priority, SessionStatus, WorkSession};
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for work session records.
#[derive(Clone)]
pub struct SessionRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    requester_id: String,
    worker_id: Option<String>,
    kind: String,
    title: String,
    priority: String,
    status: String,
    working_directory: Option<String>,
    resume_handle: Option<String>,
    metadata: Option<String>,
    created_at: String,
    updated_at: String,
}

impl SessionRow {
    /// Convert a database row into the domain model.
    fn into_session(self) -> Result<WorkSession> {
        let priority = parse_priority(&self.priority)?;
        let status = parse_status(&self.status)?;
        let metadata = self
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| AppError::Db(format!("invalid session metadata: {e}")))?;
        let created_at = parse_timestamp(&self.created_at)?;
        let updated_at = parse_timestamp(&self.updated_at)?;

        Ok(WorkSession {
            id: self.id,
            requester_id: self.requester_id,
            worker_id: self.worker_id,
            kind: self.kind,
            title: self.title,
            priority,
            status,
            working_directory: self.working_directory,
            resume_handle: self.resume_handle,
            metadata,
            created_at,
            updated_at,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<chrono::DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid timestamp: {e}")))
}

fn parse_status(s: &str) -> Result<SessionStatus> {
    match s {
        "active" => Ok(SessionStatus::Active),
        "paused" => Ok(SessionStatus::Paused),
        "completed" => Ok(SessionStatus::Completed),
        "failed" => Ok(SessionStatus::Failed),
        "cancelled" => Ok(SessionStatus::Cancelled),
        other => Err(AppError::Db(format!("invalid session status: {other}"))),
    }
}

fn status_str(s: SessionStatus) -> &'static str {
    match s {
        SessionStatus::Active => "active",
        SessionStatus::Paused => "paused",
        SessionStatus::Completed => "completed",
        SessionStatus::Failed => "failed",
        SessionStatus::Cancelled => "cancelled",
    }
}

fn parse_priority(s: &str) -> Result<Priority> {
    match s {
        "critical" => Ok(Priority::Critical),
        "high" => Ok(Priority::High),
        "medium" => Ok(Priority::Medium),
        "low" => Ok(Priority::Low),
        other => Err(AppError::Db(format!("invalid priority: {other}"))),
    }
}

fn priority_str(p: Priority) -> &'static str {
    match p {
        Priority::Critical => "critical",
        Priority::High => "high",
        Priority::Medium => "medium",
        Priority::Low => "low",
    }
}

impl SessionRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new session record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the database insert fails.
    pub async fn create(&self, session: &WorkSession) -> Result<WorkSession> {
        let metadata = session
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| AppError::Db(format!("failed to serialize metadata: {e}")))?;

        sqlx::query(
            "INSERT INTO work_session (id, requester_id, worker_id, kind, title, priority,
             status, working_directory, resume_handle, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(&session.id)
        .bind(&session.requester_id)
        .bind(&session.worker_id)
        .bind(&session.kind)
        .bind(&session.title)
        .bind(priority_str(session.priority))
        .bind(status_str(session.status))
        .bind(&session.working_directory)
        .bind(&session.resume_handle)
        .bind(&metadata)
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;

        Ok(session.clone())
    }

    /// Retrieve a session by identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session does not exist.
    pub async fn get_by_id(&self, id: &str) -> Result<WorkSession> {
        let row: Option<SessionRow> = sqlx::query_as("SELECT * FROM work_session WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(SessionRow::into_session)
            .transpose()?
            .ok_or_else(|| AppError::NotFound(format!("session {id} not found")))
    }

    /// Update session status and `updated_at`, respecting the state machine.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidState` if the transition is illegal,
    /// `AppError::Db` if persistence fails.
    pub async fn update_status(&self, id: &str, status: SessionStatus) -> Result<WorkSession> {
        let mut current = self.get_by_id(id).await?;
        if !current.can_transition_to(status) {
            return Err(AppError::InvalidState(format!(
                "session {id} cannot move from {:?} to {status:?}",
                current.status
            )));
        }

        current.status = status;
        current.updated_at = Utc::now();

        sqlx::query("UPDATE work_session SET status = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(status_str(status))
            .bind(current.updated_at.to_rfc3339())
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        Ok(current)
    }

    /// Assign a worker identity to the session if none is set yet.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn assign_worker_if_unset(&self, id: &str, worker_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE work_session SET worker_id = ?1, updated_at = ?2
             WHERE id = ?3 AND worker_id IS NULL",
        )
        .bind(worker_id)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// Persist the opaque resume handle for the session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn set_resume_handle(&self, id: &str, handle: &str) -> Result<()> {
        sqlx::query(
            "UPDATE work_session SET resume_handle = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(handle)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// List all sessions with status `active`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_active(&self) -> Result<Vec<WorkSession>> {
        let rows: Vec<SessionRow> =
            sqlx::query_as("SELECT * FROM work_session WHERE status = 'active'")
                .fetch_all(self.db.as_ref())
                .await?;

        rows.into_iter().map(SessionRow::into_session).collect()
    }
}
