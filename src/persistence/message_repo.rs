//! Work message repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::Utc;

use crate::models::message::{MessageRole, MessageStatus, WorkMessage};
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for work message records.
#[derive(Clone)]
pub struct MessageRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    session_id: String,
    role: String,
    content: String,
    status: String,
    result: Option<String>,
    duration_ms: Option<i64>,
    error_text: Option<String>,
    progress: Option<String>,
    created_at: String,
}

impl MessageRow {
    /// Convert a database row into the domain model.
    fn into_message(self) -> Result<WorkMessage> {
        let role = parse_role(&self.role)?;
        let status = parse_status(&self.status)?;
        let result = self
            .result
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| AppError::Db(format!("invalid message result: {e}")))?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| AppError::Db(format!("invalid created_at: {e}")))?
            .with_timezone(&Utc);

        Ok(WorkMessage {
            id: self.id,
            session_id: self.session_id,
            role,
            content: self.content,
            status,
            result,
            duration_ms: self.duration_ms,
            error_text: self.error_text,
            progress: self.progress,
            created_at,
        })
    }
}

fn parse_role(s: &str) -> Result<MessageRole> {
    match s {
        "user" => Ok(MessageRole::User),
        "worker" => Ok(MessageRole::Worker),
        other => Err(AppError::Db(format!("invalid message role: {other}"))),
    }
}

fn role_str(r: MessageRole) -> &'static str {
    match r {
        MessageRole::User => "user",
        MessageRole::Worker => "worker",
    }
}

fn parse_status(s: &str) -> Result<MessageStatus> {
    match s {
        "pending" => Ok(MessageStatus::Pending),
        "processing" => Ok(MessageStatus::Processing),
        "completed" => Ok(MessageStatus::Completed),
        "failed" => Ok(MessageStatus::Failed),
        other => Err(AppError::Db(format!("invalid message status: {other}"))),
    }
}

impl MessageRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new message record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the database insert fails.
    pub async fn create(&self, message: &WorkMessage) -> Result<WorkMessage> {
        let result = message
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| AppError::Db(format!("failed to serialize result: {e}")))?;

        sqlx::query(
            "INSERT INTO work_message (id, session_id, role, content, status, result,
             duration_ms, error_text, progress, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&message.id)
        .bind(&message.session_id)
        .bind(role_str(message.role))
        .bind(&message.content)
        .bind(status_str(message.status))
        .bind(&result)
        .bind(message.duration_ms)
        .bind(&message.error_text)
        .bind(&message.progress)
        .bind(message.created_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;

        Ok(message.clone())
    }

    /// Retrieve a message by identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the message does not exist.
    pub async fn get_by_id(&self, id: &str) -> Result<WorkMessage> {
        let row: Option<MessageRow> = sqlx::query_as("SELECT * FROM work_message WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(MessageRow::into_message)
            .transpose()?
            .ok_or_else(|| AppError::NotFound(format!("message {id} not found")))
    }

    /// Find the best claim candidate: the oldest pending user message in an
    /// active session, ordered by session priority rank then creation time.
    ///
    /// Sessions that already have a message in flight are skipped so turns
    /// within a session execute strictly serially.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_next_claimable(&self) -> Result<Option<WorkMessage>> {
        let row: Option<MessageRow> = sqlx::query_as(
            "SELECT m.* FROM work_message m
             JOIN work_session s ON s.id = m.session_id
             WHERE m.status = 'pending' AND m.role = 'user' AND s.status = 'active'
               AND NOT EXISTS (
                 SELECT 1 FROM work_message p
                 WHERE p.session_id = m.session_id AND p.status = 'processing'
               )
             ORDER BY CASE s.priority
                 WHEN 'critical' THEN 0
                 WHEN 'high' THEN 1
                 WHEN 'medium' THEN 2
                 ELSE 3
               END,
               m.created_at ASC
             LIMIT 1",
        )
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(MessageRow::into_message).transpose()
    }

    /// Atomically transition a message `pending` → `processing`.
    ///
    /// Returns `false` if the compare-and-swap lost a race with another
    /// claimer (the message was no longer pending).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn claim(&self, id: &str) -> Result<bool> {
        let outcome = sqlx::query(
            "UPDATE work_message SET status = 'processing' WHERE id = ?1 AND status = 'pending'",
        )
        .bind(id)
        .execute(self.db.as_ref())
        .await?;

        Ok(outcome.rows_affected() == 1)
    }

    /// Finalize a message as completed with its result payload and duration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn complete(
        &self,
        id: &str,
        result: &serde_json::Value,
        duration_ms: i64,
    ) -> Result<WorkMessage> {
        let payload = serde_json::to_string(result)
            .map_err(|e| AppError::Db(format!("failed to serialize result: {e}")))?;

        sqlx::query(
            "UPDATE work_message SET status = 'completed', result = ?1, duration_ms = ?2
             WHERE id = ?3",
        )
        .bind(&payload)
        .bind(duration_ms)
        .bind(id)
        .execute(self.db.as_ref())
        .await?;

        self.get_by_id(id).await
    }

    /// Finalize a message as failed with its error detail.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn fail(&self, id: &str, error_text: &str) -> Result<WorkMessage> {
        sqlx::query("UPDATE work_message SET status = 'failed', error_text = ?1 WHERE id = ?2")
            .bind(error_text)
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        self.get_by_id(id).await
    }

    /// Overwrite the partial-response snapshot on an in-flight message.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn update_progress(&self, id: &str, progress: &str) -> Result<()> {
        sqlx::query("UPDATE work_message SET progress = ?1 WHERE id = ?2")
            .bind(progress)
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        Ok(())
    }

    /// List all messages for a session in creation order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_for_session(&self, session_id: &str) -> Result<Vec<WorkMessage>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT * FROM work_message WHERE session_id = ?1 ORDER BY created_at ASC",
        )
        .bind(session_id)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(MessageRow::into_message).collect()
    }

    /// Count messages in a session that are still pending or processing.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count_open_for_session(&self, session_id: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM work_message
             WHERE session_id = ?1 AND status IN ('pending', 'processing')",
        )
        .bind(session_id)
        .fetch_one(self.db.as_ref())
        .await?;

        Ok(row.0)
    }

    /// List all messages currently in `processing` status.
    ///
    /// Used for orphan recovery after a worker crash.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_processing(&self) -> Result<Vec<WorkMessage>> {
        let rows: Vec<MessageRow> =
            sqlx::query_as("SELECT * FROM work_message WHERE status = 'processing'")
                .fetch_all(self.db.as_ref())
                .await?;

        rows.into_iter().map(MessageRow::into_message).collect()
    }
}

fn status_str(s: MessageStatus) -> &'static str {
    match s {
        MessageStatus::Pending => "pending",
        MessageStatus::Processing => "processing",
        MessageStatus::Completed => "completed",
        MessageStatus::Failed => "failed",
    }
}
