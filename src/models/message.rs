//! Work message model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Originator of a message within a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// Request turn submitted by the requester.
    User,
    /// Response carrier written by the worker.
    Worker,
}

/// Processing status for a message.
///
/// Transitions are monotonic: `Pending` → `Processing` → `Completed` or
/// `Failed`. A message never changes once terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Waiting to be claimed.
    Pending,
    /// Claimed by a worker and in flight.
    Processing,
    /// Finished with a result.
    Completed,
    /// Finished with an error.
    Failed,
}

/// One request/response turn within a work session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct WorkMessage {
    /// Unique record identifier.
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// Originator role.
    pub role: MessageRole,
    /// Instruction text.
    pub content: String,
    /// Processing status.
    pub status: MessageStatus,
    /// Result payload recorded on completion.
    pub result: Option<serde_json::Value>,
    /// Wall-time elapsed from creation to completion.
    pub duration_ms: Option<i64>,
    /// Error detail recorded on failure.
    pub error_text: Option<String>,
    /// Latest partial-response snapshot while processing.
    pub progress: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl WorkMessage {
    /// Construct a new pending user message with a generated identifier.
    #[must_use]
    pub fn new_user(session_id: String, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id,
            role: MessageRole::User,
            content,
            status: MessageStatus::Pending,
            result: None,
            duration_ms: None,
            error_text: None,
            progress: None,
            created_at: Utc::now(),
        }
    }
}
