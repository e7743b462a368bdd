//! Work session model and lifecycle helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status for a work session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session has unprocessed or in-flight work.
    Active,
    /// Session temporarily held back from claiming.
    Paused,
    /// All messages processed; reopenable by the owner.
    Completed,
    /// Last message failed; terminal unless resubmitted.
    Failed,
    /// Explicitly cancelled by the owner; terminal.
    Cancelled,
}

/// Scheduling priority for a session's messages.
///
/// Lower rank claims first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Jump the queue.
    Critical,
    /// Ahead of routine work.
    High,
    /// Default.
    Medium,
    /// Back of the queue.
    Low,
}

impl Priority {
    /// Numeric rank used for claim ordering.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }
}

/// Work session domain entity persisted in `SQLite`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct WorkSession {
    /// Unique record identifier.
    pub id: String,
    /// Owning requester agent ID; immutable after creation.
    pub requester_id: String,
    /// Worker that first claimed a message from this session.
    pub worker_id: Option<String>,
    /// Free-form category (e.g. `code`, `research`, `browser`, `general`).
    pub kind: String,
    /// Short human-readable title.
    pub title: String,
    /// Scheduling priority.
    pub priority: Priority,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Working directory for the driven CLI.
    pub working_directory: Option<String>,
    /// Opaque token that reattaches the CLI's prior conversation.
    pub resume_handle: Option<String>,
    /// Arbitrary requester-supplied context.
    pub metadata: Option<serde_json::Value>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last activity timestamp.
    pub updated_at: DateTime<Utc>,
}

impl WorkSession {
    /// Construct a new active session with a generated identifier.
    #[must_use]
    pub fn new(
        requester_id: String,
        kind: String,
        title: String,
        priority: Priority,
        working_directory: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            requester_id,
            worker_id: None,
            kind,
            title,
            priority,
            status: SessionStatus::Active,
            working_directory,
            resume_handle: None,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// Determine whether a lifecycle transition is permitted.
    ///
    /// Completed sessions may return to `Active` (owner continuation);
    /// `Failed` and `Cancelled` are terminal.
    #[must_use]
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self.status, next),
            (
                SessionStatus::Active,
                SessionStatus::Paused
                    | SessionStatus::Completed
                    | SessionStatus::Failed
                    | SessionStatus::Cancelled
            ) | (
                SessionStatus::Paused,
                SessionStatus::Active | SessionStatus::Completed | SessionStatus::Cancelled
            ) | (SessionStatus::Completed, SessionStatus::Active)
        )
    }
}
