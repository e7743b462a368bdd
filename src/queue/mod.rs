//! Persisted priority work queue and session/message state machine.
//!
//! All lifecycle transitions for [`WorkSession`] and [`WorkMessage`] records
//! route through [`WorkQueue`]. The claim path uses a compare-and-swap on
//! the message status so it stays correct when several workers poll the
//! same queue concurrently.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::models::message::{MessageStatus, WorkMessage};
use crate::models::session::{Priority, SessionStatus, WorkSession};
use crate::persistence::db::Database;
use crate::persistence::message_repo::MessageRepo;
use crate::persistence::session_repo::SessionRepo;
use crate::{AppError, Result};

/// Interval between stale-session reconciliation sweeps.
const RECONCILE_INTERVAL: Duration = Duration::from_secs(300);

/// Parameters for opening a new work session.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    /// Requesting agent identity.
    pub requester_id: String,
    /// Free-form work category.
    pub kind: String,
    /// Short session title.
    pub title: String,
    /// Instruction text for the first message.
    pub instructions: String,
    /// Scheduling priority.
    pub priority: Priority,
    /// Working directory for the driven CLI.
    pub working_directory: Option<String>,
    /// Arbitrary requester-supplied context.
    pub metadata: Option<serde_json::Value>,
}

/// Counts reported by a stale-session reconciliation sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileCounts {
    /// Sessions moved to `Completed`.
    pub completed: u32,
    /// Sessions moved to `Failed`.
    pub failed: u32,
}

/// Service facade over the session and message repositories.
#[derive(Clone)]
pub struct WorkQueue {
    sessions: SessionRepo,
    messages: MessageRepo,
}

impl WorkQueue {
    /// Create a queue service over the shared database pool.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            sessions: SessionRepo::new(Arc::clone(&db)),
            messages: MessageRepo::new(db),
        }
    }

    /// Access the underlying session repository.
    #[must_use]
    pub fn sessions(&self) -> &SessionRepo {
        &self.sessions
    }

    /// Access the underlying message repository.
    #[must_use]
    pub fn messages(&self) -> &MessageRepo {
        &self.messages
    }

    /// Open a new active session with one pending user message.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the title or instructions are
    /// empty, `AppError::Db` on persistence failure.
    pub async fn submit(&self, request: SubmitRequest) -> Result<(WorkSession, WorkMessage)> {
        if request.title.trim().is_empty() {
            return Err(AppError::Validation("title must not be empty".into()));
        }
        if request.instructions.trim().is_empty() {
            return Err(AppError::Validation(
                "instructions must not be empty".into(),
            ));
        }

        let session = WorkSession::new(
            request.requester_id,
            request.kind,
            request.title,
            request.priority,
            request.working_directory,
            request.metadata,
        );
        let created = self.sessions.create(&session).await?;

        let message = WorkMessage::new_user(created.id.clone(), request.instructions);
        let created_message = self.messages.create(&message).await?;

        info!(
            session_id = created.id,
            priority = ?created.priority,
            "work session submitted"
        );
        Ok((created, created_message))
    }

    /// Append a follow-up user message to an existing session.
    ///
    /// A completed session is reopened to `Active` as a side effect; a
    /// finished session is not terminal for its owner.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unauthorized` if the caller does not own the
    /// session, `AppError::InvalidState` unless the session is `Active`
    /// or `Completed`.
    pub async fn continue_session(
        &self,
        session_id: &str,
        content: &str,
        requester_id: &str,
    ) -> Result<WorkMessage> {
        if content.trim().is_empty() {
            return Err(AppError::Validation("content must not be empty".into()));
        }

        let session = self.sessions.get_by_id(session_id).await?;
        if session.requester_id != requester_id {
            return Err(AppError::Unauthorized(
                "only the session owner can send messages".into(),
            ));
        }
        match session.status {
            SessionStatus::Active => {}
            SessionStatus::Completed => {
                self.sessions
                    .update_status(session_id, SessionStatus::Active)
                    .await?;
                info!(session_id, "completed session reopened for continuation");
            }
            other => {
                return Err(AppError::InvalidState(format!(
                    "cannot send messages to a {other:?} session"
                )));
            }
        }

        let message = WorkMessage::new_user(session_id.to_owned(), content.to_owned());
        self.messages.create(&message).await
    }

    /// Claim the highest-priority pending message for `worker_id`.
    ///
    /// Selection orders by (priority rank, creation time); the transition
    /// `pending` → `processing` is a compare-and-swap. A lost race returns
    /// `None` rather than retrying so the caller's next poll re-evaluates
    /// the queue.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on persistence failure.
    pub async fn claim_next(&self, worker_id: &str) -> Result<Option<(WorkMessage, WorkSession)>> {
        let Some(candidate) = self.messages.find_next_claimable().await? else {
            return Ok(None);
        };

        if !self.messages.claim(&candidate.id).await? {
            // Raced by a concurrent claimer.
            return Ok(None);
        }

        self.sessions
            .assign_worker_if_unset(&candidate.session_id, worker_id)
            .await?;

        let session = self.sessions.get_by_id(&candidate.session_id).await?;
        let claimed = self.messages.get_by_id(&candidate.id).await?;

        info!(
            message_id = claimed.id,
            session_id = session.id,
            worker_id,
            "message claimed"
        );
        Ok(Some((claimed, session)))
    }

    /// Finalize a message as completed.
    ///
    /// Records the result and elapsed duration, persists the resume handle
    /// onto the session when supplied, and marks the session `Completed`
    /// (reopenable via [`continue_session`](Self::continue_session)).
    /// A session with follow-up messages already queued stays `Active` so
    /// they remain claimable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on persistence failure.
    pub async fn complete_message(
        &self,
        message_id: &str,
        result: &serde_json::Value,
        resume_handle: Option<&str>,
    ) -> Result<WorkMessage> {
        let message = self.messages.get_by_id(message_id).await?;
        let duration_ms = (Utc::now() - message.created_at).num_milliseconds();
        let completed = self.messages.complete(message_id, result, duration_ms).await?;

        if let Some(handle) = resume_handle {
            self.sessions
                .set_resume_handle(&message.session_id, handle)
                .await?;
        }

        let open = self
            .messages
            .count_open_for_session(&message.session_id)
            .await?;
        if open == 0 {
            self.finish_session(&message.session_id, SessionStatus::Completed)
                .await;
        } else {
            info!(
                session_id = message.session_id,
                open, "session stays active for queued follow-ups"
            );
        }
        Ok(completed)
    }

    /// Finalize a message as failed and mark the owning session `Failed`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on persistence failure.
    pub async fn fail_message(&self, message_id: &str, error_text: &str) -> Result<WorkMessage> {
        let failed = self.messages.fail(message_id, error_text).await?;
        self.finish_session(&failed.session_id, SessionStatus::Failed)
            .await;
        Ok(failed)
    }

    /// Close a session (owner only, from `Active` or `Paused`).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unauthorized` for a non-owner,
    /// `AppError::InvalidState` for an illegal transition.
    pub async fn close(&self, session_id: &str, requester_id: &str) -> Result<WorkSession> {
        self.finalize_by_owner(session_id, requester_id, SessionStatus::Completed)
            .await
    }

    /// Cancel a session (owner only, from `Active` or `Paused`). Terminal.
    ///
    /// Cancellation only prevents future claims; an in-flight message runs
    /// to completion, timeout, or crash.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unauthorized` for a non-owner,
    /// `AppError::InvalidState` for an illegal transition.
    pub async fn cancel(&self, session_id: &str, requester_id: &str) -> Result<WorkSession> {
        self.finalize_by_owner(session_id, requester_id, SessionStatus::Cancelled)
            .await
    }

    /// Sweep active sessions whose messages have all finished and derive a
    /// terminal status: `Failed` if any message failed, else `Completed`.
    ///
    /// Self-healing pass against crash-induced inconsistency.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on persistence failure.
    pub async fn reconcile_stale(&self) -> Result<ReconcileCounts> {
        let mut counts = ReconcileCounts::default();

        for session in self.sessions.list_active().await? {
            let messages = self.messages.list_for_session(&session.id).await?;
            if messages.is_empty() {
                continue;
            }

            let has_open = messages.iter().any(|m| {
                matches!(m.status, MessageStatus::Pending | MessageStatus::Processing)
            });
            if has_open {
                continue;
            }

            let has_failed = messages.iter().any(|m| m.status == MessageStatus::Failed);
            let next = if has_failed {
                counts.failed += 1;
                SessionStatus::Failed
            } else {
                counts.completed += 1;
                SessionStatus::Completed
            };
            self.sessions.update_status(&session.id, next).await?;
            info!(session_id = session.id, status = ?next, "stale session reconciled");
        }

        Ok(counts)
    }

    /// Fail any message left in `processing` by a previous worker run.
    ///
    /// Run once at startup before the poll loop; the subsequent
    /// [`reconcile_stale`](Self::reconcile_stale) sweep derives terminal
    /// session statuses.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on persistence failure.
    pub async fn recover_orphaned(&self) -> Result<u32> {
        let orphans = self.messages.list_processing().await?;
        let mut recovered = 0u32;

        for message in orphans {
            warn!(
                message_id = message.id,
                session_id = message.session_id,
                "orphaned in-flight message found; failing"
            );
            self.fail_message(&message.id, "worker restarted before completing this message")
                .await?;
            recovered += 1;
        }

        Ok(recovered)
    }

    /// Move the session to a terminal status, tolerating sessions that
    /// already reached a terminal state while the message was in flight
    /// (e.g. cancelled mid-execution).
    async fn finish_session(&self, session_id: &str, status: SessionStatus) {
        match self.sessions.update_status(session_id, status).await {
            Ok(_) => {}
            Err(AppError::InvalidState(msg)) => {
                warn!(session_id, %msg, "session left in current status");
            }
            Err(err) => {
                error!(session_id, %err, "failed to update session status");
            }
        }
    }

    async fn finalize_by_owner(
        &self,
        session_id: &str,
        requester_id: &str,
        status: SessionStatus,
    ) -> Result<WorkSession> {
        let session = self.sessions.get_by_id(session_id).await?;
        if session.requester_id != requester_id {
            return Err(AppError::Unauthorized(
                "only the session owner can close or cancel a session".into(),
            ));
        }
        if !matches!(
            session.status,
            SessionStatus::Active | SessionStatus::Paused
        ) {
            return Err(AppError::InvalidState(format!(
                "cannot finalize a {:?} session",
                session.status
            )));
        }

        self.sessions.update_status(session_id, status).await
    }
}

/// Spawn the periodic stale-session reconciliation task.
///
/// Runs [`WorkQueue::reconcile_stale`] every five minutes until the
/// cancellation token fires.
#[must_use]
pub fn spawn_reconcile_task(queue: WorkQueue, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RECONCILE_INTERVAL);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("reconcile task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    match queue.reconcile_stale().await {
                        Ok(counts) if counts.completed + counts.failed > 0 => {
                            info!(
                                completed = counts.completed,
                                failed = counts.failed,
                                "reconcile sweep repaired stale sessions"
                            );
                        }
                        Ok(_) => {}
                        Err(err) => error!(%err, "reconcile sweep failed"),
                    }
                }
            }
        }
    })
}
