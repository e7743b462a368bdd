//! Worker poll loop.
//!
//! Claims the highest-priority pending message, drives the agent CLI
//! through the configured execution strategy, persists progress snapshots
//! and final state, and announces lifecycle events to the hub. Every exit
//! path — success, timeout, crash — releases the worker identity back to
//! `Online` and never leaves a message stuck in `Processing`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::GlobalConfig;
use crate::driver::{AgentDriver, ProgressUpdate, SendOutcome};
use crate::models::message::WorkMessage;
use crate::models::session::WorkSession;
use crate::notify::client::HubClient;
use crate::notify::{NotifyPriority, WorkerStatus};
use crate::orchestrator::prompt::build_prompt;
use crate::queue::WorkQueue;
use crate::Result;

/// Maximum characters of the response echoed into notifications.
const SUMMARY_LIMIT: usize = 500;

/// Orchestrates one worker identity over one driver instance.
pub struct Worker {
    config: Arc<GlobalConfig>,
    queue: WorkQueue,
    driver: Arc<dyn AgentDriver>,
    hub: Arc<HubClient>,
}

impl Worker {
    /// Assemble a worker from its collaborators.
    #[must_use]
    pub fn new(
        config: Arc<GlobalConfig>,
        queue: WorkQueue,
        driver: Arc<dyn AgentDriver>,
        hub: Arc<HubClient>,
    ) -> Self {
        Self {
            config,
            queue,
            driver,
            hub,
        }
    }

    /// Run the poll loop until the cancellation token fires, then tear
    /// down all live process sessions and mark the worker offline.
    pub async fn run(&self, cancel: CancellationToken) {
        if let Err(err) = self.hub.set_status(WorkerStatus::Online).await {
            warn!(%err, "failed to report online status");
        }
        info!(
            worker_id = self.config.worker_id,
            poll_seconds = self.config.poll_interval_seconds,
            "worker poll loop started"
        );

        let poll_interval = Duration::from_secs(self.config.poll_interval_seconds);
        loop {
            if let Err(err) = self.poll_once().await {
                error!(%err, "poll cycle failed");
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(poll_interval) => {}
            }
        }

        info!("worker shutting down; killing live process sessions");
        self.driver.kill_all().await;
        if let Err(err) = self.hub.set_status(WorkerStatus::Offline).await {
            warn!(%err, "failed to report offline status");
        }
    }

    /// One poll cycle: claim, execute, finalize.
    async fn poll_once(&self) -> Result<()> {
        let Some((message, session)) = self.queue.claim_next(&self.config.worker_id).await? else {
            return Ok(());
        };

        let span = info_span!("process_message", message_id = message.id, session_id = session.id);
        self.process_claim(message, session).instrument(span).await
    }

    /// Handle one claimed message end to end.
    async fn process_claim(&self, message: WorkMessage, session: WorkSession) -> Result<()> {
        if let Err(err) = self.hub.set_status(WorkerStatus::Processing).await {
            warn!(%err, "failed to report processing status");
        }

        let mode = if session.resume_handle.is_some() {
            "follow-up in"
        } else {
            "new message for"
        };
        self.hub
            .announce(
                &session.requester_id,
                &format!(
                    "Processing {mode} session: **{}**\nSession ID: `{}`",
                    session.title, session.id
                ),
                NotifyPriority::High,
            )
            .await;

        let started = Instant::now();
        match self.execute(&message, &session).await {
            Ok(outcome) => {
                let elapsed = started.elapsed();
                self.finalize_success(&message, &session, outcome, elapsed)
                    .await?;
            }
            Err(err) => {
                let text = err.to_string();
                error!(%text, message_id = message.id, "message execution failed");
                self.queue.fail_message(&message.id, &text).await?;
                self.hub
                    .announce(
                        &session.requester_id,
                        &format!(
                            "Failed: **{}**\nSession: `{}`\nError: {text}",
                            session.title, session.id
                        ),
                        NotifyPriority::Urgent,
                    )
                    .await;
            }
        }

        if let Err(err) = self.hub.set_status(WorkerStatus::Online).await {
            warn!(%err, "failed to report online status");
        }
        Ok(())
    }

    /// Drive one message through the CLI: spawn (resuming if the session
    /// has a handle), send, then exit gracefully to capture the handle for
    /// the next turn. The process session is killed on any error so the
    /// next claim starts from a clean spawn.
    async fn execute(&self, message: &WorkMessage, session: &WorkSession) -> Result<SendOutcome> {
        let working_dir = session
            .working_directory
            .as_ref()
            .map_or_else(|| self.config.default_working_dir.clone(), PathBuf::from);
        let prompt = build_prompt(message, session);

        let process_id = self
            .driver
            .spawn(&working_dir, session.resume_handle.as_deref())
            .await?;

        let (progress_tx, progress_rx) = mpsc::channel::<ProgressUpdate>(8);
        let persister = spawn_progress_persister(self.queue.clone(), message.id.clone(), progress_rx);

        let timeout = Duration::from_secs(self.config.timeouts.execution_seconds);
        let send_result = self
            .driver
            .send(&process_id, &prompt, timeout, progress_tx)
            .await;

        let outcome = match send_result {
            Ok(mut outcome) => {
                // The handle printed at exit supersedes anything captured
                // during the response wait.
                match self.driver.exit(&process_id).await {
                    Ok(Some(handle)) => outcome.resume_handle = Some(handle),
                    Ok(None) => {}
                    Err(err) => warn!(%err, "graceful exit failed after send"),
                }
                outcome
            }
            Err(err) => {
                self.driver.kill(&process_id).await;
                persister.abort();
                return Err(err);
            }
        };

        persister.abort();
        Ok(outcome)
    }

    async fn finalize_success(
        &self,
        message: &WorkMessage,
        session: &WorkSession,
        outcome: SendOutcome,
        elapsed: Duration,
    ) -> Result<()> {
        let mut text = outcome.text;
        if outcome.timed_out {
            text.push_str(&format!(
                "\n\n[timed out after {}s; output may be partial]",
                elapsed.as_secs()
            ));
        }

        let result = serde_json::Value::String(text.clone());
        self.queue
            .complete_message(&message.id, &result, outcome.resume_handle.as_deref())
            .await?;

        let summary: String = text.chars().take(SUMMARY_LIMIT).collect();
        self.hub
            .announce(
                &session.requester_id,
                &format!(
                    "Completed: **{}**\nSession: `{}`\nDuration: {}s\n\n{summary}",
                    session.title,
                    session.id,
                    elapsed.as_secs()
                ),
                NotifyPriority::Normal,
            )
            .await;

        info!(
            message_id = message.id,
            elapsed_secs = elapsed.as_secs(),
            timed_out = outcome.timed_out,
            "message completed"
        );
        Ok(())
    }
}

/// Persist partial-response snapshots onto the in-flight message row.
///
/// Write failures are logged and swallowed — progress is advisory.
fn spawn_progress_persister(
    queue: WorkQueue,
    message_id: String,
    mut progress_rx: mpsc::Receiver<ProgressUpdate>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(update) = progress_rx.recv().await {
            if let Err(err) = queue
                .messages()
                .update_progress(&message_id, &update.snapshot)
                .await
            {
                warn!(%err, message_id, "failed to persist progress snapshot");
            }
        }
    })
}
