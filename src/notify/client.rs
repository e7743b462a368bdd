//! Hub REST client with a small buffered send queue.

use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::HubConfig;
use crate::notify::{NotifyPriority, WorkerStatus};
use crate::{AppError, Result};

const QUEUE_CAPACITY: usize = 256;
const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 3;

/// One outgoing notification. Exactly one of `recipient_id` / `channel`
/// is set per message; [`HubClient::announce`] fans out to both targets.
#[derive(Debug, Clone)]
struct Notification {
    recipient_id: Option<String>,
    channel: Option<String>,
    text: String,
    priority: NotifyPriority,
}

/// Hub REST wrapper that owns a best-effort outgoing queue.
///
/// Queued messages are posted by a background task with capped exponential
/// backoff; a message that keeps failing is dropped with a warning rather
/// than wedging the queue.
pub struct HubClient {
    http: reqwest::Client,
    base_url: String,
    auth_token: String,
    worker_id: String,
    work_log_channel: String,
    queue_tx: mpsc::Sender<Notification>,
}

impl HubClient {
    /// Start the client and its background sender task.
    #[must_use]
    pub fn start(config: &HubConfig, worker_id: &str) -> (Self, JoinHandle<()>) {
        let http = reqwest::Client::new();
        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);

        let sender_task = spawn_sender(
            http.clone(),
            config.base_url.clone(),
            config.auth_token.clone(),
            worker_id.to_owned(),
            queue_rx,
        );

        info!(base_url = config.base_url, "hub client started");

        (
            Self {
                http,
                base_url: config.base_url.clone(),
                auth_token: config.auth_token.clone(),
                worker_id: worker_id.to_owned(),
                work_log_channel: config.work_log_channel.clone(),
                queue_tx,
            },
            sender_task,
        )
    }

    /// Queue one notification for a recipient and/or channel.
    pub async fn notify(
        &self,
        recipient_id: Option<&str>,
        channel: Option<&str>,
        text: &str,
        priority: NotifyPriority,
    ) {
        self.enqueue(Notification {
            recipient_id: recipient_id.map(str::to_owned),
            channel: channel.map(str::to_owned),
            text: text.to_owned(),
            priority,
        })
        .await;
    }

    /// Deliver `text` to the requester as a direct message and mirror it to
    /// the work-log channel. Each target is independently best-effort.
    pub async fn announce(&self, recipient_id: &str, text: &str, priority: NotifyPriority) {
        self.notify(Some(recipient_id), None, text, priority).await;
        let channel = self.work_log_channel.clone();
        self.notify(None, Some(&channel), text, priority).await;
    }

    /// Report the worker's availability to the hub.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Notify` if the request fails; callers log and
    /// continue.
    pub async fn set_status(&self, status: WorkerStatus) -> Result<()> {
        let url = format!(
            "{}/api/agents/{}/status",
            self.base_url.trim_end_matches('/'),
            self.worker_id
        );
        let body = json!({ "status": status.as_str() });

        let mut request = self.http.put(&url).json(&body);
        if !self.auth_token.is_empty() {
            request = request.bearer_auth(&self.auth_token);
        }

        let response = request
            .send()
            .await
            .map_err(|err| AppError::Notify(format!("status update failed: {err}")))?;
        response
            .error_for_status()
            .map_err(|err| AppError::Notify(format!("status update rejected: {err}")))?;

        Ok(())
    }

    async fn enqueue(&self, notification: Notification) {
        if self.queue_tx.send(notification).await.is_err() {
            warn!("hub notification queue closed; message dropped");
        }
    }
}

fn spawn_sender(
    http: reqwest::Client,
    base_url: String,
    auth_token: String,
    worker_id: String,
    mut queue_rx: mpsc::Receiver<Notification>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let url = format!("{}/api/messages", base_url.trim_end_matches('/'));

        while let Some(notification) = queue_rx.recv().await {
            let body = json!({
                "sender_id": worker_id,
                "recipient_id": notification.recipient_id,
                "channel": notification.channel,
                "content": notification.text,
                "priority": notification.priority.as_str(),
            });

            let mut backoff = INITIAL_RETRY_DELAY;
            for attempt in 1..=MAX_ATTEMPTS {
                let mut request = http.post(&url).json(&body);
                if !auth_token.is_empty() {
                    request = request.bearer_auth(&auth_token);
                }

                match request.send().await.and_then(|r| r.error_for_status()) {
                    Ok(_) => break,
                    Err(error) if attempt == MAX_ATTEMPTS => {
                        warn!(%error, attempts = MAX_ATTEMPTS, "hub notification dropped");
                    }
                    Err(error) => {
                        warn!(%error, attempt, "hub post failed; retrying");
                        sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_RETRY_DELAY);
                    }
                }
            }
        }
        info!("hub sender task exiting");
    })
}
