//! One-shot execution strategy.
//!
//! Runs one non-interactive `--print` subprocess per message instead of
//! holding a persistent PTY session. Conversation continuity still works:
//! the CLI's resume flag reattaches the prior conversation, and the JSON
//! output carries the handle for the next turn. No partial output exists
//! in this mode, so progress snapshots are never emitted.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AgentCliConfig;
use crate::driver::{AgentDriver, ProgressUpdate, SendOutcome};
use crate::{AppError, Result};

/// Registered conversation context for one logical process session.
struct OneShotSession {
    working_dir: PathBuf,
    resume_handle: Option<String>,
}

/// Driver that shells out to the agent CLI once per message.
pub struct OneShotDriver {
    cli: AgentCliConfig,
    sessions: Mutex<HashMap<String, OneShotSession>>,
}

impl OneShotDriver {
    /// Build a driver from configuration.
    #[must_use]
    pub fn new(cli: AgentCliConfig) -> Self {
        Self {
            cli,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    async fn send_inner(
        &self,
        session_id: &str,
        prompt: &str,
        timeout: Duration,
    ) -> Result<SendOutcome> {
        let (working_dir, resume_handle) = {
            let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            let session = sessions.get(session_id).ok_or_else(|| {
                AppError::NotFound(format!("process session {session_id} not found"))
            })?;
            (session.working_dir.clone(), session.resume_handle.clone())
        };

        let mut cmd = Command::new(&self.cli.command);
        cmd.args(&self.cli.args)
            .arg("--print")
            .arg(prompt)
            .arg("--output-format")
            .arg("json");
        if let Some(ref handle) = resume_handle {
            cmd.arg(&self.cli.resume_flag).arg(handle);
        }
        cmd.current_dir(&working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for key in &self.cli.env_blocklist {
            cmd.env_remove(key);
        }

        let run = async {
            cmd.output()
                .await
                .map_err(|err| AppError::Spawn(format!("failed to run {}: {err}", self.cli.command)))
        };

        let output = match tokio::time::timeout(timeout, run).await {
            Ok(result) => result?,
            Err(_) => {
                // The dropped future kills the child (kill_on_drop). No
                // partial output exists in print mode.
                warn!(session_id, "one-shot execution hit ceiling timeout");
                return Ok(SendOutcome {
                    text: String::new(),
                    resume_handle,
                    timed_out: true,
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::ProcessCrash(format!(
                "agent CLI exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let (text, new_handle) = parse_print_output(stdout.trim());

        if let Some(ref handle) = new_handle {
            let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(session) = sessions.get_mut(session_id) {
                session.resume_handle = Some(handle.clone());
            }
        }

        Ok(SendOutcome {
            text,
            resume_handle: new_handle.or(resume_handle),
            timed_out: false,
        })
    }
}

/// Extract the response text and session handle from `--output-format json`
/// stdout. Non-JSON output falls back to the raw text with no handle.
#[must_use]
pub fn parse_print_output(stdout: &str) -> (String, Option<String>) {
    match serde_json::from_str::<serde_json::Value>(stdout) {
        Ok(value) => {
            let text = value
                .get("result")
                .and_then(serde_json::Value::as_str)
                .map_or_else(|| value.to_string(), str::to_owned);
            let handle = value
                .get("session_id")
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned);
            (text, handle)
        }
        Err(_) => (stdout.to_owned(), None),
    }
}

impl AgentDriver for OneShotDriver {
    fn spawn(
        &self,
        working_dir: &Path,
        resume_handle: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        let working_dir = working_dir.to_owned();
        let resume_handle = resume_handle.map(str::to_owned);
        Box::pin(async move {
            let id = Uuid::new_v4().to_string();
            self.sessions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(
                    id.clone(),
                    OneShotSession {
                        working_dir,
                        resume_handle,
                    },
                );
            info!(session_id = id, "one-shot session registered");
            Ok(id)
        })
    }

    fn send(
        &self,
        session_id: &str,
        prompt: &str,
        timeout: Duration,
        _progress: mpsc::Sender<ProgressUpdate>,
    ) -> Pin<Box<dyn Future<Output = Result<SendOutcome>> + Send + '_>> {
        let session_id = session_id.to_owned();
        let prompt = prompt.to_owned();
        Box::pin(async move { self.send_inner(&session_id, &prompt, timeout).await })
    }

    fn exit(
        &self,
        session_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + '_>> {
        let session_id = session_id.to_owned();
        Box::pin(async move {
            let removed = self
                .sessions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&session_id)
                .ok_or_else(|| {
                    AppError::NotFound(format!("process session {session_id} not found"))
                })?;
            Ok(removed.resume_handle)
        })
    }

    fn kill(&self, session_id: &str) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        let session_id = session_id.to_owned();
        Box::pin(async move {
            self.sessions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&session_id);
        })
    }

    fn kill_all(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.sessions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        })
    }
}
