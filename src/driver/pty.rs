//! Persistent PTY execution strategy.
//!
//! Spawns the agent CLI inside a pseudo-terminal, feeds prompts through the
//! master side in small bounded chunks, and infers completion from the
//! response-start marker plus a quiet period — the CLI gives no structured
//! completion signal. A dedicated OS thread drains the PTY reader into a
//! shared transcript buffer; async tasks only ever poll that shared state.

use std::collections::HashMap;
use std::future::Future;
use std::io::{Read, Write};
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, PtySize};
use regex::Regex;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{AgentCliConfig, InputConfig, MarkerConfig, TimeoutConfig};
use crate::driver::extract::{extract_response, extract_resume_handle};
use crate::driver::{AgentDriver, ProcessState, ProgressUpdate, SendOutcome};
use crate::terminal::normalize;
use crate::{AppError, Result};

/// Key sequence the CLI recognizes as "execute what I just typed".
const SUBMIT_SIGNAL: &str = "\r";

/// Graceful-exit command understood by the CLI.
const EXIT_COMMAND: &str = "/exit";

/// Cadence for polling the shared transcript while waiting.
const POLL_TICK: Duration = Duration::from_millis(250);

/// Transcript state shared between the reader thread and async waiters.
struct StreamState {
    transcript: String,
    last_output: Instant,
}

/// One live PTY-attached process, owned exclusively by the driver.
struct PtySession {
    child: Mutex<Box<dyn portable_pty::Child + Send + Sync>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    writer: Mutex<Box<dyn Write + Send>>,
    stream: Arc<Mutex<StreamState>>,
    state: Mutex<ProcessState>,
}

impl PtySession {
    fn set_state(&self, next: ProcessState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Snapshot of (full transcript, seconds since last output).
    fn snapshot(&self) -> (String, Duration) {
        let stream = self.stream.lock().unwrap_or_else(PoisonError::into_inner);
        (stream.transcript.clone(), stream.last_output.elapsed())
    }

    fn transcript_len(&self) -> usize {
        self.stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .transcript
            .len()
    }

    fn has_exited(&self) -> bool {
        self.child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_wait()
            .map_or(true, |status| status.is_some())
    }

    fn write_text(&self, text: &str) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer
            .write_all(text.as_bytes())
            .and_then(|()| writer.flush())
            .map_err(|err| AppError::Io(format!("pty write failed: {err}")))
    }

    fn force_kill(&self) {
        let mut killer = self.killer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = killer.kill() {
            debug!(%err, "pty kill failed (process likely already gone)");
        }
        self.set_state(ProcessState::Killed);
    }
}

/// Driver that owns a registry of live PTY sessions keyed by session ID.
///
/// All mutation goes through `spawn` / `exit` / `kill` — process handles
/// never escape this struct.
pub struct PtyDriver {
    cli: AgentCliConfig,
    timeouts: TimeoutConfig,
    input: InputConfig,
    markers: MarkerConfig,
    resume_pattern: Regex,
    sessions: Mutex<HashMap<String, Arc<PtySession>>>,
}

impl PtyDriver {
    /// Build a driver from configuration, compiling the resume pattern.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `markers.resume_pattern` is not a
    /// valid regular expression.
    pub fn new(
        cli: AgentCliConfig,
        timeouts: TimeoutConfig,
        input: InputConfig,
        markers: MarkerConfig,
    ) -> Result<Self> {
        let resume_pattern = Regex::new(&markers.resume_pattern)
            .map_err(|err| AppError::Config(format!("invalid resume_pattern: {err}")))?;

        Ok(Self {
            cli,
            timeouts,
            input,
            markers,
            resume_pattern,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    fn get_session(&self, session_id: &str) -> Result<Arc<PtySession>> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("process session {session_id} not found")))
    }

    fn remove_session(&self, session_id: &str) -> Option<Arc<PtySession>> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
    }

    async fn spawn_inner(
        &self,
        working_dir: &Path,
        resume_handle: Option<&str>,
    ) -> Result<String> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: self.cli.rows,
                cols: self.cli.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|err| AppError::Spawn(format!("failed to open pty: {err}")))?;

        let mut cmd = CommandBuilder::new(&self.cli.command);
        cmd.args(&self.cli.args);
        if let Some(handle) = resume_handle {
            cmd.arg(&self.cli.resume_flag);
            cmd.arg(handle);
        }
        cmd.cwd(working_dir);
        cmd.env("TERM", "xterm-256color");
        // The CLI must use its own stored credentials, not ours.
        for key in &self.cli.env_blocklist {
            cmd.env_remove(key);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|err| AppError::Spawn(format!("failed to spawn {}: {err}", self.cli.command)))?;
        // Close our copy of the slave so reads observe EOF on process exit.
        drop(pair.slave);

        let killer = child.clone_killer();
        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|err| AppError::Spawn(format!("failed to clone pty reader: {err}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|err| AppError::Spawn(format!("failed to take pty writer: {err}")))?;

        let stream = Arc::new(Mutex::new(StreamState {
            transcript: String::new(),
            last_output: Instant::now(),
        }));
        spawn_reader_thread(reader, Arc::clone(&stream));

        let session = Arc::new(PtySession {
            child: Mutex::new(child),
            killer: Mutex::new(killer),
            writer: Mutex::new(writer),
            stream,
            state: Mutex::new(ProcessState::Spawning),
        });

        let id = Uuid::new_v4().to_string();
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), Arc::clone(&session));

        info!(
            session_id = id,
            command = self.cli.command,
            cwd = %working_dir.display(),
            resume = resume_handle.is_some(),
            "agent process spawned"
        );

        if let Err(err) = self.wait_for_ready(&session).await {
            self.remove_session(&id);
            session.force_kill();
            return Err(err);
        }

        session.set_state(ProcessState::Ready);
        Ok(id)
    }

    /// Block until the process looks idle: some output followed by a quiet
    /// period, bounded by the startup timeout. On bound expiry we proceed
    /// anyway — some valid startup sequences produce no output at all. A
    /// known trust prompt is answered once with the submit signal, after
    /// which readiness detection restarts.
    async fn wait_for_ready(&self, session: &PtySession) -> Result<()> {
        let started = Instant::now();
        let startup_bound = Duration::from_secs(self.timeouts.startup_seconds);
        let ready_quiet = Duration::from_secs(self.timeouts.ready_quiet_seconds);
        let mut trust_answered = false;

        loop {
            sleep(POLL_TICK).await;

            let (transcript, quiet_for) = session.snapshot();

            if session.has_exited() {
                let tail = last_lines(&normalize(&transcript), 5);
                return Err(AppError::Spawn(format!(
                    "agent process exited during startup: {tail}"
                )));
            }

            if !trust_answered && normalize(&transcript).contains(&self.markers.trust_prompt) {
                info!("trust prompt detected; answering with submit signal");
                session.write_text(SUBMIT_SIGNAL)?;
                trust_answered = true;
                continue;
            }

            if !transcript.is_empty() && quiet_for >= ready_quiet {
                return Ok(());
            }

            if started.elapsed() >= startup_bound {
                warn!("readiness detection timed out; proceeding anyway");
                return Ok(());
            }
        }
    }

    async fn send_inner(
        &self,
        session_id: &str,
        prompt: &str,
        timeout: Duration,
        progress: mpsc::Sender<ProgressUpdate>,
    ) -> Result<SendOutcome> {
        let session = self.get_session(session_id)?;
        session.set_state(ProcessState::Busy);
        let offset = session.transcript_len();

        self.write_chunked(&session, prompt).await?;
        session.write_text(SUBMIT_SIGNAL)?;

        let started = Instant::now();
        let quiet_period = Duration::from_secs(self.timeouts.quiet_period_seconds);
        let progress_interval = Duration::from_secs(self.input.progress_interval_seconds);
        let mut last_progress = Instant::now();
        let mut timed_out = false;

        loop {
            sleep(POLL_TICK).await;

            let (transcript, quiet_for) = session.snapshot();
            let slice = transcript.get(offset..).unwrap_or_default();
            let marker_seen = slice.contains(self.markers.response_start.as_str());

            if session.has_exited() {
                session.set_state(ProcessState::Closed);
                self.remove_session(session_id);
                let partial = extract_response(slice, &self.markers);
                return Err(AppError::ProcessCrash(format!(
                    "agent process exited mid-response; partial output: {partial}"
                )));
            }

            // Both conditions required: an initial burst of echo/status
            // output must not count as a finished answer.
            if marker_seen && quiet_for >= quiet_period {
                break;
            }

            if started.elapsed() >= timeout {
                warn!(
                    session_id,
                    elapsed_secs = started.elapsed().as_secs(),
                    "send hit ceiling timeout; returning partial output"
                );
                timed_out = true;
                break;
            }

            if last_progress.elapsed() >= progress_interval {
                last_progress = Instant::now();
                let snapshot = extract_response(slice, &self.markers);
                if !snapshot.is_empty() {
                    // Fire-and-forget: a slow or closed sink never blocks the wait.
                    let _ = progress.try_send(ProgressUpdate { snapshot });
                }
            }
        }

        let (transcript, _) = session.snapshot();
        let slice = transcript.get(offset..).unwrap_or_default();
        let text = extract_response(slice, &self.markers);
        let resume_handle = extract_resume_handle(&transcript, &self.resume_pattern);

        session.set_state(ProcessState::Ready);
        debug!(
            session_id,
            chars = text.len(),
            timed_out,
            "response collected"
        );

        Ok(SendOutcome {
            text,
            resume_handle,
            timed_out,
        })
    }

    /// Write the prompt in small bounded chunks with a short inter-chunk
    /// delay so the terminal's input buffer never drops bytes.
    async fn write_chunked(&self, session: &PtySession, prompt: &str) -> Result<()> {
        let chars: Vec<char> = prompt.chars().collect();
        let delay = Duration::from_millis(self.input.chunk_delay_ms);

        for chunk in chars.chunks(self.input.chunk_chars) {
            let piece: String = chunk.iter().collect();
            session.write_text(&piece)?;
            sleep(delay).await;
        }
        Ok(())
    }

    async fn exit_inner(&self, session_id: &str) -> Result<Option<String>> {
        let session = self
            .remove_session(session_id)
            .ok_or_else(|| AppError::NotFound(format!("process session {session_id} not found")))?;
        session.set_state(ProcessState::Exiting);
        if let Err(err) = session.write_text(&format!("{EXIT_COMMAND}{SUBMIT_SIGNAL}")) {
            debug!(%err, "exit command write failed; process may already be gone");
        }

        let grace = Duration::from_secs(self.timeouts.exit_grace_seconds);
        let started = Instant::now();
        let exited_gracefully = loop {
            if session.has_exited() {
                break true;
            }
            if started.elapsed() >= grace {
                break false;
            }
            sleep(POLL_TICK).await;
        };

        if exited_gracefully {
            session.set_state(ProcessState::Closed);
            info!(session_id, "agent process exited gracefully");
        } else {
            warn!(session_id, "agent process did not exit within grace period; killing");
            session.force_kill();
        }

        // Give the reader thread a beat to drain the exit transcript.
        sleep(POLL_TICK).await;
        let (transcript, _) = session.snapshot();
        Ok(extract_resume_handle(&transcript, &self.resume_pattern))
    }
}

impl AgentDriver for PtyDriver {
    fn spawn(
        &self,
        working_dir: &Path,
        resume_handle: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        let working_dir = working_dir.to_owned();
        let resume_handle = resume_handle.map(str::to_owned);
        Box::pin(async move { self.spawn_inner(&working_dir, resume_handle.as_deref()).await })
    }

    fn send(
        &self,
        session_id: &str,
        prompt: &str,
        timeout: Duration,
        progress: mpsc::Sender<ProgressUpdate>,
    ) -> Pin<Box<dyn Future<Output = Result<SendOutcome>> + Send + '_>> {
        let session_id = session_id.to_owned();
        let prompt = prompt.to_owned();
        Box::pin(async move { self.send_inner(&session_id, &prompt, timeout, progress).await })
    }

    fn exit(
        &self,
        session_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + '_>> {
        let session_id = session_id.to_owned();
        Box::pin(async move { self.exit_inner(&session_id).await })
    }

    fn kill(&self, session_id: &str) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        let session_id = session_id.to_owned();
        Box::pin(async move {
            if let Some(session) = self.remove_session(&session_id) {
                info!(session_id, "killing process session");
                session.force_kill();
            }
        })
    }

    fn kill_all(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let drained: Vec<(String, Arc<PtySession>)> = self
                .sessions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .drain()
                .collect();
            for (id, session) in drained {
                info!(session_id = id, "killing process session");
                session.force_kill();
            }
        })
    }
}

/// Drain the PTY reader on a dedicated OS thread.
///
/// Reads are blocking, so they cannot live on the async runtime. The thread
/// ends when the reader hits EOF or an error, which happens once the child
/// exits and the master side is drained.
fn spawn_reader_thread(mut reader: Box<dyn Read + Send>, stream: Arc<Mutex<StreamState>>) {
    std::thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let chunk = String::from_utf8_lossy(&buf[..n]);
                    let mut state = stream.lock().unwrap_or_else(PoisonError::into_inner);
                    state.transcript.push_str(&chunk);
                    state.last_output = Instant::now();
                }
            }
        }
    });
}

/// Last `n` non-empty lines of a transcript, joined for error context.
fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join(" | ")
}
