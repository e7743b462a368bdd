//! Strategy-agnostic interactive agent driver abstraction.
//!
//! The [`AgentDriver`] trait decouples the orchestrator and work queue from
//! the mechanics of driving the agent CLI. The canonical implementation
//! holds a persistent PTY session ([`pty::PtyDriver`]); an alternative runs
//! one non-interactive subprocess per message ([`oneshot::OneShotDriver`]).
//! Selecting a strategy never touches the queue or the orchestrator.

pub mod extract;
pub mod oneshot;
pub mod pty;

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::Result;

/// Partial-response snapshot emitted while a send is in flight.
///
/// Delivery is fire-and-forget; a full or closed channel is ignored.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Normalized partial response captured so far.
    pub snapshot: String,
}

/// Outcome of one executed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    /// Extracted response text (possibly partial on timeout).
    pub text: String,
    /// Resume handle recovered from the transcript, if any.
    pub resume_handle: Option<String>,
    /// Whether the ceiling timeout forced the return.
    pub timed_out: bool,
}

/// Lifecycle states of a driven process session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Process started, readiness not yet observed.
    Spawning,
    /// Idle and able to accept input.
    Ready,
    /// A send is in flight.
    Busy,
    /// Graceful exit requested.
    Exiting,
    /// Process ended normally.
    Closed,
    /// Process was force-terminated.
    Killed,
}

/// Uniform "execute one message" contract over a driven agent process.
///
/// Implementations own their process handles exclusively; callers interact
/// through opaque session identifiers only.
pub trait AgentDriver: Send + Sync {
    /// Start a process session in `working_dir`, optionally reattaching a
    /// prior conversation via `resume_handle`. Blocks until the process
    /// looks ready (best-effort, bounded by the startup timeout).
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Spawn`](crate::AppError::Spawn) if the process
    /// cannot be started or dies during startup.
    fn spawn(
        &self,
        working_dir: &Path,
        resume_handle: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;

    /// Deliver a prompt and collect the response.
    ///
    /// Completion is heuristic: the response-start marker has appeared and
    /// output has been quiet for the configured period. Hitting `timeout`
    /// returns whatever was captured with `timed_out` set — never an error.
    /// Partial snapshots go to `progress` at a fixed cadence.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ProcessCrash`](crate::AppError::ProcessCrash)
    /// if the process exits mid-response (partial output embedded), or
    /// [`AppError::NotFound`](crate::AppError::NotFound) for an unknown
    /// session.
    fn send(
        &self,
        session_id: &str,
        prompt: &str,
        timeout: Duration,
        progress: mpsc::Sender<ProgressUpdate>,
    ) -> Pin<Box<dyn Future<Output = Result<SendOutcome>> + Send + '_>>;

    /// Gracefully end the session, extracting any resume handle from the
    /// exit transcript. Force-kills after the grace bound. Always
    /// deregisters the session.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`](crate::AppError::NotFound) for an
    /// unknown session.
    fn exit(&self, session_id: &str) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + '_>>;

    /// Immediately terminate one session. Idempotent.
    fn kill(&self, session_id: &str) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    /// Immediately terminate every live session (shutdown path).
    fn kill_all(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}
