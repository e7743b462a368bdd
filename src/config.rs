//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Execution strategy used to drive the interactive agent CLI.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Persistent interactive session in a pseudo-terminal.
    Pty,
    /// One non-interactive `--print` subprocess per message.
    Oneshot,
}

/// Settings for the driven agent CLI process.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentCliConfig {
    /// CLI binary (e.g., `claude`).
    #[serde(default = "default_command")]
    pub command: String,
    /// Default arguments passed on every spawn.
    #[serde(default)]
    pub args: Vec<String>,
    /// Flag used to reattach a prior conversation.
    #[serde(default = "default_resume_flag")]
    pub resume_flag: String,
    /// Execution strategy selection.
    #[serde(default = "default_strategy")]
    pub strategy: StrategyKind,
    /// Terminal width for the PTY.
    #[serde(default = "default_cols")]
    pub cols: u16,
    /// Terminal height for the PTY.
    #[serde(default = "default_rows")]
    pub rows: u16,
    /// Environment variables removed from the child process.
    #[serde(default = "default_env_blocklist")]
    pub env_blocklist: Vec<String>,
}

fn default_command() -> String {
    "claude".into()
}

fn default_resume_flag() -> String {
    "--resume".into()
}

fn default_strategy() -> StrategyKind {
    StrategyKind::Pty
}

fn default_cols() -> u16 {
    200
}

fn default_rows() -> u16 {
    50
}

fn default_env_blocklist() -> Vec<String> {
    vec!["ANTHROPIC_API_KEY".into()]
}

/// Configurable timeout values (seconds) for driver interactions.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Spawn readiness ceiling.
    #[serde(default = "default_startup_seconds")]
    pub startup_seconds: u64,
    /// Quiet period after which a freshly spawned process counts as ready.
    #[serde(default = "default_ready_quiet_seconds")]
    pub ready_quiet_seconds: u64,
    /// Per-message execution ceiling.
    #[serde(default = "default_execution_seconds")]
    pub execution_seconds: u64,
    /// Quiet period after which a started response counts as complete.
    #[serde(default = "default_quiet_period_seconds")]
    pub quiet_period_seconds: u64,
    /// Bound on graceful process exit before force-kill.
    #[serde(default = "default_exit_grace_seconds")]
    pub exit_grace_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            startup_seconds: default_startup_seconds(),
            ready_quiet_seconds: default_ready_quiet_seconds(),
            execution_seconds: default_execution_seconds(),
            quiet_period_seconds: default_quiet_period_seconds(),
            exit_grace_seconds: default_exit_grace_seconds(),
        }
    }
}

fn default_startup_seconds() -> u64 {
    30
}

fn default_ready_quiet_seconds() -> u64 {
    2
}

fn default_execution_seconds() -> u64 {
    1800
}

fn default_quiet_period_seconds() -> u64 {
    5
}

fn default_exit_grace_seconds() -> u64 {
    5
}

/// Prompt delivery and progress cadence settings.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct InputConfig {
    /// Maximum characters written to the PTY per chunk.
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    /// Delay between chunks (milliseconds).
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
    /// Interval between partial-response snapshots (seconds).
    #[serde(default = "default_progress_interval_seconds")]
    pub progress_interval_seconds: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            chunk_chars: default_chunk_chars(),
            chunk_delay_ms: default_chunk_delay_ms(),
            progress_interval_seconds: default_progress_interval_seconds(),
        }
    }
}

fn default_chunk_chars() -> usize {
    200
}

fn default_chunk_delay_ms() -> u64 {
    25
}

fn default_progress_interval_seconds() -> u64 {
    10
}

/// Textual heuristics for the driven CLI's output stream.
///
/// These depend on the exact glyphs the CLI emits and will drift as the CLI
/// evolves, so they are configuration rather than code.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MarkerConfig {
    /// Glyph that indicates the CLI has begun producing its answer.
    #[serde(default = "default_response_start")]
    pub response_start: String,
    /// Idle prompt glyph.
    #[serde(default = "default_ready_prompt")]
    pub ready_prompt: String,
    /// Startup confirmation prompt answered once with the submit signal.
    #[serde(default = "default_trust_prompt")]
    pub trust_prompt: String,
    /// Regex whose first capture group is the resume handle.
    #[serde(default = "default_resume_pattern")]
    pub resume_pattern: String,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            response_start: default_response_start(),
            ready_prompt: default_ready_prompt(),
            trust_prompt: default_trust_prompt(),
            resume_pattern: default_resume_pattern(),
        }
    }
}

fn default_response_start() -> String {
    "\u{23fa}".into() // ⏺
}

fn default_ready_prompt() -> String {
    "\u{276f}".into() // ❯
}

fn default_trust_prompt() -> String {
    "Do you trust the files in this folder?".into()
}

fn default_resume_pattern() -> String {
    r"claude\s+--resume\s+([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})".into()
}

/// Hub connectivity for notifications and worker status updates.
///
/// The auth token is loaded at runtime from the environment, never from the
/// TOML config file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HubConfig {
    /// Base URL of the hub's REST API.
    pub base_url: String,
    /// Broadcast channel that receives all work-log notifications.
    #[serde(default = "default_work_log_channel")]
    pub work_log_channel: String,
    /// Bearer token for hub requests (populated at runtime).
    #[serde(skip)]
    pub auth_token: String,
}

fn default_work_log_channel() -> String {
    "work-log".into()
}

fn default_poll_interval_seconds() -> u64 {
    5
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Worker identity key used for claims and status updates.
    pub worker_id: String,
    /// Fallback working directory for sessions that specify none.
    pub default_working_dir: PathBuf,
    /// Queue poll cadence (seconds).
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    /// Optional explicit database file path.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Driven agent CLI settings.
    #[serde(default = "default_agent_cli")]
    pub agent_cli: AgentCliConfig,
    /// Timeout settings.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Prompt delivery settings.
    #[serde(default)]
    pub input: InputConfig,
    /// Output-stream heuristics.
    #[serde(default)]
    pub markers: MarkerConfig,
    /// Hub connectivity.
    pub hub: HubConfig,
}

fn default_agent_cli() -> AgentCliConfig {
    AgentCliConfig {
        command: default_command(),
        args: Vec::new(),
        resume_flag: default_resume_flag(),
        strategy: default_strategy(),
        cols: default_cols(),
        rows: default_rows(),
        env_blocklist: default_env_blocklist(),
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the hub auth token from the `RELAY_HUB_TOKEN` environment
    /// variable. An absent token leaves the hub client unauthenticated,
    /// which is valid for local hubs.
    pub fn load_credentials(&mut self) {
        match env::var("RELAY_HUB_TOKEN") {
            Ok(token) if !token.is_empty() => self.hub.auth_token = token,
            _ => warn!("RELAY_HUB_TOKEN not set; hub requests are unauthenticated"),
        }
    }

    /// Resolved path of the `SQLite` database file.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(|| {
            self.default_working_dir
                .join(".agent-relay")
                .join("relay.db")
        })
    }

    fn validate(&mut self) -> Result<()> {
        if self.worker_id.trim().is_empty() {
            return Err(AppError::Config("worker_id must not be empty".into()));
        }

        if self.poll_interval_seconds == 0 {
            return Err(AppError::Config(
                "poll_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.input.chunk_chars == 0 {
            return Err(AppError::Config(
                "input.chunk_chars must be greater than zero".into(),
            ));
        }

        if self.timeouts.execution_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.execution_seconds must be greater than zero".into(),
            ));
        }

        let canonical_dir = self
            .default_working_dir
            .canonicalize()
            .map_err(|err| AppError::Config(format!("default_working_dir invalid: {err}")))?;
        self.default_working_dir = canonical_dir;

        Ok(())
    }
}
