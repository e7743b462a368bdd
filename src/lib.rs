#![forbid(unsafe_code)]

//! `agent-relay` — background worker that relays queued work requests from
//! cooperating agents to an interactive CLI coding agent driven through a
//! pseudo-terminal.

pub mod config;
pub mod driver;
pub mod errors;
pub mod models;
pub mod notify;
pub mod orchestrator;
pub mod persistence;
pub mod queue;
pub mod terminal;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
