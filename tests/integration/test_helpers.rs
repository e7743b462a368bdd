//! Shared test helpers for queue and worker integration tests.
//!
//! Provides reusable construction of in-memory queues, submit requests,
//! and worker configuration so individual test modules can focus on
//! behaviour rather than boilerplate.

use std::sync::Arc;

use agent_relay::config::{
    AgentCliConfig, GlobalConfig, HubConfig, InputConfig, MarkerConfig, StrategyKind,
    TimeoutConfig,
};
use agent_relay::models::session::Priority;
use agent_relay::persistence::db;
use agent_relay::queue::{SubmitRequest, WorkQueue};

/// Build a `WorkQueue` over a fresh in-memory `SQLite` database.
pub async fn test_queue() -> WorkQueue {
    let pool = Arc::new(db::connect_memory().await.expect("db connect"));
    WorkQueue::new(pool)
}

/// Build a submit request with sensible defaults.
pub fn submit_request(requester: &str, title: &str, priority: Priority) -> SubmitRequest {
    SubmitRequest {
        requester_id: requester.into(),
        kind: "code".into(),
        title: title.into(),
        instructions: format!("instructions for {title}"),
        priority,
        working_directory: None,
        metadata: None,
    }
}

/// Build a worker `GlobalConfig` with a fast poll cadence and a hub
/// endpoint that points nowhere (all hub traffic is best-effort).
#[allow(dead_code)]
pub fn test_config(worker_id: &str) -> GlobalConfig {
    GlobalConfig {
        worker_id: worker_id.into(),
        default_working_dir: std::env::temp_dir(),
        poll_interval_seconds: 1,
        db_path: None,
        agent_cli: AgentCliConfig {
            command: "true".into(),
            args: Vec::new(),
            resume_flag: "--resume".into(),
            strategy: StrategyKind::Pty,
            cols: 120,
            rows: 40,
            env_blocklist: Vec::new(),
        },
        timeouts: TimeoutConfig::default(),
        input: InputConfig::default(),
        markers: MarkerConfig::default(),
        hub: test_hub_config(),
    }
}

/// Hub config pointing at a closed local port.
#[allow(dead_code)]
pub fn test_hub_config() -> HubConfig {
    HubConfig {
        base_url: "http://127.0.0.1:1".into(),
        work_log_channel: "work-log".into(),
        auth_token: String::new(),
    }
}
