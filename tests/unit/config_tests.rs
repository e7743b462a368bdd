use agent_relay::config::{GlobalConfig, StrategyKind};
use agent_relay::AppError;

fn minimal_toml(working_dir: &str) -> String {
    format!(
        r#"
worker_id = "relay-worker"
default_working_dir = '{working_dir}'

[hub]
base_url = "http://localhost:3001"
"#
    )
}

#[test]
fn minimal_config_applies_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = GlobalConfig::from_toml_str(&minimal_toml(&dir.path().display().to_string()))
        .expect("valid config");

    assert_eq!(config.worker_id, "relay-worker");
    assert_eq!(config.poll_interval_seconds, 5);
    assert_eq!(config.agent_cli.command, "claude");
    assert_eq!(config.agent_cli.strategy, StrategyKind::Pty);
    assert_eq!(config.agent_cli.cols, 200);
    assert_eq!(config.agent_cli.rows, 50);
    assert_eq!(config.agent_cli.env_blocklist, vec!["ANTHROPIC_API_KEY"]);
    assert_eq!(config.timeouts.execution_seconds, 1800);
    assert_eq!(config.timeouts.quiet_period_seconds, 5);
    assert_eq!(config.input.chunk_chars, 200);
    assert_eq!(config.markers.response_start, "\u{23fa}");
    assert_eq!(config.hub.work_log_channel, "work-log");
    assert!(config.hub.auth_token.is_empty());
}

#[test]
fn empty_worker_id_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let toml = minimal_toml(&dir.path().display().to_string())
        .replace("relay-worker", "  ");

    let err = GlobalConfig::from_toml_str(&toml).expect_err("must fail");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn zero_poll_interval_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        r#"
worker_id = "relay-worker"
default_working_dir = '{root}'
poll_interval_seconds = 0

[hub]
base_url = "http://localhost:3001"
"#,
        root = dir.path().display()
    );

    let err = GlobalConfig::from_toml_str(&toml).expect_err("must fail");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn missing_working_dir_is_rejected() {
    let toml = minimal_toml("/this/path/does/not/exist/at/all");
    let err = GlobalConfig::from_toml_str(&toml).expect_err("must fail");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn overrides_replace_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        r#"
worker_id = "w2"
default_working_dir = '{root}'
poll_interval_seconds = 2

[agent_cli]
command = "mock-cli"
args = ["--yes"]
strategy = "oneshot"

[timeouts]
execution_seconds = 60
quiet_period_seconds = 1

[markers]
response_start = ">>"

[hub]
base_url = "http://hub.internal:8080"
work_log_channel = "ops-log"
"#,
        root = dir.path().display()
    );

    let config = GlobalConfig::from_toml_str(&toml).expect("valid config");
    assert_eq!(config.agent_cli.command, "mock-cli");
    assert_eq!(config.agent_cli.args, vec!["--yes"]);
    assert_eq!(config.agent_cli.strategy, StrategyKind::Oneshot);
    assert_eq!(config.timeouts.execution_seconds, 60);
    assert_eq!(config.markers.response_start, ">>");
    assert_eq!(config.hub.work_log_channel, "ops-log");
}

#[test]
#[serial_test::serial]
fn credentials_load_from_env() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = GlobalConfig::from_toml_str(&minimal_toml(&dir.path().display().to_string()))
        .expect("valid config");

    std::env::set_var("RELAY_HUB_TOKEN", "tok-123");
    config.load_credentials();
    std::env::remove_var("RELAY_HUB_TOKEN");

    assert_eq!(config.hub.auth_token, "tok-123");
}

#[test]
fn db_path_defaults_under_working_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = GlobalConfig::from_toml_str(&minimal_toml(&dir.path().display().to_string()))
        .expect("valid config");

    let db_path = config.db_path();
    assert!(db_path.starts_with(&config.default_working_dir));
    assert!(db_path.ends_with(".agent-relay/relay.db"));
}
