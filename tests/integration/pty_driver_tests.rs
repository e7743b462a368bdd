//! Live PTY driver tests against scripted shell processes.
//!
//! These exercise the real spawn/send/exit path with `bash` standing in
//! for the agent CLI, emitting the same markers the extraction heuristics
//! look for.

use std::path::Path;
use std::time::Duration;

use agent_relay::config::{AgentCliConfig, InputConfig, MarkerConfig, StrategyKind, TimeoutConfig};
use agent_relay::driver::pty::PtyDriver;
use agent_relay::driver::AgentDriver;
use agent_relay::AppError;
use tokio::sync::mpsc;

const ECHO_LOOP: &str = r#"
echo "❯ ready"
while IFS= read -r line; do
  case "$line" in
    "/exit") echo "claude --resume 123e4567-e89b-12d3-a456-426614174000"; exit 0 ;;
    *) echo "⏺ ack: $line" ;;
  esac
done
"#;

fn driver_for(script: &str) -> PtyDriver {
    let cli = AgentCliConfig {
        command: "bash".into(),
        args: vec!["-c".into(), script.into()],
        resume_flag: "--resume".into(),
        strategy: StrategyKind::Pty,
        cols: 120,
        rows: 40,
        env_blocklist: Vec::new(),
    };
    let timeouts = TimeoutConfig {
        startup_seconds: 10,
        ready_quiet_seconds: 1,
        execution_seconds: 60,
        quiet_period_seconds: 1,
        exit_grace_seconds: 3,
    };
    let input = InputConfig {
        chunk_chars: 64,
        chunk_delay_ms: 5,
        progress_interval_seconds: 1,
    };
    PtyDriver::new(cli, timeouts, input, MarkerConfig::default()).expect("driver builds")
}

#[tokio::test]
async fn round_trip_send_and_graceful_exit() {
    let driver = driver_for(ECHO_LOOP);
    let (progress_tx, _progress_rx) = mpsc::channel(8);

    let session = driver
        .spawn(Path::new("/tmp"), None)
        .await
        .expect("spawn scripted cli");

    let outcome = driver
        .send(&session, "hello world", Duration::from_secs(30), progress_tx)
        .await
        .expect("send");

    assert_eq!(outcome.text, "ack: hello world");
    assert!(!outcome.timed_out);

    let handle = driver.exit(&session).await.expect("graceful exit");
    assert_eq!(
        handle.as_deref(),
        Some("123e4567-e89b-12d3-a456-426614174000")
    );
}

#[tokio::test]
async fn send_without_marker_times_out_with_partial_output() {
    let driver = driver_for("echo \"❯ ready\"\nsleep 60\n");
    let (progress_tx, _progress_rx) = mpsc::channel(8);

    let session = driver
        .spawn(Path::new("/tmp"), None)
        .await
        .expect("spawn scripted cli");

    let outcome = driver
        .send(&session, "anything", Duration::from_secs(2), progress_tx)
        .await
        .expect("timeout is a degraded result, not an error");

    assert!(outcome.timed_out);
    driver.kill(&session).await;
}

#[tokio::test]
async fn mid_response_exit_reports_a_crash_with_partial_output() {
    let driver = driver_for("echo \"❯ ready\"\nread -r line\necho \"⏺ started the work\"\nexit 1\n");
    let (progress_tx, _progress_rx) = mpsc::channel(8);

    let session = driver
        .spawn(Path::new("/tmp"), None)
        .await
        .expect("spawn scripted cli");

    let err = driver
        .send(&session, "go", Duration::from_secs(30), progress_tx)
        .await
        .expect_err("mid-response exit is a crash");

    match err {
        AppError::ProcessCrash(detail) => assert!(detail.contains("started the work")),
        other => panic!("expected ProcessCrash, got {other}"),
    }
}

#[tokio::test]
async fn startup_trust_prompt_is_answered_once() {
    let script = r#"
echo "Do you trust the files in this folder?"
IFS= read -r _answer
echo "❯ ready"
while IFS= read -r line; do
  case "$line" in
    "/exit") exit 0 ;;
    *) echo "⏺ ack: $line" ;;
  esac
done
"#;
    let driver = driver_for(script);
    let (progress_tx, _progress_rx) = mpsc::channel(8);

    let session = driver
        .spawn(Path::new("/tmp"), None)
        .await
        .expect("trust prompt must not block the spawn");

    let outcome = driver
        .send(&session, "after trust", Duration::from_secs(30), progress_tx)
        .await
        .expect("send");
    assert_eq!(outcome.text, "ack: after trust");

    driver.kill(&session).await;
}

#[tokio::test]
async fn missing_binary_is_a_spawn_error() {
    let driver = {
        let cli = AgentCliConfig {
            command: "agent-relay-no-such-binary".into(),
            args: Vec::new(),
            resume_flag: "--resume".into(),
            strategy: StrategyKind::Pty,
            cols: 120,
            rows: 40,
            env_blocklist: Vec::new(),
        };
        PtyDriver::new(
            cli,
            TimeoutConfig {
                startup_seconds: 5,
                ready_quiet_seconds: 1,
                execution_seconds: 60,
                quiet_period_seconds: 1,
                exit_grace_seconds: 1,
            },
            InputConfig::default(),
            MarkerConfig::default(),
        )
        .expect("driver builds")
    };

    let err = driver
        .spawn(Path::new("/tmp"), None)
        .await
        .expect_err("unknown binary cannot spawn");
    assert!(matches!(err, AppError::Spawn(_)));
}

#[tokio::test]
async fn send_to_unknown_session_is_not_found() {
    let driver = driver_for(ECHO_LOOP);
    let (progress_tx, _progress_rx) = mpsc::channel(8);

    let err = driver
        .send("no-such-id", "hi", Duration::from_secs(1), progress_tx)
        .await
        .expect_err("unknown session");
    assert!(matches!(err, AppError::NotFound(_)));
}
