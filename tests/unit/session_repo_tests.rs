use std::sync::Arc;

use agent_relay::models::session::{Priority, SessionStatus, WorkSession};
use agent_relay::persistence::{db, session_repo::SessionRepo};
use agent_relay::AppError;

fn sample_session() -> WorkSession {
    WorkSession::new(
        "agent-a".into(),
        "code".into(),
        "Fix the parser".into(),
        Priority::High,
        Some("/tmp".into()),
        Some(serde_json::json!({ "repo": "git@example.com:x/y.git" })),
    )
}

#[tokio::test]
async fn in_memory_connect_creates_both_tables() {
    let pool = db::connect_memory().await.expect("in-memory connect");

    for table in ["work_session", "work_message"] {
        let query = format!("SELECT COUNT(*) AS cnt FROM {table}");
        let row: (i64,) = sqlx::query_as(&query)
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|e| panic!("table '{table}' should be queryable: {e}"));
        assert_eq!(row.0, 0, "table '{table}' should start empty");
    }
}

#[tokio::test]
async fn create_and_fetch_round_trips_all_fields() {
    let db = db::connect_memory().await.expect("db connect");
    let repo = SessionRepo::new(Arc::new(db));

    let session = sample_session();
    repo.create(&session).await.expect("create session");

    let fetched = repo.get_by_id(&session.id).await.expect("fetch session");
    assert_eq!(fetched, session);
}

#[tokio::test]
async fn get_unknown_session_is_not_found() {
    let db = db::connect_memory().await.expect("db connect");
    let repo = SessionRepo::new(Arc::new(db));

    let err = repo.get_by_id("missing").await.expect_err("must fail");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn status_updates_respect_the_state_machine() {
    let db = db::connect_memory().await.expect("db connect");
    let repo = SessionRepo::new(Arc::new(db));

    let session = sample_session();
    repo.create(&session).await.expect("create session");

    let completed = repo
        .update_status(&session.id, SessionStatus::Completed)
        .await
        .expect("complete session");
    assert_eq!(completed.status, SessionStatus::Completed);

    // Completed reopens to active.
    let reopened = repo
        .update_status(&session.id, SessionStatus::Active)
        .await
        .expect("reopen session");
    assert_eq!(reopened.status, SessionStatus::Active);

    // Cancel, then nothing else is legal.
    repo.update_status(&session.id, SessionStatus::Cancelled)
        .await
        .expect("cancel session");
    let err = repo
        .update_status(&session.id, SessionStatus::Active)
        .await
        .expect_err("cancelled is terminal");
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn worker_assignment_is_first_claim_only() {
    let db = db::connect_memory().await.expect("db connect");
    let repo = SessionRepo::new(Arc::new(db));

    let session = sample_session();
    repo.create(&session).await.expect("create session");

    repo.assign_worker_if_unset(&session.id, "worker-1")
        .await
        .expect("assign worker");
    repo.assign_worker_if_unset(&session.id, "worker-2")
        .await
        .expect("second assign is a no-op");

    let fetched = repo.get_by_id(&session.id).await.expect("fetch session");
    assert_eq!(fetched.worker_id.as_deref(), Some("worker-1"));
}

#[tokio::test]
async fn resume_handle_persists() {
    let db = db::connect_memory().await.expect("db connect");
    let repo = SessionRepo::new(Arc::new(db));

    let session = sample_session();
    repo.create(&session).await.expect("create session");

    repo.set_resume_handle(&session.id, "handle-1")
        .await
        .expect("set handle");

    let fetched = repo.get_by_id(&session.id).await.expect("fetch session");
    assert_eq!(fetched.resume_handle.as_deref(), Some("handle-1"));
}
