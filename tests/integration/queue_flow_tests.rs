use agent_relay::models::message::MessageStatus;
use agent_relay::models::session::{Priority, SessionStatus};
use agent_relay::AppError;

use super::test_helpers::{submit_request, test_queue};

#[tokio::test]
async fn submit_creates_active_session_with_one_pending_message() {
    let queue = test_queue().await;

    let (session, message) = queue
        .submit(submit_request("agent-a", "Build the thing", Priority::Medium))
        .await
        .expect("submit");

    assert_eq!(session.status, SessionStatus::Active);
    assert_eq!(message.status, MessageStatus::Pending);

    let messages = queue
        .messages()
        .list_for_session(&session.id)
        .await
        .expect("list messages");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, message.id);
}

#[tokio::test]
async fn submit_rejects_empty_title_and_instructions() {
    let queue = test_queue().await;

    let mut request = submit_request("agent-a", "ok", Priority::Medium);
    request.title = "  ".into();
    let err = queue.submit(request).await.expect_err("empty title");
    assert!(matches!(err, AppError::Validation(_)));

    let mut request = submit_request("agent-a", "ok", Priority::Medium);
    request.instructions = String::new();
    let err = queue.submit(request).await.expect_err("empty instructions");
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn continue_appends_pending_message_for_owner() {
    let queue = test_queue().await;
    let (session, _) = queue
        .submit(submit_request("agent-a", "Task", Priority::Medium))
        .await
        .expect("submit");

    let follow_up = queue
        .continue_session(&session.id, "also do this", "agent-a")
        .await
        .expect("continue");

    assert_eq!(follow_up.status, MessageStatus::Pending);
    let messages = queue
        .messages()
        .list_for_session(&session.id)
        .await
        .expect("list");
    assert_eq!(messages.len(), 2);
}

#[tokio::test]
async fn continue_rejects_non_owner() {
    let queue = test_queue().await;
    let (session, _) = queue
        .submit(submit_request("agent-a", "Task", Priority::Medium))
        .await
        .expect("submit");

    let err = queue
        .continue_session(&session.id, "sneaky", "agent-b")
        .await
        .expect_err("wrong owner");
    assert!(matches!(err, AppError::Unauthorized(_)));
}

#[tokio::test]
async fn continue_reopens_a_completed_session() {
    let queue = test_queue().await;
    let (session, message) = queue
        .submit(submit_request("agent-a", "Task", Priority::Medium))
        .await
        .expect("submit");

    queue
        .claim_next("worker-1")
        .await
        .expect("claim")
        .expect("candidate");
    queue
        .complete_message(&message.id, &serde_json::json!("done"), None)
        .await
        .expect("complete");

    let fetched = queue.sessions().get_by_id(&session.id).await.expect("get");
    assert_eq!(fetched.status, SessionStatus::Completed);

    queue
        .continue_session(&session.id, "one more thing", "agent-a")
        .await
        .expect("continue reopens");

    let reopened = queue.sessions().get_by_id(&session.id).await.expect("get");
    assert_eq!(reopened.status, SessionStatus::Active);
}

#[tokio::test]
async fn continue_rejects_failed_and_cancelled_sessions() {
    let queue = test_queue().await;

    let (failed_session, message) = queue
        .submit(submit_request("agent-a", "Doomed", Priority::Medium))
        .await
        .expect("submit");
    queue.claim_next("worker-1").await.expect("claim");
    queue
        .fail_message(&message.id, "boom")
        .await
        .expect("fail");
    let err = queue
        .continue_session(&failed_session.id, "retry?", "agent-a")
        .await
        .expect_err("failed is terminal for continue");
    assert!(matches!(err, AppError::InvalidState(_)));

    let (cancelled_session, _) = queue
        .submit(submit_request("agent-a", "Dropped", Priority::Medium))
        .await
        .expect("submit");
    queue
        .cancel(&cancelled_session.id, "agent-a")
        .await
        .expect("cancel");
    let err = queue
        .continue_session(&cancelled_session.id, "hello?", "agent-a")
        .await
        .expect_err("cancelled is terminal");
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn close_and_cancel_are_owner_only_and_state_checked() {
    let queue = test_queue().await;
    let (session, _) = queue
        .submit(submit_request("agent-a", "Task", Priority::Medium))
        .await
        .expect("submit");

    let err = queue
        .close(&session.id, "agent-b")
        .await
        .expect_err("wrong owner");
    assert!(matches!(err, AppError::Unauthorized(_)));

    let closed = queue.close(&session.id, "agent-a").await.expect("close");
    assert_eq!(closed.status, SessionStatus::Completed);

    // Closed (completed) sessions cannot be cancelled.
    let err = queue
        .cancel(&session.id, "agent-a")
        .await
        .expect_err("completed cannot be cancelled");
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn complete_persists_resume_handle_onto_session() {
    let queue = test_queue().await;
    let (session, message) = queue
        .submit(submit_request("agent-a", "Task", Priority::Medium))
        .await
        .expect("submit");

    queue.claim_next("worker-1").await.expect("claim");
    queue
        .complete_message(&message.id, &serde_json::json!("done"), Some("handle-9"))
        .await
        .expect("complete");

    let fetched = queue.sessions().get_by_id(&session.id).await.expect("get");
    assert_eq!(fetched.resume_handle.as_deref(), Some("handle-9"));
    assert_eq!(fetched.status, SessionStatus::Completed);

    let completed = queue.messages().get_by_id(&message.id).await.expect("get");
    assert_eq!(completed.status, MessageStatus::Completed);
    assert!(completed.duration_ms.is_some());
}

#[tokio::test]
async fn fail_marks_message_and_session_failed() {
    let queue = test_queue().await;
    let (session, message) = queue
        .submit(submit_request("agent-a", "Task", Priority::Medium))
        .await
        .expect("submit");

    queue.claim_next("worker-1").await.expect("claim");
    queue
        .fail_message(&message.id, "spawn failed")
        .await
        .expect("fail");

    let fetched = queue.sessions().get_by_id(&session.id).await.expect("get");
    assert_eq!(fetched.status, SessionStatus::Failed);

    let failed = queue.messages().get_by_id(&message.id).await.expect("get");
    assert_eq!(failed.status, MessageStatus::Failed);
    assert_eq!(failed.error_text.as_deref(), Some("spawn failed"));
}
