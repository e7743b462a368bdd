use agent_relay::models::message::WorkMessage;
use agent_relay::models::session::{Priority, WorkSession};
use agent_relay::orchestrator::prompt::build_prompt;

fn session_with(metadata: Option<serde_json::Value>) -> WorkSession {
    WorkSession::new(
        "agent-a".into(),
        "code".into(),
        "Ship the feature".into(),
        Priority::Critical,
        Some("/work/repo".into()),
        metadata,
    )
}

#[test]
fn first_message_gets_a_task_brief() {
    let session = session_with(Some(serde_json::json!({ "branch": "main" })));
    let message = WorkMessage::new_user(session.id.clone(), "Add the endpoint".into());

    let prompt = build_prompt(&message, &session);

    assert!(prompt.contains("**Title:** Ship the feature"));
    assert!(prompt.contains("**Type:** code"));
    assert!(prompt.contains("**Priority:** critical"));
    assert!(prompt.contains("**Requester:** agent-a"));
    assert!(prompt.contains("Add the endpoint"));
    assert!(prompt.contains("\"branch\": \"main\""));
}

#[test]
fn brief_omits_context_block_without_metadata() {
    let session = session_with(None);
    let message = WorkMessage::new_user(session.id.clone(), "Add the endpoint".into());

    let prompt = build_prompt(&message, &session);
    assert!(!prompt.contains("Additional context"));
}

#[test]
fn follow_up_passes_content_through_verbatim() {
    let mut session = session_with(Some(serde_json::json!({ "branch": "main" })));
    session.resume_handle = Some("abc-123".into());
    let message = WorkMessage::new_user(session.id.clone(), "Now add tests".into());

    let prompt = build_prompt(&message, &session);
    assert_eq!(prompt, "Now add tests");
}
