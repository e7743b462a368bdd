use agent_relay::models::message::{MessageRole, MessageStatus, WorkMessage};
use agent_relay::models::session::{Priority, SessionStatus, WorkSession};

fn session() -> WorkSession {
    WorkSession::new(
        "agent-a".into(),
        "code".into(),
        "Fix the parser".into(),
        Priority::Medium,
        Some("/tmp".into()),
        None,
    )
}

#[test]
fn new_session_starts_active_without_worker() {
    let s = session();
    assert_eq!(s.status, SessionStatus::Active);
    assert!(s.worker_id.is_none());
    assert!(s.resume_handle.is_none());
    assert_eq!(s.created_at, s.updated_at);
}

#[test]
fn priority_rank_orders_critical_first() {
    assert!(Priority::Critical.rank() < Priority::High.rank());
    assert!(Priority::High.rank() < Priority::Medium.rank());
    assert!(Priority::Medium.rank() < Priority::Low.rank());
}

#[test]
fn active_session_can_finish_or_pause() {
    let s = session();
    assert!(s.can_transition_to(SessionStatus::Completed));
    assert!(s.can_transition_to(SessionStatus::Failed));
    assert!(s.can_transition_to(SessionStatus::Cancelled));
    assert!(s.can_transition_to(SessionStatus::Paused));
    assert!(!s.can_transition_to(SessionStatus::Active));
}

#[test]
fn completed_session_reopens_only_to_active() {
    let mut s = session();
    s.status = SessionStatus::Completed;
    assert!(s.can_transition_to(SessionStatus::Active));
    assert!(!s.can_transition_to(SessionStatus::Failed));
    assert!(!s.can_transition_to(SessionStatus::Cancelled));
}

#[test]
fn failed_and_cancelled_are_terminal() {
    let mut s = session();
    s.status = SessionStatus::Failed;
    for next in [
        SessionStatus::Active,
        SessionStatus::Paused,
        SessionStatus::Completed,
        SessionStatus::Cancelled,
    ] {
        assert!(!s.can_transition_to(next), "failed -> {next:?} must be illegal");
    }

    s.status = SessionStatus::Cancelled;
    for next in [
        SessionStatus::Active,
        SessionStatus::Paused,
        SessionStatus::Completed,
        SessionStatus::Failed,
    ] {
        assert!(!s.can_transition_to(next), "cancelled -> {next:?} must be illegal");
    }
}

#[test]
fn new_user_message_is_pending() {
    let m = WorkMessage::new_user("sess-1".into(), "do the thing".into());
    assert_eq!(m.role, MessageRole::User);
    assert_eq!(m.status, MessageStatus::Pending);
    assert!(m.result.is_none());
    assert!(m.duration_ms.is_none());
    assert!(m.error_text.is_none());
}
