//! Prompt construction for claimed messages.

use crate::models::message::WorkMessage;
use crate::models::session::{Priority, WorkSession};

/// Build the text delivered to the agent CLI for a claimed message.
///
/// Sessions with a resume handle get the raw follow-up content only — the
/// resumed conversation already carries the full context. First messages
/// get a synthesized task brief.
#[must_use]
pub fn build_prompt(message: &WorkMessage, session: &WorkSession) -> String {
    if session.resume_handle.is_some() {
        return message.content.clone();
    }

    let metadata_block = session
        .metadata
        .as_ref()
        .and_then(|value| serde_json::to_string_pretty(value).ok())
        .map(|json| format!("\n\nAdditional context:\n{json}"))
        .unwrap_or_default();

    format!(
        "You are a background worker agent. You have been assigned a work session.\n\n\
         **Title:** {title}\n\
         **Type:** {kind}\n\
         **Priority:** {priority}\n\
         **Requester:** {requester}\n\n\
         **Instructions:**\n{instructions}{metadata_block}\n\n\
         Execute this work request thoroughly and finish with a clear summary \
         of what was accomplished.",
        title = session.title,
        kind = session.kind,
        priority = priority_label(session.priority),
        requester = session.requester_id,
        instructions = message.content,
    )
}

fn priority_label(priority: Priority) -> &'static str {
    match priority {
        Priority::Critical => "critical",
        Priority::High => "high",
        Priority::Medium => "medium",
        Priority::Low => "low",
    }
}
