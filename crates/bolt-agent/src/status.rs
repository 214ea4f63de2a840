//! Status, timeline, memory, and task formatting for the CLI collaborator,
//! plus session id generation.

use bolt_memory::types::TaskStatus;
use bolt_memory::{MemoryError, MemoryStore};

/// Fresh 12-hex-char session id.
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}

/// Session info and current task for the `/status` command.
pub fn format_status(store: &MemoryStore, session_id: &str) -> Result<String, MemoryError> {
    let msg_count = store.count_messages(session_id)?;
    let mut lines = vec![
        format!("  Session: {session_id}"),
        format!("  Messages this session: {msg_count}"),
    ];

    match store.get_active_task()? {
        Some(task) => lines.push(format!("  Current task: {} ({})", task.title, task.status)),
        None => lines.push("  Current task: none".to_string()),
    }
    match store.get_latest_summary(session_id)? {
        Some(summary) => lines.push(format!(
            "  Last summary covers through message #{}",
            summary.covers_up_to
        )),
        None => lines.push("  No summaries yet".to_string()),
    }
    Ok(lines.join("\n"))
}

/// Activity log for the `/timeline` command, oldest first.
pub fn format_timeline(store: &MemoryStore, limit: usize) -> Result<String, MemoryError> {
    let events = store.get_timeline(limit)?;
    if events.is_empty() {
        return Ok("  No events yet.".to_string());
    }
    let lines: Vec<String> = events
        .iter()
        .map(|e| {
            let detail = e
                .details
                .as_deref()
                .map(|d| format!(" — {d}"))
                .unwrap_or_default();
            format!("  [{}] {}{}", e.ts, e.event, detail)
        })
        .collect();
    Ok(lines.join("\n"))
}

/// Summary plus recent messages for the `/memory` command.
pub fn format_memory(store: &MemoryStore, session_id: &str) -> Result<String, MemoryError> {
    let mut lines: Vec<String> = Vec::new();

    if let Some(summary) = store.get_latest_summary(session_id)? {
        lines.push("  === Summary ===".to_string());
        lines.push(format!("  {}", summary.summary));
        lines.push(String::new());
    }

    let recent = store.get_recent_messages(session_id, 10)?;
    if recent.is_empty() {
        lines.push("  No messages yet.".to_string());
    } else {
        lines.push("  === Recent Messages ===".to_string());
        for msg in recent {
            let mut content = msg.content.clone();
            if content.len() > 120 {
                let mut end = 120;
                while end > 0 && !content.is_char_boundary(end) {
                    end -= 1;
                }
                content.truncate(end);
                content.push_str("...");
            }
            lines.push(format!("  [{}] {}", msg.role, content));
        }
    }
    Ok(lines.join("\n"))
}

/// Task list for the `/task` command, newest first.
pub fn format_tasks(store: &MemoryStore) -> Result<String, MemoryError> {
    let tasks = store.get_all_tasks(20)?;
    if tasks.is_empty() {
        return Ok("  No tasks.".to_string());
    }
    let lines: Vec<String> = tasks
        .iter()
        .map(|t| {
            let marker = match t.status {
                TaskStatus::Done => "✓",
                TaskStatus::Failed => "✗",
                TaskStatus::Active => "→",
            };
            format!("  {} [{}] {} ({})", marker, t.id, t.title, t.status)
        })
        .collect();
    Ok(lines.join("\n"))
}
