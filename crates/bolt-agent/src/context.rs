//! Context assembler — token-budgeted selection of identity, summary,
//! active task, and recent messages for a model call.

use std::sync::Arc;

use bolt_core::config::MAX_CONTEXT_TOKENS;
use bolt_core::Mode;
use bolt_memory::types::{MessageRole, StoredMessage};
use bolt_memory::{estimate_tokens, MemoryError, MemoryStore};
use tracing::debug;

use crate::identity::build_identity;
use crate::provider::{ChatMessage, WireRole};

pub struct ContextAssembler {
    store: Arc<MemoryStore>,
    budget: usize,
}

impl ContextAssembler {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            budget: MAX_CONTEXT_TOKENS,
        }
    }

    /// Override the default token budget (tests use small budgets).
    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }

    /// Build the ordered message list for a turn.
    ///
    /// The identity briefing leads and may overshoot the budget; everything
    /// after it — latest summary, active task, recent messages newest-first —
    /// only enters while it fits. `system_prefix` replaces the identity
    /// briefing when a collaborator supplies its own system text.
    pub fn assemble(
        &self,
        session_id: &str,
        mode: Mode,
        system_prefix: Option<&str>,
    ) -> Result<Vec<ChatMessage>, MemoryError> {
        let mut budget = self.budget as i64;
        let mut messages: Vec<ChatMessage> = Vec::new();

        // 1. Identity briefing (permitted to overshoot — nothing else is).
        let identity = match system_prefix {
            Some(prefix) => prefix.to_string(),
            None => build_identity(&self.store, mode, Some(session_id))?,
        };
        budget -= estimate_tokens(&identity);
        messages.push(ChatMessage::system(identity));

        // 2. Latest summary, if it fits.
        if let Some(summary) = self.store.get_latest_summary(session_id)? {
            let text = format!("[Conversation summary so far]: {}", summary.summary);
            let cost = estimate_tokens(&text);
            if cost < budget {
                messages.push(ChatMessage::system(text));
                budget -= cost;
            }
        }

        // 3. Active task, if it fits.
        if let Some(task) = self.store.get_active_task()? {
            let text = format!("[Current task]: {} (status: {})", task.title, task.status);
            let cost = estimate_tokens(&text);
            if cost < budget {
                messages.push(ChatMessage::system(text));
                budget -= cost;
            }
        }

        // 4. Recent messages, newest-first until the budget runs out, then
        //    back to chronological order.
        let recent = self.store.recent_window(session_id)?;
        let mut selected: Vec<&StoredMessage> = Vec::new();
        let mut total_cost: i64 = 0;
        for row in recent.iter().rev() {
            let cost = if row.token_estimate > 0 {
                row.token_estimate
            } else {
                estimate_tokens(&row.content)
            };
            if total_cost + cost > budget {
                break;
            }
            selected.push(row);
            total_cost += cost;
        }
        selected.reverse();

        debug!(
            session_id,
            selected = selected.len(),
            remaining_budget = budget - total_cost,
            "context assembled"
        );

        for row in selected {
            messages.push(ChatMessage {
                role: wire_role(row.role),
                content: row.content.clone(),
            });
        }

        Ok(messages)
    }
}

/// Remap stored roles for the wire: tool traffic becomes `system`, anything
/// unrecognised would become `user`.
fn wire_role(role: MessageRole) -> WireRole {
    match role {
        MessageRole::User => WireRole::User,
        MessageRole::Assistant => WireRole::Assistant,
        MessageRole::System | MessageRole::Tool | MessageRole::ToolResult => WireRole::System,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bolt_memory::types::TaskStatus;

    fn setup() -> (Arc<MemoryStore>, ContextAssembler) {
        let store = Arc::new(MemoryStore::open_in_memory().unwrap());
        let assembler = ContextAssembler::new(Arc::clone(&store));
        (store, assembler)
    }

    #[test]
    fn identity_leads_and_context_follows() {
        let (store, assembler) = setup();
        store.save_message("s1", MessageRole::User, "hello").unwrap();
        store
            .save_message("s1", MessageRole::Assistant, "hey!")
            .unwrap();

        let messages = assembler.assemble("s1", Mode::Companion, None).unwrap();
        assert!(messages[0].content.contains("You are BOLT"));
        assert_eq!(messages[0].role, WireRole::System);
        let tail: Vec<&str> = messages[1..].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(tail, vec!["hello", "hey!"]);
    }

    #[test]
    fn summary_and_task_are_labelled_system_lines() {
        let (store, assembler) = setup();
        let id = store.save_message("s1", MessageRole::User, "hi").unwrap();
        store.save_summary("s1", "we talked about rust", id).unwrap();
        store
            .upsert_task("port the parser", TaskStatus::Active, None)
            .unwrap();

        let messages = assembler.assemble("s1", Mode::Companion, None).unwrap();
        assert!(messages[1]
            .content
            .starts_with("[Conversation summary so far]: we talked about rust"));
        assert_eq!(
            messages[2].content,
            "[Current task]: port the parser (status: active)"
        );
    }

    #[test]
    fn budget_drops_oldest_messages_first() {
        let (store, assembler) = setup();
        // Each message is exactly 25 tokens (100 chars).
        for i in 0..10 {
            let content = format!("{}{}", i, "x".repeat(99));
            store.save_message("s1", MessageRole::User, &content).unwrap();
        }
        // A tiny system prefix keeps the budget arithmetic predictable:
        // 60 - 1 = 59 remaining, room for two 25-token messages.
        let assembler = assembler.with_budget(60);
        let messages = assembler
            .assemble("s1", Mode::Companion, Some("sys"))
            .unwrap();

        let tail: Vec<&ChatMessage> = messages.iter().skip(1).collect();
        assert_eq!(tail.len(), 2);
        assert!(tail[0].content.starts_with('8'));
        assert!(tail[1].content.starts_with('9'));
    }

    #[test]
    fn budget_safety_holds_outside_the_identity() {
        let (store, assembler) = setup();
        for i in 0..40 {
            store
                .save_message("s1", MessageRole::User, &format!("message number {i} with padding"))
                .unwrap();
        }
        let budget = 120;
        let assembler = assembler.with_budget(budget);
        let messages = assembler
            .assemble("s1", Mode::Companion, Some("sys"))
            .unwrap();

        assert!(messages.len() > 2, "expected some history to fit");
        let identity_cost = estimate_tokens(&messages[0].content);
        let total: i64 = messages
            .iter()
            .map(|m| estimate_tokens(&m.content))
            .sum();
        // Everything beyond the identity slot fits the stated budget.
        assert!(total - identity_cost <= budget as i64);
    }

    #[test]
    fn tool_roles_are_remapped_to_system() {
        let (store, assembler) = setup();
        store.save_message("s1", MessageRole::Tool, "Called calc").unwrap();
        store.save_message("s1", MessageRole::ToolResult, "4").unwrap();

        let messages = assembler.assemble("s1", Mode::Code, None).unwrap();
        for m in &messages[1..] {
            assert_eq!(m.role, WireRole::System);
        }
    }

    #[test]
    fn system_prefix_replaces_identity() {
        let (store, assembler) = setup();
        store.save_message("s1", MessageRole::User, "hi").unwrap();
        let messages = assembler
            .assemble("s1", Mode::Companion, Some("custom system"))
            .unwrap();
        assert_eq!(messages[0].content, "custom system");
    }
}
