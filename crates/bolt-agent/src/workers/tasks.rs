//! Task tracker — runs a small-model prompt after each turn and keeps the
//! singleton active task in sync with the conversation.

use std::sync::Arc;

use bolt_memory::types::TaskStatus;
use bolt_memory::MemoryStore;
use tracing::error;

use crate::prompts::task_detect_prompt;
use crate::provider::{ChatBackend, ChatMessage};

pub struct TaskTracker {
    store: Arc<MemoryStore>,
    backend: Arc<dyn ChatBackend>,
    model: String,
}

/// The two-line answer the detection prompt asks for.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Detection {
    pub title: Option<String>,
    pub status: String,
}

impl TaskTracker {
    pub fn new(
        store: Arc<MemoryStore>,
        backend: Arc<dyn ChatBackend>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            store,
            backend,
            model: model.into(),
        }
    }

    /// Analyze the latest exchange. Called synchronously after each user
    /// turn; never raises.
    pub async fn check(&self, user_msg: &str, assistant_msg: &str) {
        let prompt = task_detect_prompt(user_msg, assistant_msg);
        let reply = match self
            .backend
            .send(&self.model, &[ChatMessage::user(prompt)])
            .await
        {
            Ok(text) => text,
            Err(e) => {
                let _ = self.store.log_event("task_tracker_error", Some(&e.to_string()));
                return;
            }
        };
        self.apply(parse_detection(&reply));
    }

    fn apply(&self, detection: Detection) {
        let Some(title) = detection.title else { return };

        let result = match detection.status.as_str() {
            "done" => {
                let r = self.store.complete_active_task();
                let _ = self.store.log_event("task_done", Some(&title));
                r
            }
            "active" => {
                let r = self.store.upsert_task(&title, TaskStatus::Active, None);
                let _ = self.store.log_event("task_detected", Some(&title));
                r
            }
            _ => Ok(()),
        };
        if let Err(e) = result {
            error!(err = %e, "task tracker store update failed");
        }
    }
}

/// Parse the `TASK:` / `STATUS:` lines. `title` is `None` for NONE/empty.
pub(crate) fn parse_detection(reply: &str) -> Detection {
    let mut title = String::new();
    let mut status = String::new();
    for line in reply.lines() {
        let line = line.trim();
        let upper = line.to_uppercase();
        if upper.starts_with("TASK:") {
            title = line[5..].trim().to_string();
        } else if upper.starts_with("STATUS:") {
            status = line[7..].trim().to_lowercase();
        }
    }

    let title = if title.is_empty() || title.to_uppercase() == "NONE" {
        None
    } else {
        Some(title)
    };
    Detection { title, status }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    #[test]
    fn parses_task_and_status_lines() {
        let d = parse_detection("TASK: port the parser to rust\nSTATUS: active");
        assert_eq!(d.title.as_deref(), Some("port the parser to rust"));
        assert_eq!(d.status, "active");
    }

    #[test]
    fn none_task_is_ignored() {
        let d = parse_detection("TASK: NONE\nSTATUS: none");
        assert!(d.title.is_none());

        let d = parse_detection("no structured output at all");
        assert!(d.title.is_none());
    }

    #[test]
    fn prefix_match_is_case_insensitive() {
        let d = parse_detection("task: fix the build\nstatus: DONE");
        assert_eq!(d.title.as_deref(), Some("fix the build"));
        assert_eq!(d.status, "done");
    }

    struct Scripted(&'static str);

    #[async_trait]
    impl ChatBackend for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn send(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
        ) -> Result<String, ProviderError> {
            Ok(self.0.to_string())
        }
        async fn send_stream(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _tx: mpsc::Sender<crate::stream::StreamEvent>,
        ) {
        }
    }

    #[tokio::test]
    async fn active_detection_upserts_singleton_task() {
        let store = Arc::new(MemoryStore::open_in_memory().unwrap());
        let tracker = TaskTracker::new(
            Arc::clone(&store),
            Arc::new(Scripted("TASK: build the API\nSTATUS: active")),
            "tiny-router",
        );
        tracker.check("let's build the API", "on it").await;
        tracker.check("keep going", "sure").await;

        let active = store.get_active_task().unwrap().unwrap();
        assert_eq!(active.title, "build the API");
        let all = store.get_all_tasks(10).unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn done_detection_completes_active_task() {
        let store = Arc::new(MemoryStore::open_in_memory().unwrap());
        store
            .upsert_task("build the API", TaskStatus::Active, None)
            .unwrap();
        let tracker = TaskTracker::new(
            Arc::clone(&store),
            Arc::new(Scripted("TASK: build the API\nSTATUS: done")),
            "tiny-router",
        );
        tracker.check("that's finished now", "nice work").await;
        assert!(store.get_active_task().unwrap().is_none());
    }
}
