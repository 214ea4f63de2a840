//! Summarizer — watches the unsummarized-message count for a session and
//! compresses the backlog through the router model.

use std::sync::Arc;
use std::time::Duration;

use bolt_core::config::SUMMARY_INTERVAL;
use bolt_memory::MemoryStore;
use tokio::sync::watch;
use tracing::{error, info};

use crate::prompts::summarizer_prompt;
use crate::provider::{ChatBackend, ChatMessage};

/// How often the backlog is checked.
const POLL_SECS: u64 = 15;
/// Transcript cap fed to the summarizer model.
const MAX_TRANSCRIPT_CHARS: usize = 6000;

pub struct Summarizer {
    store: Arc<MemoryStore>,
    backend: Arc<dyn ChatBackend>,
    model: String,
    session_id: String,
}

impl Summarizer {
    pub fn new(
        store: Arc<MemoryStore>,
        backend: Arc<dyn ChatBackend>,
        model: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            backend,
            model: model.into(),
            session_id: session_id.into(),
        }
    }

    /// Poll loop: every 15 s, summarize once the backlog reaches the
    /// threshold. Stops when `shutdown` flips to true.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(POLL_SECS));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.store.count_unsummarized(&self.session_id) {
                        Ok(count) if count >= SUMMARY_INTERVAL as i64 => {
                            self.summarize_once().await;
                        }
                        Ok(_) => {}
                        Err(e) => error!(err = %e, "summarizer count failed"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(session = %self.session_id, "summarizer shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Summarize whatever is unsummarized right now. Used by the poll loop
    /// and by `force_summarize` on shutdown; a no-op when the backlog is
    /// empty.
    pub async fn summarize_once(&self) {
        let msgs = match self.store.get_unsummarized_messages(&self.session_id) {
            Ok(m) if !m.is_empty() => m,
            Ok(_) => return,
            Err(e) => {
                error!(err = %e, "summarizer fetch failed");
                return;
            }
        };

        let mut transcript = msgs
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        if transcript.len() > MAX_TRANSCRIPT_CHARS {
            let mut end = MAX_TRANSCRIPT_CHARS;
            while end > 0 && !transcript.is_char_boundary(end) {
                end -= 1;
            }
            transcript.truncate(end);
            transcript.push_str("\n... (truncated)");
        }

        let prompt = summarizer_prompt(&transcript);
        let summary = match self
            .backend
            .send(&self.model, &[ChatMessage::user(prompt)])
            .await
        {
            Ok(text) => text,
            Err(e) => {
                let _ = self.store.log_event("worker_error", Some(&e.to_string()));
                return;
            }
        };

        if summary.trim().is_empty() {
            return;
        }

        let last_id = msgs.last().map(|m| m.id).unwrap_or(0);
        if let Err(e) = self
            .store
            .save_summary(&self.session_id, summary.trim(), last_id)
        {
            error!(err = %e, "summary save failed");
            return;
        }
        let _ = self.store.log_event(
            "summarized",
            Some(&format!("covered through message #{last_id}")),
        );
    }

    /// Shutdown hook — summarize the remaining backlog immediately.
    pub async fn force_summarize(&self) {
        self.summarize_once().await;
    }
}
