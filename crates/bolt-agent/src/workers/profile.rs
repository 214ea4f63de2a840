//! Profile learner — every Nth turn, a detached task asks the small model
//! for new facts about the user and merges them into the profile.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bolt_core::config::PROFILE_INTERVAL;
use bolt_memory::MemoryStore;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::prompts::profile_extract_prompt;
use crate::provider::ModelHost;

pub struct ProfileLearner {
    store: Arc<MemoryStore>,
    host: Arc<dyn ModelHost>,
    model: String,
    session_id: String,
    turn_count: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct ExtractedFact {
    #[serde(default)]
    category: String,
    #[serde(default)]
    key: String,
    #[serde(default)]
    value: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    0.5
}

impl ProfileLearner {
    pub fn new(
        store: Arc<MemoryStore>,
        host: Arc<dyn ModelHost>,
        model: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            host,
            model: model.into(),
            session_id: session_id.into(),
            turn_count: AtomicU64::new(0),
        }
    }

    /// Called after each exchange. Learns every `PROFILE_INTERVAL`th turn,
    /// on a detached task so the user never waits for it.
    pub fn tick(self: &Arc<Self>, user_msg: &str, assistant_msg: &str) {
        let count = self.turn_count.fetch_add(1, Ordering::SeqCst) + 1;
        if count % PROFILE_INTERVAL != 0 {
            return;
        }

        let learner = Arc::clone(self);
        let conversation = format!("User: {user_msg}\nAssistant: {assistant_msg}");
        let source = format!("session:{}", self.session_id);
        tokio::spawn(async move {
            learner.learn_from_conversation(&conversation, &source).await;
        });
    }

    /// Run one extraction pass. Returns the number of facts saved.
    pub async fn learn_from_conversation(&self, conversation: &str, source: &str) -> usize {
        let existing = match self.store.get_profile() {
            Ok(facts) if facts.is_empty() => "(empty profile)".to_string(),
            Ok(facts) => facts
                .iter()
                .map(|f| format!("{}/{}: {}", f.category, f.key, f.value))
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => {
                warn!(err = %e, "profile read failed");
                return 0;
            }
        };

        let prompt = profile_extract_prompt(&existing, conversation);
        let raw = match self.host.generate(&self.model, &prompt, 120).await {
            Ok(text) => text,
            Err(e) => {
                let _ = self.store.log_event("worker_error", Some(&e.to_string()));
                return 0;
            }
        };

        let facts = parse_fact_array(&raw);
        let mut saved = 0;
        for fact in facts {
            let category = fact.category.trim();
            let key = fact.key.trim();
            let value = fact.value.trim();
            if category.is_empty() || key.is_empty() || value.is_empty() {
                continue;
            }
            if self
                .store
                .save_fact(category, key, value, fact.confidence, Some(source))
                .is_ok()
            {
                saved += 1;
            }
        }
        debug!(saved, session = %self.session_id, "profile learning pass complete");
        saved
    }
}

/// Parse the model's JSON fact array, tolerating markdown fences and prose
/// around the first `[` … `]` span. An unparseable reply is an empty list.
fn parse_fact_array(raw: &str) -> Vec<ExtractedFact> {
    let mut text = raw.trim();
    if text.starts_with("```") {
        text = text.split_once('\n').map(|(_, rest)| rest).unwrap_or(text);
    }
    if let Some(stripped) = text.strip_suffix("```") {
        text = stripped;
    }

    let Some(start) = text.find('[') else {
        return Vec::new();
    };
    let Some(end) = text.rfind(']') else {
        return Vec::new();
    };
    if end < start {
        return Vec::new();
    }

    serde_json::from_str(&text[start..=end]).unwrap_or_default()
}
