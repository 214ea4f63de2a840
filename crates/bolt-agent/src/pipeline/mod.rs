//! Staged multi-model build pipeline.
//!
//! Five phases: spec → architect → build (two parallel workers) → review →
//! write. Runs as a single background task; only one pipeline may be active
//! at a time, and the tiny router model stays loaded throughout so the user
//! can keep chatting while it works.

pub mod json;
pub mod phases;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use bolt_core::{Mode, ModeState, ModelRoster};
use bolt_memory::MemoryStore;
use tracing::{info, warn};

use crate::identity::profile_text;
use crate::provider::ModelHost;

use phases::{restore_chat_models, stage_architect, stage_build, stage_review, stage_spec, stage_write};

/// Fired once when a pipeline run finishes:
/// `(success, output_dir, human_readable_summary)`.
pub type PipelineCallback = Box<dyn FnOnce(bool, Option<PathBuf>, String) + Send + 'static>;

pub struct BuildPipeline {
    host: Arc<dyn ModelHost>,
    store: Arc<MemoryStore>,
    roster: ModelRoster,
    mode: Arc<ModeState>,
    active: Arc<Mutex<bool>>,
}

impl BuildPipeline {
    pub fn new(
        host: Arc<dyn ModelHost>,
        store: Arc<MemoryStore>,
        roster: ModelRoster,
        mode: Arc<ModeState>,
    ) -> Self {
        Self {
            host,
            store,
            roster,
            mode,
            active: Arc::new(Mutex::new(false)),
        }
    }

    /// Whether a build is currently running. Linearizable with `run` — both
    /// sides take the same lock.
    pub fn is_running(&self) -> bool {
        *self.active.lock().unwrap()
    }

    /// Launch the pipeline in the background over the given conversation
    /// text. Returns `false` without scheduling anything when a build is
    /// already running.
    ///
    /// The process mode switches to `Build` for the duration and is restored
    /// before the callback fires.
    pub fn run(&self, conversation_text: String, callback: Option<PipelineCallback>) -> bool {
        {
            let mut active = self.active.lock().unwrap();
            if *active {
                warn!("a build is already running");
                return false;
            }
            *active = true;
        }

        let previous_mode = self.mode.set(Mode::Build);
        let _ = self.store.log_event("pipeline_start", None);

        let host = Arc::clone(&self.host);
        let store = Arc::clone(&self.store);
        let roster = self.roster.clone();
        let mode = Arc::clone(&self.mode);
        let active = Arc::clone(&self.active);

        tokio::spawn(async move {
            // Make sure the chat model is loaded before the heavy phases
            // start evicting things.
            host.warm(&roster.router).await;

            let (success, output_dir, summary) =
                run_inner(host.as_ref(), &store, &roster, &conversation_text).await;

            let event = if success { "pipeline_complete" } else { "pipeline_failed" };
            let _ = store.log_event(event, Some(&summary));

            mode.set(previous_mode);
            if let Some(callback) = callback {
                callback(success, output_dir, summary);
            }
            *active.lock().unwrap() = false;
        });

        true
    }
}

/// The phase sequence. Any phase that returns an empty or unparseable
/// artifact short-circuits with a readable reason; no phase is retried.
async fn run_inner(
    host: &dyn ModelHost,
    store: &MemoryStore,
    roster: &ModelRoster,
    conversation_text: &str,
) -> (bool, Option<PathBuf>, String) {
    let started = Instant::now();

    let Some(spec) = stage_spec(host, roster, conversation_text).await else {
        return (false, None, "Failed to generate build spec.".to_string());
    };

    let user_context = store
        .get_profile()
        .map(|facts| profile_text(&facts))
        .unwrap_or_default();

    let Some(plan) = stage_architect(host, roster, &spec, &user_context).await else {
        return (false, None, "Architect failed to produce a plan.".to_string());
    };

    let built_files = stage_build(host, roster, &spec, &plan, &user_context).await;
    if built_files.is_empty() {
        return (false, None, "Workers produced no files.".to_string());
    }

    let review = stage_review(host, roster, &plan, &built_files).await;

    let Some(outcome) = stage_write(&spec, &built_files) else {
        return (
            false,
            None,
            "Refused to write outside the home directory.".to_string(),
        );
    };
    for denied in &outcome.denied {
        let _ = store.log_event("pipeline_write_denied", Some(denied));
    }

    restore_chat_models(host, roster).await;

    let elapsed = started.elapsed().as_secs();
    let summary = format!(
        "Built {} files in {}s\nOutput: {}\nReview: {} — {}",
        outcome.written.len(),
        elapsed,
        outcome.output_dir.display(),
        review.verdict,
        review.summary
    );
    info!(elapsed, files = outcome.written.len(), "pipeline complete");

    (true, Some(outcome.output_dir), summary)
}
