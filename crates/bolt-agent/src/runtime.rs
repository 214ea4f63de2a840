//! The Brain — BOLT's turn executor and the facade the collaborator
//! surfaces (REPL, web) talk to.
//!
//! A turn runs: persist user message → classify → pick model → assemble
//! context → stream → tool loop → persist response. Inference failures
//! arrive as in-band events and are rendered as bracketed text; the only
//! errors that cross this boundary come from the persistence layer.

use std::sync::Arc;

use bolt_core::config::{ModelRoster, MAX_TOOL_LOOPS};
use bolt_core::{Mode, ModeState, ModelKey};
use bolt_memory::types::MessageRole;
use bolt_memory::{MemoryError, MemoryStore};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::context::ContextAssembler;
use crate::identity::{profile_display, profile_text};
use crate::pipeline::{BuildPipeline, PipelineCallback};
use crate::prompts::{self, clip};
use crate::provider::{ChatBackend, ChatMessage, CloudBackend, ModelHost};
use crate::router::{self, Category};
use crate::status;
use crate::stream::StreamEvent;
use crate::tools::{format_tool_result, parse_tool_calls, ToolRegistry};

/// Conversation window handed to the build pipeline.
const PIPELINE_CONTEXT_MESSAGES: usize = 30;
/// Conversation window compressed into a handoff.
const HANDOFF_CONTEXT_MESSAGES: usize = 20;
/// Stored tool_result rows keep only this much of the output.
const TOOL_RESULT_STORE_CHARS: usize = 500;

pub struct Brain {
    store: Arc<MemoryStore>,
    local: Arc<dyn ChatBackend>,
    host: Arc<dyn ModelHost>,
    cloud: Arc<dyn CloudBackend>,
    registry: Arc<ToolRegistry>,
    mode: Arc<ModeState>,
    roster: ModelRoster,
    assembler: ContextAssembler,
    pipeline: BuildPipeline,
}

impl Brain {
    pub fn new(
        store: Arc<MemoryStore>,
        local: Arc<dyn ChatBackend>,
        host: Arc<dyn ModelHost>,
        cloud: Arc<dyn CloudBackend>,
        registry: Arc<ToolRegistry>,
        roster: ModelRoster,
        mode: Arc<ModeState>,
    ) -> Self {
        let assembler = ContextAssembler::new(Arc::clone(&store));
        let pipeline = BuildPipeline::new(
            Arc::clone(&host),
            Arc::clone(&store),
            roster.clone(),
            Arc::clone(&mode),
        );
        Self {
            store,
            local,
            host,
            cloud,
            registry,
            mode,
            roster,
            assembler,
            pipeline,
        }
    }

    // --- Mode -----------------------------------------------------------

    pub fn get_mode(&self) -> Mode {
        self.mode.get()
    }

    pub fn set_mode(&self, mode: Mode) -> Mode {
        self.mode.set(mode)
    }

    // --- Turn execution -------------------------------------------------

    /// Process a user message and return the full response text. Chunks are
    /// forwarded to `sink` as they arrive for the first inference pass;
    /// later tool-loop passes forward their text once complete.
    pub async fn process_message(
        &self,
        session_id: &str,
        user_text: &str,
        sink: Option<&mpsc::Sender<StreamEvent>>,
    ) -> Result<String, MemoryError> {
        self.store
            .save_message(session_id, MessageRole::User, user_text)?;

        let category =
            router::classify(self.local.as_ref(), &self.roster.router, user_text).await;
        let cloud_available = matches!(category, Category::Cloud | Category::CodeBeast)
            && self.cloud.is_available().await;
        let model_key = router::pick_model(category, self.mode.get(), cloud_available);
        let effective_mode = router::effective_mode(category);
        let _ = self.store.log_event(
            "route",
            Some(&format!("{category} -> {model_key} (mode={effective_mode})")),
        );

        let context = self.assembler.assemble(session_id, effective_mode, None)?;

        let response = self
            .generate_with_tools(session_id, model_key, context, sink)
            .await?;

        self.store
            .save_message(session_id, MessageRole::Assistant, &response)?;
        let _ = self.store.log_event(
            "response",
            Some(&format!("model={model_key}, len={}", response.len())),
        );
        Ok(response)
    }

    /// The tool loop: generate, execute any emitted tool calls, feed the
    /// results back, repeat until the model stops calling tools or the loop
    /// bound is hit.
    async fn generate_with_tools(
        &self,
        session_id: &str,
        model_key: ModelKey,
        context: Vec<ChatMessage>,
        sink: Option<&mpsc::Sender<StreamEvent>>,
    ) -> Result<String, MemoryError> {
        let mut messages = context;
        let mut accumulated = String::new();
        let mut full_text = String::new();

        for loop_num in 0..MAX_TOOL_LOOPS {
            let stream_this_pass = loop_num == 0 && sink.is_some();
            full_text = self
                .generate_once(model_key, &messages, stream_this_pass, sink)
                .await;
            if !stream_this_pass {
                if let Some(sink) = sink {
                    let _ = sink
                        .send(StreamEvent::Text {
                            text: full_text.clone(),
                        })
                        .await;
                }
            }

            let (calls, cleaned) = parse_tool_calls(&full_text);
            if calls.is_empty() {
                break;
            }

            let mut all_results = Vec::with_capacity(calls.len());
            for call in &calls {
                let _ = self.store.log_event(
                    "tool_call",
                    Some(&format!("{}: {}", call.name, clip(&call.args, 100))),
                );
                let result = self.registry.execute(&call.name, &call.args).await;
                let _ = self.store.log_event(
                    "tool_result",
                    Some(&format!(
                        "{}: {}",
                        call.name,
                        if result.is_error { "err" } else { "ok" }
                    )),
                );

                self.store.save_message(
                    session_id,
                    MessageRole::Tool,
                    &format!("Called {}", call.name),
                )?;
                self.store.save_message(
                    session_id,
                    MessageRole::ToolResult,
                    clip(&result.content, TOOL_RESULT_STORE_CHARS),
                )?;

                all_results.push(format_tool_result(&call.name, &result.content));
            }

            if !cleaned.trim().is_empty() {
                accumulated.push_str(&cleaned);
                accumulated.push('\n');
            }

            messages.push(ChatMessage::assistant(full_text.clone()));
            messages.push(ChatMessage::user(format!(
                "Tool results:\n{}",
                all_results.join("\n")
            )));

            if loop_num + 1 == MAX_TOOL_LOOPS {
                warn!(max = MAX_TOOL_LOOPS, "tool loop hit maximum iterations");
            }
        }

        Ok(if accumulated.is_empty() {
            full_text
        } else {
            accumulated + &full_text
        })
    }

    /// One inference pass. Streaming failures come back as bracketed text so
    /// a partial answer is never thrown away.
    async fn generate_once(
        &self,
        model_key: ModelKey,
        messages: &[ChatMessage],
        stream: bool,
        sink: Option<&mpsc::Sender<StreamEvent>>,
    ) -> String {
        let backend: &dyn ChatBackend = if model_key == ModelKey::Cloud {
            self.cloud.as_ref()
        } else {
            self.local.as_ref()
        };
        let model = self
            .roster
            .resolve(model_key)
            .unwrap_or_default()
            .to_string();

        if stream {
            let (tx, mut rx) = mpsc::channel::<StreamEvent>(64);
            let send_fut = backend.send_stream(&model, messages, tx);
            let drain_fut = async {
                let mut text = String::new();
                while let Some(event) = rx.recv().await {
                    match &event {
                        StreamEvent::Text { text: chunk } => text.push_str(chunk),
                        StreamEvent::Error { message, .. } => {
                            text.push_str(&format!("[BOLT: {message}]"));
                        }
                        StreamEvent::Done => {}
                    }
                    if let Some(sink) = sink {
                        let _ = sink.send(event).await;
                    }
                }
                text
            };
            let ((), text) = tokio::join!(send_fut, drain_fut);
            text
        } else {
            match backend.send(&model, messages).await {
                Ok(text) => text,
                Err(e) => format!("[BOLT: {e}]"),
            }
        }
    }

    // --- Profile facade -------------------------------------------------

    pub fn get_profile_text(&self) -> Result<String, MemoryError> {
        Ok(profile_text(&self.store.get_profile()?))
    }

    pub fn get_profile_display(&self) -> Result<String, MemoryError> {
        Ok(profile_display(&self.store.get_profile()?))
    }

    pub fn clear_profile(&self) -> Result<(), MemoryError> {
        self.store.clear_profile()
    }

    pub fn forget_fact(&self, category: &str, key: &str) -> Result<(), MemoryError> {
        self.store.forget_fact(category, key)
    }

    // --- Status facade --------------------------------------------------

    pub fn format_status(&self, session_id: &str) -> Result<String, MemoryError> {
        status::format_status(&self.store, session_id)
    }

    pub fn format_timeline(&self, limit: usize) -> Result<String, MemoryError> {
        status::format_timeline(&self.store, limit)
    }

    pub fn format_memory(&self, session_id: &str) -> Result<String, MemoryError> {
        status::format_memory(&self.store, session_id)
    }

    pub fn format_tasks(&self) -> Result<String, MemoryError> {
        status::format_tasks(&self.store)
    }

    pub fn list_tools(&self) -> Vec<(String, String)> {
        self.registry.list()
    }

    pub fn new_session_id(&self) -> String {
        status::new_session_id()
    }

    pub fn save_session_snapshot(&self, session_id: &str) -> Result<(), MemoryError> {
        self.store.save_session_snapshot(session_id)
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    // --- Handoff --------------------------------------------------------

    /// Compress the recent conversation into a handoff note for the next
    /// brain region. A failed or empty generation leaves nothing behind.
    pub async fn generate_handoff(
        &self,
        session_id: &str,
        from_model: &str,
    ) -> Result<(), MemoryError> {
        let recent = self
            .store
            .get_recent_messages(session_id, HANDOFF_CONTEXT_MESSAGES)?;
        if recent.is_empty() {
            return Ok(());
        }
        let transcript = recent
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = prompts::handoff_prompt(&transcript);
        match self.host.generate(&self.roster.router, &prompt, 120).await {
            Ok(text) if !text.trim().is_empty() => {
                self.store
                    .save_handoff(from_model, text.trim(), Some(session_id))
            }
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(err = %e, "handoff generation failed");
                Ok(())
            }
        }
    }

    // --- Build pipeline -------------------------------------------------

    pub fn is_pipeline_running(&self) -> bool {
        self.pipeline.is_running()
    }

    /// Hand the recent conversation to the build pipeline. Returns `false`
    /// when there is no conversation to build from or a build is already
    /// running.
    pub fn run_pipeline(
        &self,
        session_id: &str,
        callback: Option<PipelineCallback>,
    ) -> Result<bool, MemoryError> {
        let recent = self
            .store
            .get_recent_messages(session_id, PIPELINE_CONTEXT_MESSAGES)?;
        let conversation: String = recent
            .iter()
            .map(|m| format!("{}: {}\n", m.role, m.content))
            .collect();
        if conversation.trim().is_empty() {
            info!("no conversation yet, nothing to build");
            return Ok(false);
        }
        Ok(self.pipeline.run(conversation, callback))
    }
}
