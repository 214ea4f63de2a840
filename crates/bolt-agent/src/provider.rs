use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::stream::StreamEvent;

/// HTTP timeout for inference calls.
pub const INFERENCE_TIMEOUT_SECS: u64 = 300;

/// Roles accepted on the wire. Stored roles outside this set are remapped
/// before a message list reaches a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for WireRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single message in a model request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: WireRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: WireRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: WireRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: WireRole::Assistant,
            content: content.into(),
        }
    }
}

/// Clean a message list for the wire: drop empty-content messages and merge
/// consecutive same-role non-system messages with a newline separator.
pub fn normalize_messages(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut clean: Vec<ChatMessage> = Vec::with_capacity(messages.len());
    for m in messages {
        if m.content.trim().is_empty() {
            continue;
        }
        match clean.last_mut() {
            Some(last) if last.role == m.role && m.role != WireRole::System => {
                last.content.push('\n');
                last.content.push_str(&m.content);
            }
            _ => clean.push(m.clone()),
        }
    }
    clean
}

/// Reduced context for the one-shot retry after an HTTP error:
/// the first system message plus the last user message.
pub fn compact_messages(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut fallback = Vec::with_capacity(2);
    if let Some(system) = messages.iter().find(|m| m.role == WireRole::System) {
        fallback.push(system.clone());
    }
    if let Some(user) = messages.iter().rev().find(|m| m.role == WireRole::User) {
        fallback.push(user.clone());
    }
    fallback
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("no messages to send")]
    Empty,
}

/// Common interface for chat backends (local Ollama, cloud providers, test
/// doubles).
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Non-streaming chat — returns the full response text.
    async fn send(&self, model: &str, messages: &[ChatMessage]) -> Result<String, ProviderError>;

    /// Streaming chat. Failures after the stream starts are delivered as
    /// `StreamEvent::Error`; the final event is always `StreamEvent::Done`.
    async fn send_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tx: mpsc::Sender<StreamEvent>,
    );
}

/// Model residency and raw-prompt operations on the local inference server.
/// The build pipeline and the background workers depend on this seam so
/// tests can script it.
#[async_trait]
pub trait ModelHost: Send + Sync {
    /// Non-streaming raw generation (`/api/generate`).
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        timeout_secs: u64,
    ) -> Result<String, ProviderError>;

    /// Load a model into memory with a tiny prompt and a keep_alive hint.
    async fn warm(&self, model: &str);

    /// Unload a model (keep_alive = 0).
    async fn unload(&self, model: &str);

    /// Enumerate loaded models and unload all but `keep`.
    async fn unload_all_except(&self, keep: &str);

    /// Empty-prompt keep_alive ping so the server does not evict the model.
    async fn keep_alive(&self, model: &str);
}

/// Cloud-specific surface on top of `ChatBackend`.
#[async_trait]
pub trait CloudBackend: ChatBackend {
    /// True when a key is configured and the provider answered an HTTP
    /// request recently (cached).
    async fn is_available(&self) -> bool;

    /// `"model @ Provider"` for the collaborator banner. Empty when no cloud
    /// is configured.
    fn display_name(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_merges_consecutive_same_role() {
        let msgs = vec![
            ChatMessage::system("identity"),
            ChatMessage::user("first"),
            ChatMessage::user("second"),
            ChatMessage::assistant("reply"),
        ];
        let clean = normalize_messages(&msgs);
        assert_eq!(clean.len(), 3);
        assert_eq!(clean[1].content, "first\nsecond");
    }

    #[test]
    fn normalize_never_merges_system_messages() {
        let msgs = vec![
            ChatMessage::system("one"),
            ChatMessage::system("two"),
        ];
        let clean = normalize_messages(&msgs);
        assert_eq!(clean.len(), 2);
    }

    #[test]
    fn normalize_drops_empty_and_whitespace_content() {
        let msgs = vec![
            ChatMessage::user(""),
            ChatMessage::user("   "),
            ChatMessage::user("real"),
        ];
        let clean = normalize_messages(&msgs);
        assert_eq!(clean.len(), 1);
        assert_eq!(clean[0].content, "real");
    }

    #[test]
    fn compact_keeps_first_system_and_last_user() {
        let msgs = vec![
            ChatMessage::system("identity"),
            ChatMessage::system("summary"),
            ChatMessage::user("old question"),
            ChatMessage::assistant("old answer"),
            ChatMessage::user("new question"),
        ];
        let compact = compact_messages(&msgs);
        assert_eq!(compact.len(), 2);
        assert_eq!(compact[0].content, "identity");
        assert_eq!(compact[1].content, "new question");
    }
}
