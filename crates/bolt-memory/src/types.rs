use serde::{Deserialize, Serialize};

/// Message role as stored. `Tool`/`ToolResult` rows are remapped to `system`
/// before going on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
    ToolResult,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
            Self::Tool => write!(f, "tool"),
            Self::ToolResult => write!(f, "tool_result"),
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            "tool" => Ok(Self::Tool),
            "tool_result" => Ok(Self::ToolResult),
            other => Err(format!("unknown message role: {other}")),
        }
    }
}

/// A single stored conversation message. Never mutated, never deleted during
/// a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub session_id: String,
    pub ts: String,
    pub role: MessageRole,
    pub content: String,
    pub token_estimate: i64,
}

/// A conversation summary. `covers_up_to` strictly increases per session;
/// messages with a larger id are "unsummarized".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub id: i64,
    pub session_id: String,
    pub ts: String,
    pub summary: String,
    pub covers_up_to: i64,
    pub token_estimate: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Done,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A tracked task. At most one task is `active` at any time, across sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub created_at: String,
    pub updated_at: String,
    pub title: String,
    pub status: TaskStatus,
    pub context_json: Option<String>,
}

/// Append-only log entry: routing decisions, tool calls, errors, session
/// boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub id: i64,
    pub ts: String,
    pub event: String,
    pub details: Option<String>,
}

/// Compact record of a finished (or cleared) session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub started_at: Option<String>,
    pub ended_at: String,
    pub message_count: i64,
    pub summary: Option<String>,
    pub context: Option<String>,
}

/// A single learned fact about the user. Unique on (category, key);
/// higher-confidence writes overwrite, equal confidence overwrites too
/// (freshness wins), lower-confidence writes are dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileFact {
    pub category: String,
    pub key: String,
    pub value: String,
    pub confidence: f64,
    pub source: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A short note one brain region leaves for the next. Only the latest per
/// session is consumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextHandoff {
    pub id: i64,
    pub ts: String,
    pub from_model: String,
    pub to_model: Option<String>,
    pub handoff: String,
    pub session_id: Option<String>,
}
