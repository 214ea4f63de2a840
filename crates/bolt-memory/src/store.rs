use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use bolt_core::config::CHARS_PER_TOKEN;

use crate::db::init_db;
use crate::error::MemoryError;
use crate::types::*;

/// Messages fetched for the recent-message window.
const RECENT_LIMIT: usize = 50;
/// Messages compressed into a session snapshot.
const SNAPSHOT_WINDOW: usize = 20;
/// Per-message content cap inside a snapshot.
const SNAPSHOT_CONTENT_CHARS: usize = 200;

/// Rough token estimate: 1 token ≈ 4 chars, never less than 1.
pub fn estimate_tokens(text: &str) -> i64 {
    std::cmp::max(1, text.len().div_ceil(CHARS_PER_TOKEN)) as i64
}

/// The single shared store. All writes are serialized through one
/// connection; components hold only row ids or short-lived copies.
pub struct MemoryStore {
    db: Mutex<Connection>,
}

impl MemoryStore {
    /// Open (or create) the store at `path`, creating parent directories and
    /// initialising the schema.
    pub fn open(path: &str) -> Result<Self, MemoryError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
        let conn = Connection::open(path)?;
        init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, MemoryError> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    // --- Messages -----------------------------------------------------------

    /// Store a message and return its id. Ids are monotonic per store.
    pub fn save_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<i64, MemoryError> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO messages (session_id, ts, role, content, token_estimate)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session_id,
                now,
                role.to_string(),
                content,
                estimate_tokens(content)
            ],
        )?;
        Ok(db.last_insert_rowid())
    }

    /// The most recent messages for a session, oldest first.
    pub fn get_recent_messages(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, MemoryError> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, session_id, ts, role, content, token_estimate
             FROM messages WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let mut rows: Vec<StoredMessage> = stmt
            .query_map(params![session_id, limit], row_to_message)?
            .filter_map(|r| r.ok())
            .collect();
        rows.reverse();
        Ok(rows)
    }

    /// Default recent-message window used by the context assembler.
    pub fn recent_window(&self, session_id: &str) -> Result<Vec<StoredMessage>, MemoryError> {
        self.get_recent_messages(session_id, RECENT_LIMIT)
    }

    pub fn count_messages(&self, session_id: &str) -> Result<i64, MemoryError> {
        let db = self.db.lock().unwrap();
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Count messages not yet covered by a summary.
    pub fn count_unsummarized(&self, session_id: &str) -> Result<i64, MemoryError> {
        let db = self.db.lock().unwrap();
        let after_id = latest_covered_id(&db, session_id)?;
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM messages WHERE session_id = ?1 AND id > ?2",
            params![session_id, after_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Messages not yet covered by a summary, oldest first.
    pub fn get_unsummarized_messages(
        &self,
        session_id: &str,
    ) -> Result<Vec<StoredMessage>, MemoryError> {
        let db = self.db.lock().unwrap();
        let after_id = latest_covered_id(&db, session_id)?;
        let mut stmt = db.prepare(
            "SELECT id, session_id, ts, role, content, token_estimate
             FROM messages WHERE session_id = ?1 AND id > ?2 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![session_id, after_id], row_to_message)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    // --- Summaries ----------------------------------------------------------

    pub fn save_summary(
        &self,
        session_id: &str,
        summary: &str,
        covers_up_to: i64,
    ) -> Result<(), MemoryError> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO summaries (session_id, ts, summary, covers_up_to, token_estimate)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![session_id, now, summary, covers_up_to, estimate_tokens(summary)],
        )?;
        debug!(session_id, covers_up_to, "summary saved");
        Ok(())
    }

    pub fn get_latest_summary(&self, session_id: &str) -> Result<Option<Summary>, MemoryError> {
        let db = self.db.lock().unwrap();
        let row = db
            .query_row(
                "SELECT id, session_id, ts, summary, covers_up_to, token_estimate
                 FROM summaries WHERE session_id = ?1 ORDER BY id DESC LIMIT 1",
                params![session_id],
                |row| {
                    Ok(Summary {
                        id: row.get(0)?,
                        session_id: row.get(1)?,
                        ts: row.get(2)?,
                        summary: row.get(3)?,
                        covers_up_to: row.get(4)?,
                        token_estimate: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    // --- Tasks --------------------------------------------------------------

    /// Upsert the singleton active task: update it when one exists, insert
    /// otherwise.
    pub fn upsert_task(
        &self,
        title: &str,
        status: TaskStatus,
        context_json: Option<&str>,
    ) -> Result<(), MemoryError> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let existing: Option<i64> = db
            .query_row(
                "SELECT id FROM tasks WHERE status = 'active' LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(id) => {
                db.execute(
                    "UPDATE tasks SET title = ?1, status = ?2, context_json = ?3,
                     updated_at = ?4 WHERE id = ?5",
                    params![title, status.to_string(), context_json, now, id],
                )?;
            }
            None => {
                db.execute(
                    "INSERT INTO tasks (created_at, updated_at, title, status, context_json)
                     VALUES (?1, ?1, ?2, ?3, ?4)",
                    params![now, title, status.to_string(), context_json],
                )?;
            }
        }
        Ok(())
    }

    pub fn get_active_task(&self) -> Result<Option<Task>, MemoryError> {
        let db = self.db.lock().unwrap();
        let row = db
            .query_row(
                "SELECT id, created_at, updated_at, title, status, context_json
                 FROM tasks WHERE status = 'active' ORDER BY updated_at DESC LIMIT 1",
                [],
                row_to_task,
            )
            .optional()?;
        Ok(row)
    }

    pub fn complete_active_task(&self) -> Result<(), MemoryError> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "UPDATE tasks SET status = 'done', updated_at = ?1 WHERE status = 'active'",
            params![now],
        )?;
        Ok(())
    }

    pub fn get_all_tasks(&self, limit: usize) -> Result<Vec<Task>, MemoryError> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, created_at, updated_at, title, status, context_json
             FROM tasks ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], row_to_task)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    // --- Timeline -----------------------------------------------------------

    pub fn log_event(&self, event: &str, details: Option<&str>) -> Result<(), MemoryError> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO timeline (ts, event, details) VALUES (?1, ?2, ?3)",
            params![now, event, details],
        )?;
        Ok(())
    }

    /// The most recent timeline events, oldest first.
    pub fn get_timeline(&self, limit: usize) -> Result<Vec<TimelineEvent>, MemoryError> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, ts, event, details FROM timeline ORDER BY id DESC LIMIT ?1",
        )?;
        let mut rows: Vec<TimelineEvent> = stmt
            .query_map(params![limit], |row| {
                Ok(TimelineEvent {
                    id: row.get(0)?,
                    ts: row.get(1)?,
                    event: row.get(2)?,
                    details: row.get(3)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        rows.reverse();
        Ok(rows)
    }

    // --- KV state -----------------------------------------------------------

    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), MemoryError> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                            updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    pub fn kv_get(&self, key: &str) -> Result<Option<String>, MemoryError> {
        let db = self.db.lock().unwrap();
        let row = db
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(row)
    }

    // --- Session snapshots --------------------------------------------------

    /// Compact and save a session snapshot on shutdown or `/clear`.
    ///
    /// Stores: when it started, when it ended, message count, latest summary,
    /// and a compressed context of the last few exchanges. No-op when the
    /// session has no messages.
    pub fn save_session_snapshot(&self, session_id: &str) -> Result<(), MemoryError> {
        let recent = self.get_recent_messages(session_id, SNAPSHOT_WINDOW)?;
        let summary = self.get_latest_summary(session_id)?.map(|s| s.summary);

        let db = self.db.lock().unwrap();
        let (msg_count, started_at): (i64, Option<String>) = db.query_row(
            "SELECT COUNT(*), MIN(ts) FROM messages WHERE session_id = ?1",
            params![session_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        if msg_count == 0 {
            return Ok(());
        }

        let mut context_parts: Vec<String> = Vec::new();
        for msg in &recent {
            if matches!(msg.role, MessageRole::Tool | MessageRole::ToolResult) {
                continue;
            }
            let mut content = msg.content.clone();
            if content.len() > SNAPSHOT_CONTENT_CHARS {
                content = truncate_chars(&content, SNAPSHOT_CONTENT_CHARS);
                content.push_str("...");
            }
            context_parts.push(format!("{}: {}", msg.role, content));
        }
        let context = if context_parts.is_empty() {
            None
        } else {
            Some(context_parts.join("\n"))
        };

        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO session_snapshots
                 (session_id, started_at, ended_at, message_count, summary, context)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(session_id) DO UPDATE SET
                 ended_at = excluded.ended_at,
                 message_count = excluded.message_count,
                 summary = COALESCE(excluded.summary, session_snapshots.summary),
                 context = excluded.context",
            params![session_id, started_at, now, msg_count, summary, context],
        )?;
        Ok(())
    }

    pub fn get_session_snapshots(
        &self,
        limit: usize,
    ) -> Result<Vec<SessionSnapshot>, MemoryError> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT session_id, started_at, ended_at, message_count, summary, context
             FROM session_snapshots ORDER BY ended_at DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], row_to_snapshot)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn get_session_snapshot(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionSnapshot>, MemoryError> {
        let db = self.db.lock().unwrap();
        let row = db
            .query_row(
                "SELECT session_id, started_at, ended_at, message_count, summary, context
                 FROM session_snapshots WHERE session_id = ?1",
                params![session_id],
                row_to_snapshot,
            )
            .optional()?;
        Ok(row)
    }

    // --- Profile facts ------------------------------------------------------

    /// Save or update a profile fact. Higher or equal confidence wins —
    /// equal confidence means fresher data replaces older.
    pub fn save_fact(
        &self,
        category: &str,
        key: &str,
        value: &str,
        confidence: f64,
        source: Option<&str>,
    ) -> Result<(), MemoryError> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let existing: Option<f64> = db
            .query_row(
                "SELECT confidence FROM user_profile WHERE category = ?1 AND key = ?2",
                params![category, key],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(old_conf) if confidence < old_conf => {
                debug!(category, key, old_conf, new_conf = confidence, "fact dropped: lower confidence");
            }
            Some(_) => {
                db.execute(
                    "UPDATE user_profile SET value = ?1, confidence = ?2, source = ?3,
                     updated_at = ?4 WHERE category = ?5 AND key = ?6",
                    params![value, confidence, source, now, category, key],
                )?;
            }
            None => {
                db.execute(
                    "INSERT INTO user_profile
                         (category, key, value, confidence, source, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                    params![category, key, value, confidence, source, now],
                )?;
            }
        }
        Ok(())
    }

    /// All facts, ordered by category then key.
    pub fn get_profile(&self) -> Result<Vec<ProfileFact>, MemoryError> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT category, key, value, confidence, source, created_at, updated_at
             FROM user_profile ORDER BY category, key",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ProfileFact {
                    category: row.get(0)?,
                    key: row.get(1)?,
                    value: row.get(2)?,
                    confidence: row.get(3)?,
                    source: row.get(4)?,
                    created_at: row.get(5)?,
                    updated_at: row.get(6)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn forget_fact(&self, category: &str, key: &str) -> Result<(), MemoryError> {
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "DELETE FROM user_profile WHERE category = ?1 AND key = ?2",
            params![category, key],
        )?;
        if n == 0 {
            return Err(MemoryError::FactNotFound {
                category: category.to_string(),
                key: key.to_string(),
            });
        }
        Ok(())
    }

    pub fn clear_profile(&self) -> Result<(), MemoryError> {
        let db = self.db.lock().unwrap();
        db.execute("DELETE FROM user_profile", [])?;
        Ok(())
    }

    // --- Context relay ------------------------------------------------------

    pub fn save_handoff(
        &self,
        from_model: &str,
        handoff: &str,
        session_id: Option<&str>,
    ) -> Result<(), MemoryError> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO context_relay (ts, from_model, handoff, session_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![now, from_model, handoff, session_id],
        )?;
        Ok(())
    }

    /// The most recent handoff, scoped to a session when one is given.
    pub fn latest_handoff(
        &self,
        session_id: Option<&str>,
    ) -> Result<Option<ContextHandoff>, MemoryError> {
        let db = self.db.lock().unwrap();
        let row = match session_id {
            Some(sid) => db
                .query_row(
                    "SELECT id, ts, from_model, to_model, handoff, session_id
                     FROM context_relay WHERE session_id = ?1 ORDER BY id DESC LIMIT 1",
                    params![sid],
                    row_to_handoff,
                )
                .optional()?,
            None => db
                .query_row(
                    "SELECT id, ts, from_model, to_model, handoff, session_id
                     FROM context_relay ORDER BY id DESC LIMIT 1",
                    [],
                    row_to_handoff,
                )
                .optional()?,
        };
        Ok(row)
    }
}

/// `covers_up_to` of the latest summary, or 0 when none exists.
fn latest_covered_id(db: &Connection, session_id: &str) -> Result<i64, MemoryError> {
    let row: Option<i64> = db
        .query_row(
            "SELECT covers_up_to FROM summaries WHERE session_id = ?1
             ORDER BY id DESC LIMIT 1",
            params![session_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(row.unwrap_or(0))
}

/// Truncate at a char boundary at or below `max` bytes.
fn truncate_chars(s: &str, max: usize) -> String {
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

fn row_to_handoff(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContextHandoff> {
    Ok(ContextHandoff {
        id: row.get(0)?,
        ts: row.get(1)?,
        from_model: row.get(2)?,
        to_model: row.get(3)?,
        handoff: row.get(4)?,
        session_id: row.get(5)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
    let role_str: String = row.get(3)?;
    Ok(StoredMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        ts: row.get(2)?,
        role: role_str.parse().unwrap_or(MessageRole::User),
        content: row.get(4)?,
        token_estimate: row.get(5)?,
    })
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let status_str: String = row.get(4)?;
    Ok(Task {
        id: row.get(0)?,
        created_at: row.get(1)?,
        updated_at: row.get(2)?,
        title: row.get(3)?,
        status: status_str.parse().unwrap_or(TaskStatus::Active),
        context_json: row.get(5)?,
    })
}

fn row_to_snapshot(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionSnapshot> {
    Ok(SessionSnapshot {
        session_id: row.get(0)?,
        started_at: row.get(1)?,
        ended_at: row.get(2)?,
        message_count: row.get(3)?,
        summary: row.get(4)?,
        context: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::open_in_memory().unwrap()
    }

    #[test]
    fn token_estimate_is_never_zero() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn message_ids_are_strictly_increasing() {
        let store = store();
        let mut last = 0;
        for i in 0..10 {
            let id = store
                .save_message("s1", MessageRole::User, &format!("message {i}"))
                .unwrap();
            assert!(id > last);
            last = id;
        }
    }

    #[test]
    fn recent_messages_come_back_in_order() {
        let store = store();
        for i in 0..5 {
            store
                .save_message("s1", MessageRole::User, &format!("m{i}"))
                .unwrap();
        }
        let recent = store.get_recent_messages("s1", 3).unwrap();
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn unsummarized_tracking_follows_coverage() {
        let store = store();
        let mut last_id = 0;
        for i in 0..6 {
            last_id = store
                .save_message("s1", MessageRole::User, &format!("m{i}"))
                .unwrap();
        }
        assert_eq!(store.count_unsummarized("s1").unwrap(), 6);

        store.save_summary("s1", "first six", last_id).unwrap();
        assert_eq!(store.count_unsummarized("s1").unwrap(), 0);
        assert!(store.get_unsummarized_messages("s1").unwrap().is_empty());

        store.save_message("s1", MessageRole::User, "m6").unwrap();
        assert_eq!(store.count_unsummarized("s1").unwrap(), 1);
    }

    #[test]
    fn summary_coverage_is_per_session() {
        let store = store();
        store.save_message("a", MessageRole::User, "hello").unwrap();
        let id = store.save_message("b", MessageRole::User, "hi").unwrap();
        store.save_summary("b", "b summary", id).unwrap();
        assert_eq!(store.count_unsummarized("a").unwrap(), 1);
        assert_eq!(store.count_unsummarized("b").unwrap(), 0);
    }

    #[test]
    fn active_task_is_a_singleton() {
        let store = store();
        store.upsert_task("first", TaskStatus::Active, None).unwrap();
        store.upsert_task("second", TaskStatus::Active, None).unwrap();

        let all = store.get_all_tasks(10).unwrap();
        let active: Vec<_> = all
            .iter()
            .filter(|t| t.status == TaskStatus::Active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].title, "second");

        store.complete_active_task().unwrap();
        assert!(store.get_active_task().unwrap().is_none());

        store.upsert_task("third", TaskStatus::Active, None).unwrap();
        let active = store.get_active_task().unwrap().unwrap();
        assert_eq!(active.title, "third");
    }

    #[test]
    fn fact_confidence_precedence() {
        let store = store();
        store.save_fact("name", "name", "Alex", 0.9, None).unwrap();

        // Lower confidence is dropped.
        store.save_fact("name", "name", "Ally", 0.4, None).unwrap();
        let facts = store.get_profile().unwrap();
        assert_eq!(facts[0].value, "Alex");

        // Equal confidence overwrites — freshness wins.
        store.save_fact("name", "name", "Alex2", 0.9, None).unwrap();
        let facts = store.get_profile().unwrap();
        assert_eq!(facts[0].value, "Alex2");

        // Higher confidence overwrites.
        store.save_fact("name", "name", "Alexander", 1.0, None).unwrap();
        let facts = store.get_profile().unwrap();
        assert_eq!(facts[0].value, "Alexander");
    }

    #[test]
    fn forget_and_clear_profile() {
        let store = store();
        store.save_fact("skills", "lang", "rust", 0.8, None).unwrap();
        store.forget_fact("skills", "lang").unwrap();
        assert!(store.get_profile().unwrap().is_empty());
        assert!(store.forget_fact("skills", "lang").is_err());

        store.save_fact("a", "b", "c", 0.5, None).unwrap();
        store.clear_profile().unwrap();
        assert!(store.get_profile().unwrap().is_empty());
    }

    #[test]
    fn kv_round_trip_and_overwrite() {
        let store = store();
        assert!(store.kv_get("last_session").unwrap().is_none());
        store.kv_set("last_session", "abc123").unwrap();
        store.kv_set("last_session", "def456").unwrap();
        assert_eq!(store.kv_get("last_session").unwrap().unwrap(), "def456");
    }

    #[test]
    fn snapshot_skips_empty_sessions_and_upserts() {
        let store = store();
        store.save_session_snapshot("empty").unwrap();
        assert!(store.get_session_snapshot("empty").unwrap().is_none());

        store.save_message("s1", MessageRole::User, "hello").unwrap();
        store
            .save_message("s1", MessageRole::Tool, "Called calc")
            .unwrap();
        store
            .save_message("s1", MessageRole::Assistant, "hi there")
            .unwrap();
        store.save_session_snapshot("s1").unwrap();

        let snap = store.get_session_snapshot("s1").unwrap().unwrap();
        assert_eq!(snap.message_count, 3);
        let context = snap.context.unwrap();
        // Tool rows are excluded from the compressed context.
        assert!(!context.contains("Called calc"));
        assert!(context.contains("user: hello"));

        // A second save updates ended_at and count in place.
        store.save_message("s1", MessageRole::User, "more").unwrap();
        store.save_session_snapshot("s1").unwrap();
        let snap2 = store.get_session_snapshot("s1").unwrap().unwrap();
        assert_eq!(snap2.message_count, 4);
        assert_eq!(store.get_session_snapshots(10).unwrap().len(), 1);
    }

    #[test]
    fn latest_handoff_prefers_session_scope() {
        let store = store();
        store.save_handoff("companion", "global note", None).unwrap();
        store
            .save_handoff("worker_heavy", "session note", Some("s1"))
            .unwrap();

        let h = store.latest_handoff(Some("s1")).unwrap().unwrap();
        assert_eq!(h.handoff, "session note");
        assert_eq!(h.from_model, "worker_heavy");

        let h = store.latest_handoff(None).unwrap().unwrap();
        assert_eq!(h.handoff, "session note");

        assert!(store.latest_handoff(Some("other")).unwrap().is_none());
    }

    #[test]
    fn timeline_is_append_only_and_ordered() {
        let store = store();
        store.log_event("session_start", Some("s1")).unwrap();
        store.log_event("route", Some("companion -> companion")).unwrap();
        let events = store.get_timeline(10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "session_start");
        assert_eq!(events[1].event, "route");
    }
}
