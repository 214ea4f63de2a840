use rusqlite::{Connection, Result};

/// Initialise all BOLT tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    create_conversation_tables(conn)?;
    create_task_tables(conn)?;
    create_state_tables(conn)?;
    create_profile_tables(conn)?;
    Ok(())
}

fn create_conversation_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messages (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id     TEXT NOT NULL,
            ts             TEXT NOT NULL,
            role           TEXT NOT NULL,
            content        TEXT NOT NULL,
            token_estimate INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_session
            ON messages(session_id, id);

        CREATE TABLE IF NOT EXISTS summaries (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id     TEXT NOT NULL,
            ts             TEXT NOT NULL,
            summary        TEXT NOT NULL,
            covers_up_to   INTEGER NOT NULL,
            token_estimate INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_summaries_session
            ON summaries(session_id, id);",
    )
}

fn create_task_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tasks (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at   TEXT NOT NULL,
            updated_at   TEXT NOT NULL,
            title        TEXT NOT NULL,
            status       TEXT NOT NULL DEFAULT 'active',
            context_json TEXT
        );",
    )
}

fn create_state_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS timeline (
            id      INTEGER PRIMARY KEY AUTOINCREMENT,
            ts      TEXT NOT NULL,
            event   TEXT NOT NULL,
            details TEXT
        );

        CREATE TABLE IF NOT EXISTS kv (
            key        TEXT PRIMARY KEY,
            value      TEXT,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS session_snapshots (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id    TEXT NOT NULL UNIQUE,
            started_at    TEXT,
            ended_at      TEXT NOT NULL,
            message_count INTEGER NOT NULL DEFAULT 0,
            summary       TEXT,
            context       TEXT
        );",
    )
}

fn create_profile_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS user_profile (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            category   TEXT NOT NULL,
            key        TEXT NOT NULL,
            value      TEXT NOT NULL,
            confidence REAL NOT NULL DEFAULT 0.5,
            source     TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(category, key)
        );

        CREATE TABLE IF NOT EXISTS context_relay (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            ts         TEXT NOT NULL,
            from_model TEXT,
            to_model   TEXT,
            handoff    TEXT NOT NULL,
            session_id TEXT
        );",
    )
}
