//! BOLT's persistence layer — a single embedded SQLite store holding
//! messages, summaries, tasks, timeline events, kv state, session snapshots,
//! profile facts, and context handoffs.
//!
//! The store owns every row; other components hold identifiers or short-lived
//! copies. Writes are serialized through one `Mutex<Connection>`.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::MemoryError;
pub use store::{estimate_tokens, MemoryStore};
