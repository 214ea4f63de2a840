//! Shared configuration, error type, model roster, and process-wide mode
//! state for BOLT.

pub mod config;
pub mod error;
pub mod mode;

pub use config::{BoltConfig, ModelKey, ModelRoster};
pub use error::{BoltError, Result};
pub use mode::{Mode, ModeState};
