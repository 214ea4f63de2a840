//! BOLT's agent core: inference clients, routing, identity and context
//! assembly, the tool system, background workers, and the staged build
//! pipeline.
//!
//! The collaborator surfaces (terminal REPL, web UI) drive everything
//! through [`runtime::Brain`]; nothing in this crate renders output or
//! reads input directly.

pub mod cloud;
pub mod cloud_stream;
pub mod context;
pub mod identity;
pub mod ollama;
pub mod pipeline;
pub mod prompts;
pub mod provider;
pub mod router;
pub mod runtime;
pub mod status;
pub mod stream;
pub mod tools;
pub mod workers;

pub use cloud::CloudClient;
pub use ollama::OllamaClient;
pub use provider::{ChatBackend, ChatMessage, CloudBackend, ModelHost, ProviderError, WireRole};
pub use runtime::Brain;
pub use stream::{StreamErrorKind, StreamEvent};
pub use tools::ToolRegistry;
