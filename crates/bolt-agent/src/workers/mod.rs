//! Background workers — summarizer, task tracker, profile learner, and the
//! model keep-alive heartbeat. Long-running workers are tokio tasks that
//! stop cooperatively via a `watch` channel, bounded by their poll interval.

pub mod heartbeat;
pub mod profile;
pub mod summarizer;
pub mod tasks;

pub use heartbeat::Heartbeat;
pub use profile::ProfileLearner;
pub use summarizer::Summarizer;
pub use tasks::TaskTracker;
