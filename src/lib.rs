//! Sample triage pipeline
//!
//! Analyzes file samples — local files, URLs, or previously seen content
//! hashes — by running each through a fixed, ordered chain of stages.
//! Results are persisted keyed by content hash, so resubmitting a sample
//! extends its prior record instead of recomputing it.

pub mod config;
pub mod digest;
pub mod error;
pub mod pipeline;
pub mod sandbox;
pub mod store;

pub use config::TriageConfig;
pub use error::{TriageError, TriageResult};
pub use pipeline::stages::standard_runner;
pub use pipeline::{Runner, RunnerBuilder, SampleRecord, SampleStage, StageFlow};
