//! Ordered-stage execution engine for sample records
//!
//! Each identifier in a batch gets a fresh [`SampleRecord`] that flows
//! through a fixed, ordered list of stages. Stages read and write record
//! fields under documented contracts; the [`Runner`] applies the failure
//! policy (contained failure stops one record, finish-early skips to
//! persistence, anything else aborts the batch) and keeps results correlated
//! with the input order.

pub mod core;
pub mod record;
pub mod runner;
pub mod stages;

// Re-export main types
pub use core::{Containable, SampleStage, StageError, StageFlow, StageOutcome};
pub use record::{HistoryEntry, SampleRecord};
pub use runner::{CancelHandle, Runner, RunnerBuilder};
