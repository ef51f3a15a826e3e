use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use crate::digest;
use crate::pipeline::core::{SampleStage, StageFlow, StageOutcome};
use crate::pipeline::record::{HistoryEntry, SampleRecord};
use crate::store::SampleStore;

/// Tracks every source a hash has ever been submitted from
///
/// Appends the current observation to the store's append-only history log,
/// then rebuilds the record's history view from it. A source that is itself
/// a hash is a reprocessing lookup, not a new observation, and appends
/// nothing.
///
/// # Record fields read
/// * `hash` - short content hash
/// * `source` - file path, URL or hash of the sample
/// * `file_name` - original name of the sample, when known
///
/// # Record fields written
/// * `history` - the full observation log (never persisted; rebuilt each run)
/// * `known_file_names` - file names from the log, in observation order
/// * `known_sources` - sources from the log, in observation order
pub struct HistoryStage {
    store: Arc<dyn SampleStore>,
}

impl HistoryStage {
    pub fn new(store: Arc<dyn SampleStore>) -> Self {
        Self { store }
    }
}

impl SampleStage for HistoryStage {
    fn execute(&self, record: &mut SampleRecord) -> StageOutcome {
        let hash = record.require_hash()?.to_string();

        if !digest::is_sample_hash(record.source()) {
            let entry = HistoryEntry {
                timestamp: Utc::now(),
                file_name: record.file_name().map(str::to_string),
                source: record.source().to_string(),
            };
            self.store.append_history(&hash, &entry)?;
        } else {
            debug!(%hash, "reprocessing lookup, no new observation");
        }

        let history = self.store.history(&hash)?;
        let names: Vec<Value> = history
            .iter()
            .filter_map(|e| e.file_name.clone())
            .map(Value::String)
            .collect();
        let sources: Vec<Value> = history
            .iter()
            .map(|e| Value::String(e.source.clone()))
            .collect();
        record.set_extra("known_file_names", Value::Array(names));
        record.set_extra("known_sources", Value::Array(sources));
        record.set_history(history);
        Ok(StageFlow::Continue)
    }

    fn name(&self) -> &str {
        "history"
    }
}
