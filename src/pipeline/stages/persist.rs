use std::sync::Arc;

use tracing::debug;

use crate::pipeline::core::{SampleStage, StageFlow, StageOutcome};
use crate::pipeline::record::SampleRecord;
use crate::store::{BlobArchive, SampleStore};

/// Writes the record and the sample content to durable storage
///
/// The record (minus blob, history view and transient fields) is upserted
/// under its hash; the sample content is archived once, on first sight —
/// content is immutable once hashed, so an existing archive entry is left
/// alone. Runs last, and still runs when an earlier stage finished the
/// record early.
///
/// # Record fields read
/// * `hash` - short content hash
/// * `blob` - sample content bytes
/// * every persistable field, via the record's durable form
///
/// # Record fields written
/// * none
pub struct PersistStage {
    store: Arc<dyn SampleStore>,
    archive: Arc<dyn BlobArchive>,
}

impl PersistStage {
    pub fn new(store: Arc<dyn SampleStore>, archive: Arc<dyn BlobArchive>) -> Self {
        Self { store, archive }
    }
}

impl SampleStage for PersistStage {
    fn execute(&self, record: &mut SampleRecord) -> StageOutcome {
        let hash = record.require_hash()?.to_string();
        self.store.put(&hash, &record.to_persistable())?;

        if !self.archive.exists(&hash)? {
            let blob = record.require_blob()?;
            debug!(%hash, "archiving sample content");
            self.archive.store(&hash, blob)?;
        }
        Ok(StageFlow::Continue)
    }

    fn name(&self) -> &str {
        "persist"
    }

    fn runs_after_finish(&self) -> bool {
        true
    }
}
