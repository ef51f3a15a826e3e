//! Gateway trait definitions for the persistence layer
//!
//! These traits are the narrow seam between the pipeline and durable
//! storage. Different implementations can provide different backends; tests
//! substitute in-memory ones.

use serde_json::{Map, Value};

use crate::error::TriageResult;
use crate::pipeline::record::HistoryEntry;

/// The persisted form of a sample record: its field mapping with blob and
/// transient fields already stripped.
pub type StoredRecord = Map<String, Value>;

/// Durable store of sample records and their source history, keyed by the
/// short content hash
///
/// Upserts are atomic per key. Concurrent writers for the *same* hash
/// resolve last-writer-wins on the record while history is append-only, so
/// re-running converges via the merge step.
pub trait SampleStore: Send + Sync {
    /// Load the persisted record for a hash, if any.
    fn get(&self, hash: &str) -> TriageResult<Option<StoredRecord>>;

    /// Upsert the record for a hash, refreshing its update timestamp.
    fn put(&self, hash: &str, record: &StoredRecord) -> TriageResult<()>;

    /// Append one source observation to the hash's history log. Identical
    /// observations (same file name and source) are kept once.
    fn append_history(&self, hash: &str, entry: &HistoryEntry) -> TriageResult<()>;

    /// The hash's full history log, oldest first.
    fn history(&self, hash: &str) -> TriageResult<Vec<HistoryEntry>>;
}

/// Write-once archive of raw sample content, keyed by the short content hash
pub trait BlobArchive: Send + Sync {
    /// Whether an entry exists for this hash.
    fn exists(&self, hash: &str) -> TriageResult<bool>;

    /// Store sample content for a hash. Content is immutable once hashed:
    /// when an entry already exists the first write wins and this is a
    /// no-op.
    fn store(&self, hash: &str, blob: &[u8]) -> TriageResult<()>;

    /// Retrieve previously archived sample content.
    fn retrieve(&self, hash: &str) -> TriageResult<Vec<u8>>;
}
