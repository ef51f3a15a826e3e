use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tempfile::TempDir;

use crate::error::{TriageError, TriageResult};

/// One observation of a sample source, kept in the append-only history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub source: String,
}

/// The per-sample data container threaded through the pipeline
///
/// A record is created for one identifier at the start of a pipeline pass,
/// mutated in place by each stage, and either persisted or abandoned with an
/// `error` field. It does not outlive the pass; the durable trace of a hash
/// lives in the sample store.
///
/// Known fields (`source`, `hash`, `file_name`, `file_path`, `blob`, `error`,
/// `history`) are typed; stages extend the record through the `extra` map.
/// The blob, the history view and the record's own bookkeeping never reach
/// the persisted form. Extras can additionally be excluded from persistence
/// with [`SampleRecord::mark_transient`]; once marked, a field stays
/// transient for the rest of the pass.
#[derive(Debug)]
pub struct SampleRecord {
    /// Raw identifier this record was created for: file path, URL or hash
    source: String,
    /// Short content hash, immutable once set within a pass
    hash: Option<String>,
    file_name: Option<String>,
    file_path: Option<PathBuf>,
    /// Raw sample content. Never persisted.
    blob: Option<Vec<u8>>,
    /// Single-line `<stage>:<detail>` tag, present only after a contained
    /// stage failure
    error: Option<String>,
    /// View of the append-only source log, rebuilt from the store each pass
    history: Vec<HistoryEntry>,
    /// Open-ended stage extension fields
    extra: BTreeMap<String, Value>,
    /// Extra field names excluded from persistence
    transient: BTreeSet<String>,
    /// Scratch directory for sample bytes fetched from a URL or the archive.
    /// Owned by the record so it is removed when the record is dropped.
    temp_dir: Option<TempDir>,
}

impl SampleRecord {
    /// Create a fresh record for one identifier.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            hash: None,
            file_name: None,
            file_path: None,
            blob: None,
            error: None,
            history: Vec::new(),
            extra: BTreeMap::new(),
            transient: BTreeSet::new(),
            temp_dir: None,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    /// Set the content hash. Setting the same value again is a no-op;
    /// setting a different one is refused.
    pub fn set_hash(&mut self, hash: impl Into<String>) -> TriageResult<()> {
        let hash = hash.into();
        match &self.hash {
            Some(current) if *current != hash => Err(TriageError::HashConflict {
                current: current.clone(),
                proposed: hash,
            }),
            Some(_) => Ok(()),
            None => {
                self.hash = Some(hash);
                Ok(())
            }
        }
    }

    pub fn require_hash(&self) -> TriageResult<&str> {
        self.hash.as_deref().ok_or(TriageError::MissingField("hash"))
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn set_file_name(&mut self, name: impl Into<String>) {
        self.file_name = Some(name.into());
    }

    pub fn file_path(&self) -> Option<&PathBuf> {
        self.file_path.as_ref()
    }

    pub fn set_file_path(&mut self, path: impl Into<PathBuf>) {
        self.file_path = Some(path.into());
    }

    pub fn blob(&self) -> Option<&[u8]> {
        self.blob.as_deref()
    }

    pub fn require_blob(&self) -> TriageResult<&[u8]> {
        self.blob.as_deref().ok_or(TriageError::MissingField("blob"))
    }

    pub fn set_blob(&mut self, blob: Vec<u8>) {
        self.blob = Some(blob);
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Record a contained stage failure as the single-line
    /// `<stage>:<detail>` tag.
    pub fn record_error(&mut self, stage: &str, detail: impl std::fmt::Display) {
        self.error = Some(format!("{stage}:{detail}"));
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn set_history(&mut self, history: Vec<HistoryEntry>) {
        self.history = history;
    }

    /// File names this hash has been seen under, in observation order.
    pub fn known_file_names(&self) -> Vec<&str> {
        self.history
            .iter()
            .filter_map(|e| e.file_name.as_deref())
            .collect()
    }

    /// Sources this hash has been submitted from, in observation order.
    pub fn known_sources(&self) -> Vec<&str> {
        self.history.iter().map(|e| e.source.as_str()).collect()
    }

    pub fn set_extra(&mut self, key: impl Into<String>, value: Value) {
        self.extra.insert(key.into(), value);
    }

    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    pub fn has_extra(&self, key: &str) -> bool {
        self.extra.contains_key(key)
    }

    /// Get an extra as a string, failing when it is absent or not a string.
    pub fn extra_str(&self, key: &str) -> TriageResult<&str> {
        match self.extra.get(key) {
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(TriageError::FieldType(key.to_string())),
            None => Err(TriageError::MissingField("extra")),
        }
    }

    /// Exclude an extra field from every future persistence of this record.
    pub fn mark_transient(&mut self, key: impl Into<String>) {
        self.transient.insert(key.into());
    }

    pub fn is_transient(&self, key: &str) -> bool {
        self.transient.contains(key)
    }

    /// Path of the record's scratch directory, created on first use and
    /// removed when the record is dropped.
    pub fn temp_dir(&mut self) -> TriageResult<PathBuf> {
        if self.temp_dir.is_none() {
            self.temp_dir = Some(
                tempfile::Builder::new()
                    .prefix("triage_sample_")
                    .tempdir()?,
            );
        }
        // The option was just filled; MissingField is unreachable.
        let dir = self
            .temp_dir
            .as_ref()
            .ok_or(TriageError::MissingField("temp_dir"))?;
        Ok(dir.path().to_path_buf())
    }

    /// Fold a previously persisted record for the same hash into this one.
    /// Fields already present in this pass win; everything else is carried
    /// over from the stored record.
    pub fn merge_persisted(&mut self, stored: &Map<String, Value>) {
        for (key, value) in stored {
            match key.as_str() {
                // Identity of the current pass always wins.
                "source" | "hash" => {}
                // An error tag describes the run that produced it, not this one.
                "error" => {}
                "file_name" => {
                    if self.file_name.is_none() {
                        if let Value::String(s) = value {
                            self.file_name = Some(s.clone());
                        }
                    }
                }
                "file_path" => {
                    if self.file_path.is_none() {
                        if let Value::String(s) = value {
                            self.file_path = Some(PathBuf::from(s));
                        }
                    }
                }
                _ => {
                    if !self.extra.contains_key(key) {
                        self.extra.insert(key.clone(), value.clone());
                    }
                }
            }
        }
    }

    /// The durable form of this record: known fields plus extras, minus the
    /// blob, the history view and fields marked transient.
    pub fn to_persistable(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("source".to_string(), Value::String(self.source.clone()));
        if let Some(hash) = &self.hash {
            map.insert("hash".to_string(), Value::String(hash.clone()));
        }
        if let Some(name) = &self.file_name {
            map.insert("file_name".to_string(), Value::String(name.clone()));
        }
        if let Some(path) = &self.file_path {
            map.insert(
                "file_path".to_string(),
                Value::String(path.to_string_lossy().into_owned()),
            );
        }
        if let Some(error) = &self.error {
            map.insert("error".to_string(), Value::String(error.clone()));
        }
        for (key, value) in &self.extra {
            if !self.transient.contains(key) {
                map.insert(key.clone(), value.clone());
            }
        }
        map
    }

    /// The display form handed back to the caller: everything the run
    /// collected, including transient extras and the history view, minus the
    /// raw blob and internal bookkeeping.
    pub fn to_display(&self) -> Value {
        let mut map = Map::new();
        map.insert("source".to_string(), Value::String(self.source.clone()));
        if let Some(hash) = &self.hash {
            map.insert("hash".to_string(), Value::String(hash.clone()));
        }
        if let Some(name) = &self.file_name {
            map.insert("file_name".to_string(), Value::String(name.clone()));
        }
        if let Some(path) = &self.file_path {
            map.insert(
                "file_path".to_string(),
                Value::String(path.to_string_lossy().into_owned()),
            );
        }
        if let Some(error) = &self.error {
            map.insert("error".to_string(), Value::String(error.clone()));
        }
        if !self.history.is_empty() {
            let history: Vec<Value> = self
                .history
                .iter()
                .map(|e| {
                    let mut entry = Map::new();
                    entry.insert(
                        "timestamp".to_string(),
                        Value::String(e.timestamp.to_rfc3339()),
                    );
                    if let Some(name) = &e.file_name {
                        entry.insert("file_name".to_string(), Value::String(name.clone()));
                    }
                    entry.insert("source".to_string(), Value::String(e.source.clone()));
                    Value::Object(entry)
                })
                .collect();
            map.insert("history".to_string(), Value::Array(history));
        }
        for (key, value) in &self.extra {
            map.insert(key.clone(), value.clone());
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fresh_record() {
        let record = SampleRecord::new("./sample.bin");
        assert_eq!(record.source(), "./sample.bin");
        assert!(record.hash().is_none());
        assert!(record.error().is_none());
        assert!(record.history().is_empty());
    }

    #[test]
    fn test_hash_immutable_once_set() {
        let mut record = SampleRecord::new("x");
        record.set_hash("84de9c61").unwrap();
        // Same value again is fine
        record.set_hash("84de9c61").unwrap();
        // A different one is refused
        let err = record.set_hash("0badf00d").unwrap_err();
        assert!(matches!(err, TriageError::HashConflict { .. }));
        assert_eq!(record.hash(), Some("84de9c61"));
    }

    #[test]
    fn test_extra_accessors() {
        let mut record = SampleRecord::new("x");
        record.set_extra("sha256", json!("abc"));
        assert!(record.has_extra("sha256"));
        assert_eq!(record.extra_str("sha256").unwrap(), "abc");

        record.set_extra("count", json!(3));
        assert!(matches!(
            record.extra_str("count").unwrap_err(),
            TriageError::FieldType(_)
        ));
        assert!(record.extra_str("missing").is_err());
    }

    #[test]
    fn test_record_error_format() {
        let mut record = SampleRecord::new("x");
        record.record_error("load", "HTTP status 404");
        assert_eq!(record.error(), Some("load:HTTP status 404"));
    }

    #[test]
    fn test_persistable_strips_blob_and_transients() {
        let mut record = SampleRecord::new("./a");
        record.set_hash("84de9c61").unwrap();
        record.set_blob(b"raw bytes".to_vec());
        record.set_extra("sha256", json!("abc"));
        record.set_extra("sandbox_report", json!({"verdict": "clean"}));
        record.mark_transient("sandbox_report");

        let persisted = record.to_persistable();
        assert_eq!(persisted.get("source"), Some(&json!("./a")));
        assert_eq!(persisted.get("hash"), Some(&json!("84de9c61")));
        assert_eq!(persisted.get("sha256"), Some(&json!("abc")));
        assert!(!persisted.contains_key("blob"));
        assert!(!persisted.contains_key("sandbox_report"));
    }

    #[test]
    fn test_persistable_strips_history() {
        let mut record = SampleRecord::new("./a");
        record.set_hash("84de9c61").unwrap();
        record.set_history(vec![HistoryEntry {
            timestamp: Utc::now(),
            file_name: Some("a.bin".to_string()),
            source: "./a".to_string(),
        }]);
        assert!(!record.to_persistable().contains_key("history"));
    }

    #[test]
    fn test_display_keeps_transients_but_not_blob() {
        let mut record = SampleRecord::new("./a");
        record.set_blob(b"raw bytes".to_vec());
        record.set_extra("sandbox_report", json!({"verdict": "clean"}));
        record.mark_transient("sandbox_report");
        record.set_history(vec![HistoryEntry {
            timestamp: Utc::now(),
            file_name: None,
            source: "./a".to_string(),
        }]);

        let display = record.to_display();
        assert!(display.get("sandbox_report").is_some());
        assert!(display.get("history").is_some());
        assert!(display.get("blob").is_none());
    }

    #[test]
    fn test_merge_precedence() {
        // Persisted {a:1, b:2} + fresh {b:3, c:4} => {a:1, b:3, c:4}
        let mut record = SampleRecord::new("x");
        record.set_hash("84de9c61").unwrap();
        record.set_extra("b", json!(3));
        record.set_extra("c", json!(4));

        let mut stored = Map::new();
        stored.insert("a".to_string(), json!(1));
        stored.insert("b".to_string(), json!(2));
        record.merge_persisted(&stored);

        assert_eq!(record.extra("a"), Some(&json!(1)));
        assert_eq!(record.extra("b"), Some(&json!(3)));
        assert_eq!(record.extra("c"), Some(&json!(4)));
    }

    #[test]
    fn test_merge_fills_missing_core_fields() {
        let mut record = SampleRecord::new("84de9c61");
        record.set_hash("84de9c61").unwrap();

        let mut stored = Map::new();
        stored.insert("source".to_string(), json!("./old-path"));
        stored.insert("file_name".to_string(), json!("old.bin"));
        stored.insert("file_path".to_string(), json!("/tmp/old.bin"));
        record.merge_persisted(&stored);

        // source stays the current identifier, the rest is filled in
        assert_eq!(record.source(), "84de9c61");
        assert_eq!(record.file_name(), Some("old.bin"));
        assert_eq!(record.file_path(), Some(&PathBuf::from("/tmp/old.bin")));
    }

    #[test]
    fn test_merge_keeps_fresh_core_fields() {
        let mut record = SampleRecord::new("./new");
        record.set_file_name("new.bin");

        let mut stored = Map::new();
        stored.insert("file_name".to_string(), json!("old.bin"));
        stored.insert("error".to_string(), json!("load:HTTP status 500"));
        record.merge_persisted(&stored);

        assert_eq!(record.file_name(), Some("new.bin"));
        // A stale error tag is not inherited
        assert!(record.error().is_none());
    }

    #[test]
    fn test_known_views() {
        let mut record = SampleRecord::new("x");
        record.set_history(vec![
            HistoryEntry {
                timestamp: Utc::now(),
                file_name: Some("a.bin".to_string()),
                source: "./a.bin".to_string(),
            },
            HistoryEntry {
                timestamp: Utc::now(),
                file_name: None,
                source: "https://example.com/a".to_string(),
            },
        ]);
        assert_eq!(record.known_file_names(), vec!["a.bin"]);
        assert_eq!(
            record.known_sources(),
            vec!["./a.bin", "https://example.com/a"]
        );
    }

    #[test]
    fn test_temp_dir_scoped_to_record() {
        let path = {
            let mut record = SampleRecord::new("x");
            let dir = record.temp_dir().unwrap();
            assert!(dir.exists());
            // Repeated calls return the same directory
            assert_eq!(record.temp_dir().unwrap(), dir);
            dir
        };
        // Dropped with the record, not at process exit
        assert!(!path.exists());
    }
}
