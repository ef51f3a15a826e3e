use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::digest;
use crate::error::{TriageError, TriageResult};
use crate::pipeline::core::{Containable, SampleStage, StageError, StageFlow, StageOutcome};
use crate::pipeline::record::SampleRecord;
use crate::store::{BlobArchive, SampleStore};

/// Resolves `source` into sample content and identity, then folds in any
/// previously persisted record for the same hash
///
/// Three source kinds, tried in order: an `http(s)://` URL is fetched; an
/// 8-hex hash is retrieved from the blob archive (the hash is taken as-is,
/// no re-hashing); anything else is read as a local file. URL and archive
/// content is written to the record's scratch directory so later stages have
/// a file to point at.
///
/// # Record fields read
/// * `source` - file path, URL or hash of the sample
///
/// # Record fields written
/// * `blob` - sample content bytes (never persisted)
/// * `hash` - short content hash, first 8 hex chars of SHA-256
/// * `file_name` - original name of the local file or URL (absent for hash sources)
/// * `file_path` - path to a file containing the sample
///
/// Contained failures: HTTP error status or transport error, missing or
/// undecryptable archive entry, unreadable local file, local sources
/// disabled by configuration.
pub struct LoadStage {
    store: Arc<dyn SampleStore>,
    archive: Arc<dyn BlobArchive>,
    http: reqwest::blocking::Client,
    allow_local_files: bool,
}

impl LoadStage {
    pub fn new(
        store: Arc<dyn SampleStore>,
        archive: Arc<dyn BlobArchive>,
        fetch_timeout: Duration,
        allow_local_files: bool,
    ) -> TriageResult<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| TriageError::Network(e.to_string()))?;
        Ok(Self {
            store,
            archive,
            http,
            allow_local_files,
        })
    }

    fn load_source(&self, record: &mut SampleRecord) -> Result<(), StageError> {
        let source = record.source().to_string();
        if source.starts_with("http://") || source.starts_with("https://") {
            self.fetch_url(record, &source)?;
        } else if digest::is_sample_hash(&source) {
            self.load_archived(record, &source)?;
        } else {
            self.load_local(record, &source)?;
        }
        debug!(
            source,
            bytes = record.blob().map(<[u8]>::len).unwrap_or(0),
            "sample loaded"
        );
        Ok(())
    }

    fn fetch_url(&self, record: &mut SampleRecord, url: &str) -> Result<(), StageError> {
        debug!(url, "fetching sample from URL");
        let resp = self
            .http
            .get(url)
            .send()
            .map_err(|e| TriageError::Network(e.to_string()))
            .contained()?;
        if !resp.status().is_success() {
            return Err(TriageError::HttpStatus(resp.status().as_u16())).contained();
        }
        let blob = resp
            .bytes()
            .map_err(|e| TriageError::Network(e.to_string()))
            .contained()?
            .to_vec();

        let hash = digest::short_hash(&blob);
        record.set_hash(&hash)?;
        let file_name = url_file_name(url).unwrap_or_else(|| format!("UNKNOWN_{hash}"));
        // Keep a copy of the download for later stages
        let file_path = record.temp_dir()?.join(&file_name);
        std::fs::write(&file_path, &blob)?;
        record.set_file_name(file_name);
        record.set_file_path(file_path);
        record.set_blob(blob);
        Ok(())
    }

    fn load_archived(&self, record: &mut SampleRecord, hash: &str) -> Result<(), StageError> {
        debug!(hash, "loading previously archived sample");
        let blob = self.archive.retrieve(hash).contained()?;
        record.set_hash(hash)?;
        // No file_name here: the original name, if any, comes from the merge
        let file_path = record.temp_dir()?.join("sample");
        std::fs::write(&file_path, &blob)?;
        record.set_file_path(file_path);
        record.set_blob(blob);
        Ok(())
    }

    fn load_local(&self, record: &mut SampleRecord, path: &str) -> Result<(), StageError> {
        if !self.allow_local_files {
            return Err(TriageError::LocalFilesDisabled).contained();
        }
        debug!(path, "loading local file");
        let blob = std::fs::read(path)
            .map_err(|e| TriageError::FileUnreadable(format!("{path}: {e}")))
            .contained()?;
        record.set_hash(digest::short_hash(&blob))?;
        if let Some(name) = Path::new(path).file_name() {
            record.set_file_name(name.to_string_lossy());
        }
        let file_path = std::fs::canonicalize(path).unwrap_or_else(|_| PathBuf::from(path));
        record.set_file_path(file_path);
        record.set_blob(blob);
        Ok(())
    }

    /// The identity/merge step: previously persisted fields for this hash
    /// are folded in, current-run fields winning.
    fn merge_stored(&self, record: &mut SampleRecord) -> TriageResult<()> {
        let hash = record.require_hash()?.to_string();
        if let Some(stored) = self.store.get(&hash)? {
            debug!(%hash, "merging previously persisted record");
            record.merge_persisted(&stored);
        }
        Ok(())
    }
}

impl SampleStage for LoadStage {
    fn execute(&self, record: &mut SampleRecord) -> StageOutcome {
        self.load_source(record)?;
        self.merge_stored(record)?;
        Ok(StageFlow::Continue)
    }

    fn name(&self) -> &str {
        "load"
    }
}

/// Last path segment of a URL, if it has a usable one.
fn url_file_name(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let name = parsed.path_segments()?.last()?.to_string();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
