//! The concrete triage stages and the standard stage order.

use std::sync::Arc;

use crate::config::TriageConfig;
use crate::error::TriageResult;
use crate::sandbox::{HttpSandbox, SandboxGateway};
use crate::store::{BlobArchive, EncryptedArchive, SampleStore, SqliteStore};

use super::runner::Runner;

mod digests;
mod history;
mod load;
mod persist;
mod sandbox;

pub use digests::DigestsStage;
pub use history::HistoryStage;
pub use load::LoadStage;
pub use persist::PersistStage;
pub use sandbox::SandboxStage;

/// Builds the standard runner: load, history, digests, sandbox, persist,
/// wired to the configured store, archive and sandbox gateways.
///
/// The order encodes the producer/consumer contract between the stages:
/// loading must precede everything that reads the blob or the hash, and
/// persistence runs last.
pub fn standard_runner(config: &TriageConfig) -> TriageResult<Runner> {
    let store: Arc<dyn SampleStore> = Arc::new(SqliteStore::open(&config.db_path)?);
    let archive: Arc<dyn BlobArchive> = Arc::new(EncryptedArchive::open(
        &config.archive_dir,
        &config.archive_password,
    )?);
    let sandbox: Arc<dyn SandboxGateway> =
        Arc::new(HttpSandbox::new(&config.sandbox_url, config.fetch_timeout)?);

    Ok(Runner::builder()
        .stage(LoadStage::new(
            store.clone(),
            archive.clone(),
            config.fetch_timeout,
            config.allow_local_files,
        )?)
        .stage(HistoryStage::new(store.clone()))
        .stage(DigestsStage::new())
        .stage(SandboxStage::new(sandbox))
        .stage(PersistStage::new(store, archive))
        .workers(config.workers)
        .build())
}
