//! Durable storage gateways: the sample record store and the blob archive.

pub mod archive;
pub mod sqlite;
pub mod traits;

pub use archive::EncryptedArchive;
pub use sqlite::SqliteStore;
pub use traits::{BlobArchive, SampleStore, StoredRecord};
