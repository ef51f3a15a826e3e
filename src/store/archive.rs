//! Encrypted on-disk blob archive
//!
//! One file per sample hash, encrypted with AES-256-GCM under a key derived
//! from the archive password. Entry layout: salt ‖ nonce ‖ ciphertext (the
//! GCM tag is appended to the ciphertext). The password is one shared secret
//! for the whole archive.

use std::path::PathBuf;

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use tracing::debug;

use crate::error::{TriageError, TriageResult};

use super::traits::BlobArchive;

// Constants
const SALT_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;
const PBKDF2_ITERATIONS: u32 = 600_000; // OWASP recommendation for 2024

/// Password-locked, write-once sample archive
pub struct EncryptedArchive {
    dir: PathBuf,
    password: String,
}

impl EncryptedArchive {
    /// Open the archive rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>, password: impl Into<String>) -> TriageResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            password: password.into(),
        })
    }

    fn entry_path(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("{hash}.bin"))
    }

    fn derive_key(&self, salt: &[u8]) -> [u8; KEY_SIZE] {
        let mut key = [0u8; KEY_SIZE];
        pbkdf2_hmac::<Sha256>(self.password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
        key
    }
}

impl BlobArchive for EncryptedArchive {
    fn exists(&self, hash: &str) -> TriageResult<bool> {
        Ok(self.entry_path(hash).exists())
    }

    fn store(&self, hash: &str, blob: &[u8]) -> TriageResult<()> {
        let path = self.entry_path(hash);
        if path.exists() {
            debug!(hash, "archive entry already present, first write wins");
            return Ok(());
        }

        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);

        let key_bytes = self.derive_key(&salt);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), blob)
            .map_err(|e| TriageError::EncryptionFailed(e.to_string()))?;

        let mut entry = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + ciphertext.len());
        entry.extend_from_slice(&salt);
        entry.extend_from_slice(&nonce_bytes);
        entry.extend_from_slice(&ciphertext);
        std::fs::write(&path, &entry)?;

        debug!(hash, bytes = blob.len(), "sample archived");
        Ok(())
    }

    fn retrieve(&self, hash: &str) -> TriageResult<Vec<u8>> {
        let path = self.entry_path(hash);
        if !path.exists() {
            return Err(TriageError::ArchiveEntryMissing(hash.to_string()));
        }
        let raw = std::fs::read(&path)?;
        if raw.len() < SALT_SIZE + NONCE_SIZE {
            return Err(TriageError::ArchiveEntryCorrupt(hash.to_string()));
        }
        let (salt, rest) = raw.split_at(SALT_SIZE);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);

        let key_bytes = self.derive_key(salt);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| TriageError::DecryptionFailed)
    }
}
