//! Digest helpers for sample content.

use sha2::{Digest, Sha256};

/// Number of hex characters in the short sample identifier.
const SHORT_HASH_LEN: usize = 8;

/// Full SHA-256 digest of `data` as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Full BLAKE3 digest of `data` as lowercase hex.
pub fn blake3_hex(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Short content identifier: the first 8 hex characters of the SHA-256
/// digest. Used as the key for the sample database and the blob archive.
pub fn short_hash(data: &[u8]) -> String {
    let mut digest = sha256_hex(data);
    digest.truncate(SHORT_HASH_LEN);
    digest
}

/// Returns whether `s` has the shape of a short sample identifier
/// (exactly 8 lowercase hex characters).
pub fn is_sample_hash(s: &str) -> bool {
    s.len() == SHORT_HASH_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_value() {
        // SHA-256 of the empty input
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_short_hash_is_prefix_of_full_digest() {
        let data = b"sample content";
        assert_eq!(short_hash(data), sha256_hex(data)[..8]);
    }

    #[test]
    fn test_short_hash_deterministic() {
        assert_eq!(short_hash(b"abc"), short_hash(b"abc"));
        assert_ne!(short_hash(b"abc"), short_hash(b"abd"));
    }

    #[test]
    fn test_short_hash_shape() {
        let hash = short_hash(b"anything");
        assert_eq!(hash.len(), 8);
        assert!(hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')));
        assert!(is_sample_hash(&hash));
    }

    #[test]
    fn test_blake3_differs_from_sha256() {
        let data = b"sample content";
        assert_ne!(blake3_hex(data), sha256_hex(data));
        assert_eq!(blake3_hex(data).len(), 64);
    }

    #[test]
    fn test_is_sample_hash() {
        assert!(is_sample_hash("84de9c61"));
        assert!(!is_sample_hash("84DE9C61")); // uppercase is not canonical
        assert!(!is_sample_hash("84de9c6")); // too short
        assert!(!is_sample_hash("84de9c612")); // too long
        assert!(!is_sample_hash("84de9c6g")); // not hex
        assert!(!is_sample_hash(""));
    }
}
