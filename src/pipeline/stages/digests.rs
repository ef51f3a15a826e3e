use serde_json::Value;
use tracing::debug;

use crate::digest;
use crate::pipeline::core::{SampleStage, StageFlow, StageOutcome};
use crate::pipeline::record::SampleRecord;

/// Computes secondary full digests of the sample content
///
/// # Record fields read
/// * `blob` - sample content bytes
///
/// # Record fields written
/// * `sha256` - full SHA-256 digest, lowercase hex
/// * `blake3` - full BLAKE3 digest, lowercase hex
///
/// A no-op when both digests are already present (merged from a previous
/// run).
pub struct DigestsStage;

impl DigestsStage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DigestsStage {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleStage for DigestsStage {
    fn execute(&self, record: &mut SampleRecord) -> StageOutcome {
        if record.has_extra("sha256") && record.has_extra("blake3") {
            debug!("digests already present");
            return Ok(StageFlow::Continue);
        }
        let (sha256, blake3) = {
            let blob = record.require_blob()?;
            (digest::sha256_hex(blob), digest::blake3_hex(blob))
        };
        record.set_extra("sha256", Value::String(sha256));
        record.set_extra("blake3", Value::String(blake3));
        Ok(StageFlow::Continue)
    }

    fn name(&self) -> &str {
        "digests"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_digests_computed() {
        let mut record = SampleRecord::new("./a");
        record.set_blob(b"sample content".to_vec());

        DigestsStage::new().execute(&mut record).unwrap();

        assert_eq!(
            record.extra_str("sha256").unwrap(),
            digest::sha256_hex(b"sample content")
        );
        assert_eq!(
            record.extra_str("blake3").unwrap(),
            digest::blake3_hex(b"sample content")
        );
    }

    #[test]
    fn test_skips_when_already_present() {
        let mut record = SampleRecord::new("./a");
        record.set_blob(b"sample content".to_vec());
        record.set_extra("sha256", json!("sentinel-a"));
        record.set_extra("blake3", json!("sentinel-b"));

        DigestsStage::new().execute(&mut record).unwrap();

        // Existing values were not recomputed
        assert_eq!(record.extra_str("sha256").unwrap(), "sentinel-a");
        assert_eq!(record.extra_str("blake3").unwrap(), "sentinel-b");
    }

    #[test]
    fn test_missing_blob_is_fatal() {
        let mut record = SampleRecord::new("./a");
        let result = DigestsStage::new().execute(&mut record);
        assert!(matches!(
            result,
            Err(crate::pipeline::core::StageError::Fatal(_))
        ));
    }
}
