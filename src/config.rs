use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{TriageError, TriageResult};

/// Runtime configuration for the triage pipeline
///
/// Defaults match a local development setup; every field can be overridden
/// through a `TRIAGE_*` environment variable (see [`TriageConfig::from_env`])
/// and most through CLI flags.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    /// Path to the sqlite database holding sample records and history
    pub db_path: PathBuf,

    /// Directory holding the encrypted per-hash sample archive
    pub archive_dir: PathBuf,

    /// Password protecting archive entries. One shared secret for the whole
    /// archive; every entry uses it.
    pub archive_password: String,

    /// Base URL of the remote sandbox analysis service
    pub sandbox_url: String,

    /// Per-request deadline for URL fetches and sandbox calls
    pub fetch_timeout: Duration,

    /// Whether local file paths are accepted as sample sources. Disable when
    /// identifiers come from untrusted callers.
    pub allow_local_files: bool,

    /// Number of samples processed concurrently in one batch
    pub workers: usize,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/triage.sqlite"),
            archive_dir: PathBuf::from("data/samples"),
            archive_password: "infected".to_string(),
            sandbox_url: "http://localhost:4242".to_string(),
            fetch_timeout: Duration::from_secs(10),
            allow_local_files: true,
            workers: 1,
        }
    }
}

impl TriageConfig {
    /// Build a configuration from defaults plus `TRIAGE_*` environment
    /// overrides.
    pub fn from_env() -> TriageResult<Self> {
        let mut config = Self::default();
        if let Ok(v) = env::var("TRIAGE_DB") {
            config.db_path = PathBuf::from(v);
        }
        if let Ok(v) = env::var("TRIAGE_ARCHIVE_DIR") {
            config.archive_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("TRIAGE_ARCHIVE_PASSWORD") {
            config.archive_password = v;
        }
        if let Ok(v) = env::var("TRIAGE_SANDBOX_URL") {
            config.sandbox_url = v;
        }
        if let Ok(v) = env::var("TRIAGE_FETCH_TIMEOUT_SECS") {
            let secs: u64 = v
                .parse()
                .map_err(|_| TriageError::Config(format!("TRIAGE_FETCH_TIMEOUT_SECS: {v}")))?;
            config.fetch_timeout = Duration::from_secs(secs);
        }
        if let Ok(v) = env::var("TRIAGE_ALLOW_LOCAL_FILES") {
            config.allow_local_files = parse_bool(&v)
                .ok_or_else(|| TriageError::Config(format!("TRIAGE_ALLOW_LOCAL_FILES: {v}")))?;
        }
        if let Ok(v) = env::var("TRIAGE_WORKERS") {
            let workers: usize = v
                .parse()
                .map_err(|_| TriageError::Config(format!("TRIAGE_WORKERS: {v}")))?;
            config.workers = workers.max(1);
        }
        Ok(config)
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TriageConfig::default();
        assert_eq!(config.fetch_timeout, Duration::from_secs(10));
        assert!(config.allow_local_files);
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("OFF"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
