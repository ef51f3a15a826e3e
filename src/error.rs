use thiserror::Error;

/// Central error type for the triage pipeline
#[derive(Error, Debug)]
pub enum TriageError {
    // ============================================================================
    // Source Loading Errors
    // ============================================================================
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Local file sources are disabled")]
    LocalFilesDisabled,

    #[error("Failed to read local file: {0}")]
    FileUnreadable(String),

    // ============================================================================
    // Record Errors
    // ============================================================================
    #[error("Record hash already set to {current}, refusing {proposed}")]
    HashConflict { current: String, proposed: String },

    #[error("Required record field not set: {0}")]
    MissingField(&'static str),

    #[error("Record field '{0}' has an unexpected type")]
    FieldType(String),

    // ============================================================================
    // Archive Errors
    // ============================================================================
    #[error("No archive entry for hash {0}")]
    ArchiveEntryMissing(String),

    #[error("Archive entry for hash {0} is truncated")]
    ArchiveEntryCorrupt(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: incorrect password or corrupted entry")]
    DecryptionFailed,

    // ============================================================================
    // Sandbox Errors
    // ============================================================================
    #[error("Sandbox rejected submission: HTTP status {0}")]
    SandboxRejected(u16),

    #[error("Sandbox returned an unusable response: {0}")]
    SandboxResponse(String),

    // ============================================================================
    // Runner Errors
    // ============================================================================
    #[error("Worker thread panicked")]
    WorkerPanicked,

    // ============================================================================
    // Generic/System Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

// Helper type alias for Results
pub type TriageResult<T> = Result<T, TriageError>;
