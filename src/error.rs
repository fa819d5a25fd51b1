use thiserror::Error;

/// Main error type for the guide cache engine
#[derive(Error, Debug)]
pub enum GuideEngineError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Feed errors, isolated per feed URL
    #[error("Feed '{url}' error: {message}")]
    Feed { url: String, message: String },

    /// A queued operation exceeded its execution budget
    #[error("Operation '{0}' timed out")]
    Timeout(String),

    /// A program record violated a schema invariant
    #[error("Invalid program record: {0}")]
    InvalidProgram(String),

    /// All feeds configured for a source failed
    #[error("Ingestion failed for source '{0}': all feeds failed")]
    IngestFailed(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl GuideEngineError {
    /// Whether this error is transient lock contention on the embedded store
    /// (SQLITE_BUSY / SQLITE_LOCKED) and therefore worth retrying.
    pub fn is_lock_contention(&self) -> bool {
        match self {
            GuideEngineError::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

impl From<String> for GuideEngineError {
    fn from(s: String) -> Self {
        GuideEngineError::Other(s)
    }
}

impl From<&str> for GuideEngineError {
    fn from(s: &str) -> Self {
        GuideEngineError::Other(s.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, GuideEngineError>;
