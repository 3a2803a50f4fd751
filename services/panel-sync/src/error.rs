//! Error types for the panel-sync service

/// Errors that can occur in the panel-sync service
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Server returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Render error: {0}")]
    Render(String),

    #[error("Page size must be at least 1, got {0}")]
    InvalidPageSize(u64),

    #[error("Multiplier must be at least 1, got {0}")]
    InvalidMultiplier(u64),

    #[error("Poll session '{0}' is no longer running")]
    SessionStopped(String),

    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Job error: {0}")]
    Job(String),
}

/// Result type alias for panel-sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
