use sitesweep_scanner::ScanError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Scanner error: {0}")]
    Scan(#[from] ScanError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Audit session not found: {0}")]
    SessionNotFound(String),
}

pub type Result<T> = std::result::Result<T, AuditError>;
