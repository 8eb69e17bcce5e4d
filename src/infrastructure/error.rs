use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Invalid event data: {0}")]
    InvalidEvent(String),
    #[error("Resource busy: {0}")]
    ResourceBusy(String),
    #[error("Backend error: {0}")]
    Backend(String),
}
