use ltc_core::{CollapseError, WireError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("config error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error(transparent)]
    Collapse(#[from] CollapseError),
}

impl From<WireError> for StoreError {
    fn from(e: WireError) -> Self {
        match e {
            WireError::Json(e) => StoreError::Json(e),
            WireError::Collapse(e) => StoreError::Collapse(e),
            other => StoreError::InvalidData(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
