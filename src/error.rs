//! Error types for the glucose log application

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GlucoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External service error: {0}")]
    Collaborator(String),

    #[error("No active profile, run `glucolog login <profile>` first")]
    NoActiveProfile,

    #[error("Report error: {0}")]
    Report(String),
}
