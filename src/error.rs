//! Error types shared by the client, the selection engine and the bulk fan-outs.

use crate::datasource::DataSourceId;
use reqwest::StatusCode;
use std::fmt;
use thiserror::Error;

/// Result type for data source operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Data source management errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The API answered with a status other than the one the operation expects
    #[error("HTTP error occurred: {status} - {body}")]
    Remote { status: StatusCode, body: String },

    /// Connection, timeout or body-read failure
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Malformed JSON in a response or a snapshot file
    #[error("Invalid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Snapshot file could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad operator input, rejected before any request is made
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The admission gate was closed while work was still being scheduled
    #[error("Admission gate is closed")]
    GateClosed,
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Lifecycle failures abort the whole run instead of just the item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::GateClosed)
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Remote { status, .. } => Some(*status),
            Self::Transport(e) => e.status(),
            _ => None,
        }
    }
}

/// A single item of a fan-out that failed without stopping its siblings
#[derive(Debug)]
pub struct ItemFailure {
    pub id: DataSourceId,
    pub name: Option<String>,
    pub error: Error,
}

impl ItemFailure {
    pub fn new(id: DataSourceId, error: Error) -> Self {
        Self { id, name: None, error }
    }

    pub fn named(id: DataSourceId, name: &str, error: Error) -> Self {
        Self {
            id,
            name: Some(name.to_string()),
            error,
        }
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} - {}: {}", name, self.id, format_error(&self.error)),
            None => write!(f, "{}: {}", self.id, format_error(&self.error)),
        }
    }
}

/// Format an error for the operator.
/// Remote bodies are truncated so a large HTML error page does not flood the terminal.
pub fn format_error(error: &Error) -> String {
    match error.status().map(|s| s.as_u16()) {
        Some(401) => return "Authentication failed. Check the API key for this environment.".to_string(),
        Some(403) => return "Permission denied. The API key needs admin rights.".to_string(),
        Some(404) => return "Data source not found.".to_string(),
        Some(429) => return "Rate limit exceeded. Lower --concurrency and try again.".to_string(),
        _ => {}
    }

    let error_str = error.to_string();
    let sanitized = error_str
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(120)
        .collect::<String>();

    if sanitized.len() < error_str.len() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}
