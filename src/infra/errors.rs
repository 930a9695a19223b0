// src/infra/errors.rs — Error types for pagecap

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PagecapError {
    // Message source errors (retriable unless stated otherwise)
    #[error("Source '{source_id}' error: {message}")]
    Source {
        source_id: String,
        message: String,
        retriable: bool,
    },

    #[error("Rate limited by '{source_id}', retry after {retry_after_ms}ms")]
    RateLimited {
        source_id: String,
        retry_after_ms: u64,
    },

    // Persistence
    #[error("Store write for '{document}' failed: {message}")]
    Store { document: String, message: String },

    #[error("Document '{0}' not found")]
    DocumentNotFound(String),

    // Capture service
    #[error("Capture service stopped")]
    ServiceStopped,

    // User errors
    #[error("No channel configured. Set [watch].channel or pass --channel.")]
    NoChannel,

    #[error("Bot token missing: environment variable {0} is not set")]
    MissingToken(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // Infra
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PagecapError {
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            PagecapError::Source {
                retriable: true,
                ..
            } | PagecapError::RateLimited { .. }
        )
    }

    /// Server-provided wait hint, if any.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            PagecapError::RateLimited { retry_after_ms, .. } if *retry_after_ms > 0 => {
                Some(*retry_after_ms)
            }
            _ => None,
        }
    }
}
