//! Error taxonomy for the mirror agent.
//!
//! Only `Config` is fatal, and only at startup. Everything else is caught at
//! the narrowest scope that can continue and recorded in the logs.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Listing, metadata or token failure. The affected branch or file is skipped.
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Partial or failed content fetch. The file is left unstamped.
    #[error("Chunk transfer error: {0}")]
    ChunkTransfer(String),

    #[error("Filesystem error: {0}")]
    Filesystem(String),

    #[error("Rotation error: {0}")]
    Rotation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Cancelled")]
    Cancelled,
}

impl MirrorError {
    /// True for failures that leave the session runnable.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, MirrorError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, MirrorError>;
