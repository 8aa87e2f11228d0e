//! Error types for the dispatch server.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("No available port found in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },

    #[error("Failed to detect local IP address")]
    LocalIpUnavailable,

    #[error("Server is already listening")]
    AlreadyListening,

    #[error("Failed to bind listener: {0}")]
    Bind(String),

    #[error("Media file not found: {}", .0.display())]
    MediaNotFound(PathBuf),
}
