//! Error types for the discovery system.

use std::fmt;

/// Error type for discovery and description operations.
///
/// Represents the failure modes of device discovery: socket problems,
/// failed description fetches, and documents that cannot be understood.
#[derive(Debug)]
pub enum DiscoveryError {
    /// Network-related errors (socket creation, SSDP send, HTTP requests, etc.)
    NetworkError(String),
    /// Parsing errors (description XML, URLs, etc.)
    ParseError(String),
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DiscoveryError::ParseError(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for DiscoveryError {}

/// Convenience Result type alias for discovery operations.
///
/// Equivalent to `std::result::Result<T, DiscoveryError>`.
pub type Result<T> = std::result::Result<T, DiscoveryError>;
