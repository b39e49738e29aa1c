//! Error types for kachaka-mock.

use kachaka_client::TransportError;
use kachaka_types::WireError;

/// Main error type for mock server operations.
#[derive(Debug, thiserror::Error)]
pub enum MockError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Seed loading error.
    #[error("seed error: {0}")]
    Seed(#[from] crate::seed::SeedError),

    /// Framing or connection error on a session.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Encoding error.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for mock server operations.
pub type Result<T> = std::result::Result<T, MockError>;
