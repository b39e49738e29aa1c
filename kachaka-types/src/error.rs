//! Error types for the wire format.

use thiserror::Error;

/// Errors that can occur while encoding or decoding wire messages.
#[derive(Debug, Error)]
pub enum WireError {
    /// MessagePack serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] rmp_serde::encode::Error),

    /// MessagePack deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] rmp_serde::decode::Error),

    /// Unknown resource discriminator
    #[error("invalid resource: {0}")]
    InvalidResource(u8),

    /// Frame exceeds the maximum allowed size
    #[error("frame too large: {size} bytes (limit: {limit} bytes)")]
    FrameTooLarge {
        /// Size announced by the length prefix.
        size: usize,
        /// Maximum allowed frame size.
        limit: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = WireError::InvalidResource(99);
        assert_eq!(err.to_string(), "invalid resource: 99");

        let err = WireError::FrameTooLarge { size: 10, limit: 5 };
        assert_eq!(err.to_string(), "frame too large: 10 bytes (limit: 5 bytes)");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WireError>();
    }
}
