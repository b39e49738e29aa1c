//! Transport abstraction for the Kachaka API.
//!
//! The SDK only needs one primitive from the network: send a [`Request`] and
//! wait for its [`Response`]. A get-with-cursor call may stay pending for as
//! long as the remote value does not change, so implementations must not
//! impose a response timeout of their own.
//!
//! # Implementations
//!
//! - [`TcpTransport`] - one TCP connection per call, length-prefixed
//!   MessagePack frames
//! - [`MockTransport`] - queued responses for tests
//!
//! # Example
//!
//! ```ignore
//! let transport = TcpTransport::new("192.168.1.10:26400");
//! let response = transport
//!     .call(Request::Get { resource: Resource::RobotPose, cursor: Cursor::zero() })
//!     .await?;
//! ```

mod frame;
mod mock;
mod tcp;

pub use frame::{read_frame, write_frame};
pub use mock::MockTransport;
pub use tcp::{TcpTransport, DEFAULT_CONNECT_TIMEOUT};

use async_trait::async_trait;
use kachaka_types::{Request, Response, WireError};
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed before a response arrived.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Connection timeout.
    #[error("connection timeout")]
    Timeout,

    /// Encoding or framing failed.
    #[error("codec error: {0}")]
    Codec(#[from] WireError),
}

/// A unary request/response channel to a Kachaka API server.
///
/// Calls are independent: a suspended long-poll must not block other calls
/// issued through the same transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait for its response.
    ///
    /// Dropping the returned future abandons the call.
    async fn call(&self, request: Request) -> Result<Response, TransportError>;
}
