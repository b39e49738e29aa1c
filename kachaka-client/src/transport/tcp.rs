//! TCP transport: one connection per call.
//!
//! A call connects, writes one request frame, reads one response frame and
//! closes. Dropping a call mid-flight closes its connection, which is how
//! the server learns that a suspended get was abandoned.

use super::{read_frame, write_frame, Transport, TransportError};
use async_trait::async_trait;
use kachaka_types::{Request, Response};
use std::time::Duration;
use tokio::net::TcpStream;

/// Default time allowed to establish a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Transport over plain TCP.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    address: String,
    connect_timeout: Duration,
}

impl TcpTransport {
    /// Create a transport for `address` (`host:port`).
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the connect timeout.
    ///
    /// Only connection setup is bounded; a long-poll may wait indefinitely
    /// for its response.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The server address.
    pub fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&self) -> Result<TcpStream, TransportError> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "failed to set TCP_NODELAY");
        }
        Ok(stream)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn call(&self, request: Request) -> Result<Response, TransportError> {
        let body = request.to_bytes()?;
        let stream = self.connect().await?;
        let (mut reader, mut writer) = stream.into_split();

        write_frame(&mut writer, &body).await?;
        tracing::trace!(address = %self.address, bytes = body.len(), "request sent");

        let response = read_frame(&mut reader).await?;
        Ok(Response::from_bytes(&response)?)
    }
}
