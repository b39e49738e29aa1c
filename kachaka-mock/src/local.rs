//! In-process transport.

use crate::server::MockServer;
use async_trait::async_trait;
use kachaka_client::{Transport, TransportError};
use kachaka_types::{Request, Response};
use std::sync::Arc;

/// A [`Transport`] that calls a [`MockServer`] directly.
///
/// Requests still go through the wire codec so that anything the TCP path
/// would reject is rejected here too.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    server: Arc<MockServer>,
}

impl LocalTransport {
    /// Create a transport for `server`.
    pub fn new(server: Arc<MockServer>) -> Self {
        Self { server }
    }

    /// The server behind this transport.
    pub fn server(&self) -> &Arc<MockServer> {
        &self.server
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn call(&self, request: Request) -> Result<Response, TransportError> {
        let request = Request::from_bytes(&request.to_bytes()?)?;
        let response = self.server.handle(request).await;
        Ok(Response::from_bytes(&response.to_bytes()?)?)
    }
}
