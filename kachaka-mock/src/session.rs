//! One client connection.
//!
//! Each connection carries exactly one request and one response. While a
//! get is suspended the session also watches the socket; if the client hangs
//! up first, the pending read is dropped and its waiter leaves the store.

use crate::error::MockError;
use crate::server::MockServer;
use kachaka_client::{read_frame, write_frame, TransportError};
use kachaka_types::{Request, Response};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;

/// A single request/response exchange.
pub struct Session {
    server: Arc<MockServer>,
    stream: TcpStream,
    peer: SocketAddr,
}

impl Session {
    /// Create a session for an accepted connection.
    pub fn new(server: Arc<MockServer>, stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            server,
            stream,
            peer,
        }
    }

    /// Serve the connection to completion.
    pub async fn run(self) -> Result<(), MockError> {
        let Session {
            server,
            stream,
            peer,
        } = self;
        let (mut reader, mut writer) = stream.into_split();

        let body = match read_frame(&mut reader).await {
            Ok(body) => body,
            Err(TransportError::ConnectionClosed) => {
                tracing::debug!(%peer, "connection closed before a request");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let request = match Request::from_bytes(&body) {
            Ok(request) => request,
            Err(e) => {
                server.metrics().errors_total.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%peer, error = %e, "undecodable request");
                let reply = Response::Error {
                    message: e.to_string(),
                };
                write_frame(&mut writer, &reply.to_bytes()?).await?;
                return Ok(());
            }
        };

        let response = tokio::select! {
            response = server.handle(request) => response,
            _ = peer_closed(&mut reader) => {
                server.metrics().polls_abandoned.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%peer, "peer left before the response was ready");
                return Ok(());
            }
        };

        write_frame(&mut writer, &response.to_bytes()?).await?;
        Ok(())
    }
}

/// Resolves once the peer closes its side of the connection.
async fn peer_closed(reader: &mut OwnedReadHalf) {
    let mut scratch = [0u8; 64];
    loop {
        match reader.read(&mut scratch).await {
            Ok(0) | Err(_) => return,
            // Nothing else is expected on this connection
            Ok(_) => continue,
        }
    }
}
