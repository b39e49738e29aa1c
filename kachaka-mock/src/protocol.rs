//! TCP accept loop.

use crate::error::MockError;
use crate::server::MockServer;
use crate::session::Session;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Accept connections forever, one task per connection.
///
/// Only fails if the listener's address cannot be read; accept errors are
/// logged and the loop carries on.
pub async fn serve(server: Arc<MockServer>, listener: TcpListener) -> Result<(), MockError> {
    let address = listener.local_addr()?;
    tracing::info!(%address, "mock server listening");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                continue;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%peer, error = %e, "failed to set TCP_NODELAY");
        }
        server
            .metrics()
            .connections_total
            .fetch_add(1, Ordering::Relaxed);

        let session = Session::new(server.clone(), stream, peer);
        // Don't block the accept loop
        tokio::spawn(async move {
            if let Err(e) = session.run().await {
                tracing::warn!(%peer, error = %e, "session error");
            }
        });
    }
}
