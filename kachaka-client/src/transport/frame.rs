//! Length-prefixed framing: a 4-byte big-endian length, then the body.

use kachaka_types::{WireError, MAX_FRAME_SIZE};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::TransportError;

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    if body.len() > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge {
            size: body.len(),
            limit: MAX_FRAME_SIZE,
        }
        .into());
    }

    let len = (body.len() as u32).to_be_bytes();
    writer
        .write_all(&len)
        .await
        .map_err(|e| TransportError::SendFailed(e.to_string()))?;
    writer
        .write_all(body)
        .await
        .map_err(|e| TransportError::SendFailed(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| TransportError::SendFailed(e.to_string()))?;
    Ok(())
}

/// Read one frame.
///
/// A peer that closes the connection before the length prefix is complete
/// yields [`TransportError::ConnectionClosed`].
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            TransportError::ConnectionClosed
        } else {
            TransportError::ReceiveFailed(e.to_string())
        }
    })?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge {
            size: len,
            limit: MAX_FRAME_SIZE,
        }
        .into());
    }

    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
    Ok(body)
}
