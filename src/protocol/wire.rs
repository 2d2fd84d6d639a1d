//! Message framing for the control socket.
//!
//! Messages are length-prefixed JSON: a 4-byte big-endian length
//! followed by the payload.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

use crate::error::{ProtocolErrorKind, VpnError};

/// Read one length-prefixed message, returning the raw payload.
pub async fn read_message<R>(reader: &mut R, max_size: usize) -> Result<Vec<u8>, VpnError>
where
    R: AsyncReadExt + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(VpnError::Protocol {
                kind: ProtocolErrorKind::ConnectionClosed,
            });
        }
        Err(e) => return Err(VpnError::Io(e)),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_size {
        return Err(VpnError::Protocol {
            kind: ProtocolErrorKind::MessageTooLarge {
                size: len,
                max: max_size,
            },
        });
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;

    Ok(buf)
}

/// Write one length-prefixed message.
pub async fn write_message<W>(writer: &mut W, data: &[u8]) -> Result<(), VpnError>
where
    W: AsyncWriteExt + Unpin,
{
    let len = (data.len() as u32).to_be_bytes();
    writer.write_all(&len).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one message, failing with `ConnectionTimeout` if it takes too long.
pub async fn read_message_with_timeout<R>(
    reader: &mut R,
    max_size: usize,
    limit: Duration,
) -> Result<Vec<u8>, VpnError>
where
    R: AsyncReadExt + Unpin,
{
    timeout(limit, read_message(reader, max_size))
        .await
        .map_err(|_| VpnError::Protocol {
            kind: ProtocolErrorKind::ConnectionTimeout,
        })?
}

/// Write one message, failing with `ConnectionTimeout` if it takes too long.
pub async fn write_message_with_timeout<W>(
    writer: &mut W,
    data: &[u8],
    limit: Duration,
) -> Result<(), VpnError>
where
    W: AsyncWriteExt + Unpin,
{
    timeout(limit, write_message(writer, data))
        .await
        .map_err(|_| VpnError::Protocol {
            kind: ProtocolErrorKind::ConnectionTimeout,
        })?
}
