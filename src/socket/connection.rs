//! Per-connection handler.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixStream;
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::{ProtocolErrorKind, VpnError};
use crate::protocol::{
    read_message_with_timeout, write_message_with_timeout, Request, Response,
};
use crate::service::VpnService;

/// Handle a single client connection, processing requests until the
/// client disconnects or times out.
pub async fn handle_connection(
    stream: UnixStream,
    settings: Arc<Settings>,
    service: Arc<VpnService>,
) -> Result<(), VpnError> {
    let (mut reader, mut writer) = stream.into_split();

    loop {
        let result = process_request(&mut reader, &mut writer, &settings, &service).await;

        match result {
            Ok(()) => continue,
            Err(VpnError::Protocol {
                kind: ProtocolErrorKind::ConnectionClosed,
            }) => {
                debug!("Client disconnected");
                return Ok(());
            }
            Err(VpnError::Protocol {
                kind: ProtocolErrorKind::ConnectionTimeout,
            }) => {
                debug!("Connection timed out");
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }
}

/// Process a single request from the client.
async fn process_request<R, W>(
    reader: &mut R,
    writer: &mut W,
    settings: &Settings,
    service: &Arc<VpnService>,
) -> Result<(), VpnError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let socket_timeout = Duration::from_secs(settings.limits.socket_timeout_seconds);
    let msg =
        read_message_with_timeout(reader, settings.limits.max_message_size, socket_timeout).await?;

    let response = match serde_json::from_slice::<Request>(&msg) {
        Ok(request) => {
            info!(command = %request.command, "Received request");

            // Device reconciliation blocks, so dispatch off the runtime
            let service = Arc::clone(service);
            tokio::task::spawn_blocking(move || service.handle(&request))
                .await
                .map_err(|e| VpnError::Socket {
                    message: format!("Dispatch task failed: {}", e),
                })?
        }
        Err(e) => Response::failure(&VpnError::Protocol {
            kind: ProtocolErrorKind::InvalidMessageFormat {
                message: format!("Invalid JSON: {}", e),
            },
        }),
    };

    let payload = serde_json::to_vec(&response)?;
    write_message_with_timeout(writer, &payload, socket_timeout).await?;

    Ok(())
}
