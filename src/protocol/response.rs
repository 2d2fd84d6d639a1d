//! Response types for the control protocol.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuthErrorKind, PeerErrorKind, ProtocolErrorKind, VpnError};

/// A response from the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Whether the request succeeded.
    pub success: bool,

    /// Unique identifier for this request/response pair.
    pub request_id: Uuid,

    /// Response data on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Error details on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

/// Error details in a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable error code (e.g., "DUPLICATE_EMAIL", "SUBNET_EXHAUSTED").
    pub code: String,

    /// Human-readable error message.
    pub message: String,
}

impl Response {
    /// Create a success response.
    pub fn success(data: serde_json::Value) -> Self {
        Self {
            success: true,
            request_id: Uuid::new_v4(),
            data: Some(data),
            error: None,
        }
    }

    /// Create a failure response from a daemon error.
    pub fn failure(error: &VpnError) -> Self {
        Self {
            success: false,
            request_id: Uuid::new_v4(),
            data: None,
            error: Some(ErrorResponse {
                code: error_code(error).to_string(),
                message: error.to_string(),
            }),
        }
    }

    /// Error code on this response, if it is a failure.
    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }
}

/// Map an error to its stable wire code.
fn error_code(error: &VpnError) -> &'static str {
    match error {
        VpnError::Auth { kind } => match kind {
            AuthErrorKind::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthErrorKind::DuplicateEmail => "DUPLICATE_EMAIL",
            AuthErrorKind::MalformedToken { .. } => "MALFORMED_TOKEN",
            AuthErrorKind::Expired => "TOKEN_EXPIRED",
            AuthErrorKind::InvalidSignature => "INVALID_SIGNATURE",
            AuthErrorKind::SecretError { .. } => "AUTH_ERROR",
        },
        VpnError::Peer { kind } => match kind {
            PeerErrorKind::InvalidPublicKey { .. } => "INVALID_PUBLIC_KEY",
            PeerErrorKind::SubnetExhausted => "SUBNET_EXHAUSTED",
            PeerErrorKind::DeviceConfigurationFailed { .. } => "DEVICE_CONFIGURATION_FAILED",
        },
        VpnError::Protocol { kind } => match kind {
            ProtocolErrorKind::UnknownCommand { .. } => "UNKNOWN_COMMAND",
            ProtocolErrorKind::MissingParameter { .. } => "MISSING_PARAMETER",
            _ => "PROTOCOL_ERROR",
        },
        VpnError::Config { .. } => "CONFIG_ERROR",
        VpnError::Socket { .. } => "SOCKET_ERROR",
        VpnError::Io(_) | VpnError::Serialization(_) => "INTERNAL_ERROR",
    }
}
