//! Error types for the fwvpnd daemon.

use thiserror::Error;

/// Main error type for the daemon.
#[derive(Error, Debug)]
pub enum VpnError {
    /// Configuration-related errors.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Socket-related errors.
    #[error("Socket error: {message}")]
    Socket { message: String },

    /// Authentication and token errors.
    #[error("Authentication error: {kind}")]
    Auth { kind: AuthErrorKind },

    /// Peer and IP-lease errors.
    #[error("Peer error: {kind}")]
    Peer { kind: PeerErrorKind },

    /// Protocol errors.
    #[error("Protocol error: {kind}")]
    Protocol { kind: ProtocolErrorKind },

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Authentication error kinds.
#[derive(Error, Debug)]
pub enum AuthErrorKind {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Malformed token: {message}")]
    MalformedToken { message: String },

    #[error("Token expired")]
    Expired,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Failed to read HMAC secret: {message}")]
    SecretError { message: String },
}

/// Peer error kinds.
#[derive(Error, Debug)]
pub enum PeerErrorKind {
    #[error("Invalid public key: {message}")]
    InvalidPublicKey { message: String },

    #[error("No available IPs in subnet")]
    SubnetExhausted,

    #[error("Device configuration failed: {message}")]
    DeviceConfigurationFailed { message: String },
}

/// Protocol error kinds.
#[derive(Error, Debug)]
pub enum ProtocolErrorKind {
    #[error("Message too large: {size} bytes exceeds maximum of {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Invalid message format: {message}")]
    InvalidMessageFormat { message: String },

    #[error("Unknown command: {name}")]
    UnknownCommand { name: String },

    #[error("Missing required parameter: {param}")]
    MissingParameter { param: String },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection timed out")]
    ConnectionTimeout,
}

/// Result type alias for daemon operations.
pub type VpnResult<T> = Result<T, VpnError>;
