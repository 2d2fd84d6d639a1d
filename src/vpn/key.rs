//! WireGuard key handling.
//!
//! Keys are 32 raw bytes carried as standard base64 text on the wire.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{PeerErrorKind, VpnError};

/// Length in bytes of a WireGuard key.
pub const KEY_LEN: usize = 32;

/// A WireGuard public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; KEY_LEN]);

impl PublicKey {
    /// Parse a public key from its standard base64 text form.
    pub fn from_base64(text: &str) -> Result<Self, VpnError> {
        let bytes = STANDARD.decode(text).map_err(|e| VpnError::Peer {
            kind: PeerErrorKind::InvalidPublicKey {
                message: format!("Invalid base64: {}", e),
            },
        })?;

        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|b: Vec<u8>| VpnError::Peer {
            kind: PeerErrorKind::InvalidPublicKey {
                message: format!("Expected {} bytes, got {}", KEY_LEN, b.len()),
            },
        })?;

        Ok(Self(bytes))
    }

    /// Standard base64 text form of the key.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

/// A WireGuard private key.
///
/// Only ever generated, handed to the tunnel device, and dropped; the
/// daemon never persists it.
#[derive(Clone)]
pub struct PrivateKey([u8; KEY_LEN]);

impl PrivateKey {
    /// Generate a fresh private key.
    pub fn generate(rng: &SystemRandom) -> Result<Self, VpnError> {
        let mut bytes = [0u8; KEY_LEN];
        rng.fill(&mut bytes).map_err(|_| VpnError::Peer {
            kind: PeerErrorKind::DeviceConfigurationFailed {
                message: "Failed to generate private key".to_string(),
            },
        })?;

        // Curve25519 clamping
        bytes[0] &= 248;
        bytes[31] &= 127;
        bytes[31] |= 64;

        Ok(Self(bytes))
    }

    /// Standard base64 text form of the key.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never log key material
        f.write_str("PrivateKey(..)")
    }
}
