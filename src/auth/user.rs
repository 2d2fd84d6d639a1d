//! VPN user records.

use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

use crate::error::{AuthErrorKind, VpnError};

/// A registered VPN user.
///
/// Users are created once and never mutated; there is no deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier in the format `i-XXXX-XXXX-XXXX`.
    pub id: String,

    /// Optional email address, unique among users that supply one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// The user's WireGuard public key, opaque at registration time.
    pub public_key: String,

    /// Unix timestamp of registration.
    pub created_at: u64,
}

/// Generate a candidate user ID: `i-XXXX-XXXX-XXXX` with lowercase hex
/// characters drawn from 6 random bytes.
pub(crate) fn generate_id(rng: &SystemRandom) -> Result<String, VpnError> {
    let mut bytes = [0u8; 6];
    rng.fill(&mut bytes).map_err(|_| VpnError::Auth {
        kind: AuthErrorKind::SecretError {
            message: "System RNG failure".to_string(),
        },
    })?;

    let hex = hex::encode(bytes);
    Ok(format!("i-{}-{}-{}", &hex[..4], &hex[4..8], &hex[8..12]))
}
