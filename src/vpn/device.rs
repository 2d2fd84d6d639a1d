//! Tunnel device abstraction.
//!
//! The controller talks to the WireGuard control plane through the
//! [`TunnelDevice`] trait so tests can substitute an in-memory double.
//! Configuration is expressed as declarative deltas: either the whole
//! delta applies or the call fails.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use thiserror::Error;

use super::key::{PrivateKey, PublicKey};

/// Error reported by a tunnel device backend.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct DeviceError {
    pub message: String,
}

impl DeviceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A declarative configuration delta for a tunnel device.
#[derive(Debug, Clone, Default)]
pub struct DeviceConfig {
    /// Replace the device private key.
    pub private_key: Option<PrivateKey>,
    /// Replace the device listen port.
    pub listen_port: Option<u16>,
    /// Peer additions, updates, and removals.
    pub peers: Vec<PeerUpdate>,
}

impl DeviceConfig {
    /// Delta adding (or updating) a single peer.
    pub fn add_peer(public_key: PublicKey, allowed_ips: Vec<Ipv4Net>) -> Self {
        Self {
            peers: vec![PeerUpdate {
                public_key,
                allowed_ips,
                remove: false,
            }],
            ..Default::default()
        }
    }

    /// Delta removing a single peer.
    pub fn remove_peer(public_key: PublicKey) -> Self {
        Self {
            peers: vec![PeerUpdate {
                public_key,
                allowed_ips: Vec::new(),
                remove: true,
            }],
            ..Default::default()
        }
    }
}

/// A single peer entry within a configuration delta.
#[derive(Debug, Clone)]
pub struct PeerUpdate {
    pub public_key: PublicKey,
    pub allowed_ips: Vec<Ipv4Net>,
    /// When set, the peer is removed and `allowed_ips` is ignored.
    pub remove: bool,
}

/// Snapshot of a device's current configuration.
#[derive(Debug, Clone, Default)]
pub struct DeviceState {
    pub listen_port: Option<u16>,
    pub peers: Vec<PeerState>,
}

/// Snapshot of a single connected peer.
#[derive(Debug, Clone)]
pub struct PeerState {
    pub public_key: PublicKey,
    pub allowed_ips: Vec<Ipv4Net>,
    /// Unix timestamp of the last handshake, if any.
    pub last_handshake: Option<u64>,
    /// Remote endpoint, if known.
    pub endpoint: Option<(Ipv4Addr, u16)>,
}

/// WireGuard control-plane operations the controller depends on.
///
/// `configure` must be atomic from the caller's perspective: either the
/// whole delta applies or the call fails and device state is unchanged.
pub trait TunnelDevice: Send + Sync {
    /// Apply a configuration delta to the named device.
    fn configure(&self, name: &str, config: DeviceConfig) -> Result<(), DeviceError>;

    /// Read the current state of the named device.
    fn device(&self, name: &str) -> Result<DeviceState, DeviceError>;

    /// Release control-plane resources.
    fn close(&self) -> Result<(), DeviceError>;
}
