//! Peer lifecycle and IP lease management.
//!
//! The controller owns the authoritative mapping of public keys to
//! leased addresses. Every mutation is projected onto the tunnel device
//! while the lease lock is held, so the table and the device converge to
//! the same sequence of deltas and no two mutations can race for the
//! same address. The table is never written before the device call
//! succeeds.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, RwLock};

use ipnet::Ipv4Net;
use ring::rand::SystemRandom;
use tracing::{debug, info};

use crate::error::{PeerErrorKind, VpnError, VpnResult};

use super::device::{DeviceConfig, TunnelDevice};
use super::key::{PrivateKey, PublicKey};

/// Controls peer registration and address leasing for one interface.
pub struct PeerController {
    device: Arc<dyn TunnelDevice>,
    interface: String,
    subnet: Ipv4Net,
    server_ip: Ipv4Addr,
    rng: SystemRandom,
    /// Lease table: public-key text to assigned address.
    leases: RwLock<HashMap<String, Ipv4Addr>>,
}

impl PeerController {
    /// Create a new controller for the given interface and subnet.
    pub fn new(
        device: Arc<dyn TunnelDevice>,
        interface: impl Into<String>,
        subnet: Ipv4Net,
        server_ip: Ipv4Addr,
    ) -> Self {
        Self {
            device,
            interface: interface.into(),
            subnet,
            server_ip,
            rng: SystemRandom::new(),
            leases: RwLock::new(HashMap::new()),
        }
    }

    /// One-time interface bring-up: generate a fresh private key and
    /// push it to the device together with the listen port.
    ///
    /// Never touches the lease table.
    pub fn start(&self, listen_port: u16) -> VpnResult<()> {
        let private_key = PrivateKey::generate(&self.rng)?;

        let config = DeviceConfig {
            private_key: Some(private_key),
            listen_port: Some(listen_port),
            peers: Vec::new(),
        };

        self.device
            .configure(&self.interface, config)
            .map_err(|e| device_failed(e.to_string()))?;

        info!(interface = %self.interface, listen_port, "Tunnel interface configured");

        Ok(())
    }

    /// Register a peer: lease the lowest free address, push the peer to
    /// the device, and record the lease.
    ///
    /// On device failure the lease is not recorded, so the table and the
    /// device stay consistent.
    pub fn add_peer(&self, public_key: &str) -> VpnResult<Ipv4Addr> {
        let parsed_key = PublicKey::from_base64(public_key)?;

        let mut leases = match self.leases.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let peer_ip = self.next_available_ip(&leases)?;

        let allowed_ip = Ipv4Net::new(peer_ip, 32).map_err(|e| device_failed(e.to_string()))?;
        let config = DeviceConfig::add_peer(parsed_key, vec![allowed_ip]);

        // Device call happens under the lock: mutations are fully
        // serialized against the device.
        self.device
            .configure(&self.interface, config)
            .map_err(|e| device_failed(e.to_string()))?;

        leases.insert(public_key.to_string(), peer_ip);

        info!(interface = %self.interface, ip = %peer_ip, "Peer added");

        Ok(peer_ip)
    }

    /// Remove a peer from the device and drop its lease.
    ///
    /// Idempotent: removing a key with no lease still succeeds at the
    /// device layer.
    pub fn remove_peer(&self, public_key: &str) -> VpnResult<()> {
        let parsed_key = PublicKey::from_base64(public_key)?;

        let mut leases = match self.leases.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let config = DeviceConfig::remove_peer(parsed_key);
        self.device
            .configure(&self.interface, config)
            .map_err(|e| device_failed(e.to_string()))?;

        let released = leases.remove(public_key);

        match released {
            Some(ip) => info!(interface = %self.interface, ip = %ip, "Peer removed"),
            None => debug!(interface = %self.interface, "Removed peer with no lease"),
        }

        Ok(())
    }

    /// Snapshot of the lease table.
    pub fn list_peers(&self) -> HashMap<String, Ipv4Addr> {
        let leases = match self.leases.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        leases.clone()
    }

    /// Number of active leases.
    pub fn peer_count(&self) -> usize {
        let leases = match self.leases.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        leases.len()
    }

    /// Release the tunnel device.
    pub fn close(&self) -> VpnResult<()> {
        self.device
            .close()
            .map_err(|e| device_failed(e.to_string()))
    }

    /// Find the lowest free host address.
    ///
    /// Scans host offsets 2 through 254 of the subnet in ascending
    /// order, skipping the network and broadcast addresses, the server's
    /// own address, and every leased address. The lowest gap always wins
    /// so released addresses are reused deterministically.
    fn next_available_ip(&self, leases: &HashMap<String, Ipv4Addr>) -> VpnResult<Ipv4Addr> {
        let network = u32::from(self.subnet.network());
        let broadcast = u32::from(self.subnet.broadcast());

        for host in 2..=254u32 {
            let candidate = network + host;
            if candidate >= broadcast {
                break;
            }

            let candidate = Ipv4Addr::from(candidate);
            if candidate == self.server_ip {
                continue;
            }

            if !leases.values().any(|assigned| *assigned == candidate) {
                return Ok(candidate);
            }
        }

        Err(VpnError::Peer {
            kind: PeerErrorKind::SubnetExhausted,
        })
    }
}

fn device_failed(message: String) -> VpnError {
    VpnError::Peer {
        kind: PeerErrorKind::DeviceConfigurationFailed { message },
    }
}
