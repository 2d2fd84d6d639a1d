//! Shared test support: an in-memory tunnel device double.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use ipnet::Ipv4Net;

use fwvpnd::vpn::{DeviceConfig, DeviceError, DeviceState, PeerState, TunnelDevice};

#[derive(Default)]
struct MockState {
    listen_port: Option<u16>,
    has_private_key: bool,
    peers: HashMap<String, Vec<Ipv4Net>>,
}

/// In-memory tunnel device that tracks applied deltas and can be
/// switched into a failing mode.
#[derive(Default)]
pub struct MockDevice {
    state: Mutex<MockState>,
    should_error: AtomicBool,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail.
    pub fn set_error(&self, enabled: bool) {
        self.should_error.store(enabled, Ordering::SeqCst);
    }

    /// Number of peers currently configured on the device.
    pub fn peer_count(&self) -> usize {
        self.state.lock().unwrap().peers.len()
    }

    /// Listen port last pushed to the device.
    pub fn listen_port(&self) -> Option<u16> {
        self.state.lock().unwrap().listen_port
    }

    /// Whether a private key has been pushed to the device.
    pub fn has_private_key(&self) -> bool {
        self.state.lock().unwrap().has_private_key
    }
}

impl TunnelDevice for MockDevice {
    fn configure(&self, _name: &str, config: DeviceConfig) -> Result<(), DeviceError> {
        if self.should_error.load(Ordering::SeqCst) {
            return Err(DeviceError::new("Mock error: failed to configure device"));
        }

        let mut state = self.state.lock().unwrap();

        if config.private_key.is_some() {
            state.has_private_key = true;
        }
        if let Some(port) = config.listen_port {
            state.listen_port = Some(port);
        }

        for peer in config.peers {
            let key = peer.public_key.to_base64();
            if peer.remove {
                state.peers.remove(&key);
            } else {
                state.peers.insert(key, peer.allowed_ips);
            }
        }

        Ok(())
    }

    fn device(&self, _name: &str) -> Result<DeviceState, DeviceError> {
        if self.should_error.load(Ordering::SeqCst) {
            return Err(DeviceError::new("Mock error: failed to read device"));
        }

        let state = self.state.lock().unwrap();
        let peers = state
            .peers
            .iter()
            .map(|(key, allowed_ips)| PeerState {
                public_key: fwvpnd::vpn::PublicKey::from_base64(key).expect("mock holds valid keys"),
                allowed_ips: allowed_ips.clone(),
                last_handshake: None,
                endpoint: None,
            })
            .collect();

        Ok(DeviceState {
            listen_port: state.listen_port,
            peers,
        })
    }

    fn close(&self) -> Result<(), DeviceError> {
        Ok(())
    }
}

/// Deterministic 32-byte test key in standard base64 form.
pub fn test_public_key(id: usize) -> String {
    let mut key = [0u8; 32];
    for (i, byte) in key.iter_mut().enumerate() {
        *byte = (id + i) as u8;
    }
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, key)
}
