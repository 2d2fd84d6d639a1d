//! VPN peer management module.
//!
//! Owns the peer/IP-lease controller, the WireGuard key types, and the
//! tunnel device abstraction with its `wg(8)` production backend.

mod controller;
mod device;
mod key;
mod wg_cli;

pub use controller::PeerController;
pub use device::{DeviceConfig, DeviceError, DeviceState, PeerState, PeerUpdate, TunnelDevice};
pub use key::{PrivateKey, PublicKey, KEY_LEN};
pub use wg_cli::WgCliDevice;
