//! Integration tests for the peer controller's lease and allocation
//! semantics against a mock tunnel device.

mod common;

use std::net::Ipv4Addr;
use std::sync::Arc;

use fwvpnd::error::{PeerErrorKind, VpnError};
use fwvpnd::vpn::PeerController;

use common::{test_public_key, MockDevice};

fn controller_with(device: Arc<MockDevice>, server_ip: Ipv4Addr) -> PeerController {
    PeerController::new(
        device,
        "wg0",
        "10.0.0.0/24".parse().unwrap(),
        server_ip,
    )
}

fn controller(device: Arc<MockDevice>) -> PeerController {
    controller_with(device, Ipv4Addr::new(10, 0, 0, 1))
}

#[test]
fn add_peer_leases_first_host() {
    let device = Arc::new(MockDevice::new());
    let controller = controller(Arc::clone(&device));

    let ip = controller.add_peer(&test_public_key(0)).unwrap();

    assert_eq!(ip, Ipv4Addr::new(10, 0, 0, 2));
    assert_eq!(device.peer_count(), 1);
}

#[test]
fn add_peer_rejects_invalid_key() {
    let device = Arc::new(MockDevice::new());
    let controller = controller(Arc::clone(&device));

    let result = controller.add_peer("test key");
    assert!(matches!(
        result,
        Err(VpnError::Peer {
            kind: PeerErrorKind::InvalidPublicKey { .. }
        })
    ));
    assert_eq!(device.peer_count(), 0);
}

#[test]
fn sequential_allocation_is_ascending() {
    let device = Arc::new(MockDevice::new());
    let controller = controller(device);

    let expected = ["10.0.0.2", "10.0.0.3", "10.0.0.4"];
    for (i, expected_ip) in expected.iter().enumerate() {
        let ip = controller.add_peer(&test_public_key(i)).unwrap();
        assert_eq!(ip, expected_ip.parse::<Ipv4Addr>().unwrap(), "peer {}", i);
    }
}

#[test]
fn released_address_is_reused_lowest_first() {
    let device = Arc::new(MockDevice::new());
    let controller = controller(device);

    let key_a = test_public_key(1);
    let key_b = test_public_key(2);
    let key_c = test_public_key(3);

    assert_eq!(controller.add_peer(&key_a).unwrap(), Ipv4Addr::new(10, 0, 0, 2));
    assert_eq!(controller.add_peer(&key_b).unwrap(), Ipv4Addr::new(10, 0, 0, 3));

    controller.remove_peer(&key_a).unwrap();

    // The freed lowest address wins over extending the range
    assert_eq!(controller.add_peer(&key_c).unwrap(), Ipv4Addr::new(10, 0, 0, 2));
}

#[test]
fn subnet_exhaustion_reported() {
    let device = Arc::new(MockDevice::new());
    let controller = controller(device);

    // Hosts .2 through .254: 253 leasable addresses
    for i in 0..253 {
        controller
            .add_peer(&test_public_key(i))
            .unwrap_or_else(|e| panic!("peer {} failed: {}", i, e));
    }

    let result = controller.add_peer(&test_public_key(253));
    assert!(matches!(
        result,
        Err(VpnError::Peer {
            kind: PeerErrorKind::SubnetExhausted
        })
    ));
}

#[test]
fn server_address_is_never_leased() {
    let device = Arc::new(MockDevice::new());
    // Server sits inside the allocation range here
    let controller = controller_with(device, Ipv4Addr::new(10, 0, 0, 2));

    let ip = controller.add_peer(&test_public_key(0)).unwrap();
    assert_eq!(ip, Ipv4Addr::new(10, 0, 0, 3));
}

#[test]
fn concurrent_adds_produce_distinct_addresses() {
    let device = Arc::new(MockDevice::new());
    let controller = Arc::new(controller(Arc::clone(&device)));

    let count = 10;
    let mut handles = Vec::new();

    for i in 0..count {
        let controller = Arc::clone(&controller);
        handles.push(std::thread::spawn(move || {
            controller.add_peer(&test_public_key(i))
        }));
    }

    let mut ips = Vec::new();
    for handle in handles {
        let ip = handle.join().unwrap().expect("concurrent add failed");
        ips.push(ip);
    }

    ips.sort();
    ips.dedup();
    assert_eq!(ips.len(), count, "addresses must be distinct");
    assert_eq!(device.peer_count(), count);
    assert_eq!(controller.peer_count(), count);
}

#[test]
fn device_failure_leaves_table_unchanged() {
    let device = Arc::new(MockDevice::new());
    let controller = controller(Arc::clone(&device));

    device.set_error(true);
    let result = controller.add_peer(&test_public_key(0));
    assert!(matches!(
        result,
        Err(VpnError::Peer {
            kind: PeerErrorKind::DeviceConfigurationFailed { .. }
        })
    ));

    assert!(controller.list_peers().is_empty());
    assert_eq!(device.peer_count(), 0);

    // The same key is accepted once the device recovers
    device.set_error(false);
    assert_eq!(
        controller.add_peer(&test_public_key(0)).unwrap(),
        Ipv4Addr::new(10, 0, 0, 2)
    );
}

#[test]
fn remove_peer_failure_keeps_lease() {
    let device = Arc::new(MockDevice::new());
    let controller = controller(Arc::clone(&device));

    let key = test_public_key(0);
    controller.add_peer(&key).unwrap();

    device.set_error(true);
    let result = controller.remove_peer(&key);
    assert!(matches!(
        result,
        Err(VpnError::Peer {
            kind: PeerErrorKind::DeviceConfigurationFailed { .. }
        })
    ));
    assert_eq!(controller.list_peers().len(), 1);
}

#[test]
fn remove_unknown_peer_is_idempotent() {
    let device = Arc::new(MockDevice::new());
    let controller = controller(Arc::clone(&device));

    controller.remove_peer(&test_public_key(42)).unwrap();
    assert!(controller.list_peers().is_empty());
}

#[test]
fn remove_peer_updates_device_and_table() {
    let device = Arc::new(MockDevice::new());
    let controller = controller(Arc::clone(&device));

    let key = test_public_key(0);
    controller.add_peer(&key).unwrap();
    assert_eq!(device.peer_count(), 1);

    controller.remove_peer(&key).unwrap();
    assert_eq!(device.peer_count(), 0);
    assert!(controller.list_peers().is_empty());
}

#[test]
fn list_peers_returns_snapshot() {
    let device = Arc::new(MockDevice::new());
    let controller = controller(device);

    let key = test_public_key(0);
    let ip = controller.add_peer(&key).unwrap();

    let snapshot = controller.list_peers();
    assert_eq!(snapshot.get(&key), Some(&ip));

    // Mutating after the snapshot does not alter it
    controller.remove_peer(&key).unwrap();
    assert_eq!(snapshot.get(&key), Some(&ip));
}

#[test]
fn start_configures_device_without_touching_leases() {
    let device = Arc::new(MockDevice::new());
    let controller = controller(Arc::clone(&device));

    controller.start(51_820).unwrap();

    assert_eq!(device.listen_port(), Some(51_820));
    assert!(device.has_private_key());
    assert!(controller.list_peers().is_empty());
}

#[test]
fn start_reports_device_failure() {
    let device = Arc::new(MockDevice::new());
    let controller = controller(Arc::clone(&device));

    device.set_error(true);
    let result = controller.start(51_820);
    assert!(matches!(
        result,
        Err(VpnError::Peer {
            kind: PeerErrorKind::DeviceConfigurationFailed { .. }
        })
    ));
}
