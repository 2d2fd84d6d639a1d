//! Production tunnel device backend driving `wg(8)`.
//!
//! Commands are executed directly (no shell interpretation) with a
//! timeout and captured stderr. Each configuration delta is submitted as
//! a single `wg set` invocation so the kernel applies it in one step.

use std::io::Write;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::device::{DeviceConfig, DeviceError, DeviceState, PeerState, TunnelDevice};
use super::key::PublicKey;

/// Tunnel device backend that shells out to the `wg` utility.
pub struct WgCliDevice {
    wg_path: String,
    timeout: Duration,
}

impl WgCliDevice {
    /// Create a backend using `wg` from `PATH` with a 10 second timeout.
    pub fn new() -> Self {
        Self {
            wg_path: "wg".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Override the path to the `wg` binary.
    pub fn with_wg_path(mut self, path: impl Into<String>) -> Self {
        self.wg_path = path.into();
        self
    }

    /// Run `wg` with the given arguments, enforcing the timeout.
    fn run(&self, args: &[String], sensitive: bool) -> Result<String, DeviceError> {
        if sensitive {
            debug!(program = %self.wg_path, "Executing wg (arguments withheld)");
        } else {
            debug!(program = %self.wg_path, args = ?args, "Executing wg");
        }

        let mut child = Command::new(&self.wg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DeviceError::new(format!("Failed to spawn {}: {}", self.wg_path, e)))?;

        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        warn!(timeout_secs = self.timeout.as_secs(), "wg command timed out");
                        return Err(DeviceError::new(format!(
                            "wg command timed out after {} seconds",
                            self.timeout.as_secs()
                        )));
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    return Err(DeviceError::new(format!("Failed to wait for wg: {}", e)));
                }
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| DeviceError::new(format!("Failed to collect wg output: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeviceError::new(format!(
                "wg exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Default for WgCliDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl TunnelDevice for WgCliDevice {
    fn configure(&self, name: &str, config: DeviceConfig) -> Result<(), DeviceError> {
        let mut args = vec!["set".to_string(), name.to_string()];
        let mut sensitive = false;

        if let Some(port) = config.listen_port {
            args.push("listen-port".to_string());
            args.push(port.to_string());
        }

        // wg(8) reads private keys from a file, never from argv
        let key_file = match &config.private_key {
            Some(private_key) => {
                sensitive = true;
                let mut file = tempfile::NamedTempFile::new()
                    .map_err(|e| DeviceError::new(format!("Failed to create key file: {}", e)))?;

                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600))
                        .map_err(|e| {
                            DeviceError::new(format!("Failed to set key file permissions: {}", e))
                        })?;
                }

                file.write_all(private_key.to_base64().as_bytes())
                    .map_err(|e| DeviceError::new(format!("Failed to write key file: {}", e)))?;
                file.flush()
                    .map_err(|e| DeviceError::new(format!("Failed to flush key file: {}", e)))?;

                args.push("private-key".to_string());
                args.push(file.path().to_string_lossy().to_string());
                Some(file)
            }
            None => None,
        };

        for peer in &config.peers {
            args.push("peer".to_string());
            args.push(peer.public_key.to_base64());
            if peer.remove {
                args.push("remove".to_string());
            } else if !peer.allowed_ips.is_empty() {
                args.push("allowed-ips".to_string());
                args.push(
                    peer.allowed_ips
                        .iter()
                        .map(|net| net.to_string())
                        .collect::<Vec<_>>()
                        .join(","),
                );
            }
        }

        let result = self.run(&args, sensitive).map(|_| ());
        // Key file is deleted when the handle drops
        drop(key_file);
        result
    }

    fn device(&self, name: &str) -> Result<DeviceState, DeviceError> {
        let output = self.run(&["show".to_string(), name.to_string(), "dump".to_string()], false)?;
        parse_dump(&output)
    }

    fn close(&self) -> Result<(), DeviceError> {
        // Nothing held open between invocations
        Ok(())
    }
}

/// Parse `wg show <iface> dump` output.
///
/// The first line describes the device, each following line a peer:
/// `pubkey psk endpoint allowed-ips latest-handshake rx tx keepalive`.
fn parse_dump(output: &str) -> Result<DeviceState, DeviceError> {
    let mut lines = output.lines();

    let listen_port = match lines.next() {
        Some(header) => header
            .split('\t')
            .nth(2)
            .and_then(|port| port.parse::<u16>().ok()),
        None => None,
    };

    let mut peers = Vec::new();
    for line in lines {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 5 {
            return Err(DeviceError::new(format!(
                "Unexpected wg dump line: {:?}",
                line
            )));
        }

        let public_key = PublicKey::from_base64(fields[0])
            .map_err(|e| DeviceError::new(format!("Bad key in wg dump: {}", e)))?;

        let endpoint = fields[2].rsplit_once(':').and_then(|(host, port)| {
            Some((host.parse().ok()?, port.parse().ok()?))
        });

        let allowed_ips = fields[3]
            .split(',')
            .filter_map(|net| net.trim().parse().ok())
            .collect();

        let last_handshake = match fields[4].parse::<u64>() {
            Ok(0) => None,
            Ok(ts) => Some(ts),
            Err(_) => None,
        };

        peers.push(PeerState {
            public_key,
            allowed_ips,
            last_handshake,
            endpoint,
        });
    }

    Ok(DeviceState { listen_port, peers })
}
