//! Configuration settings for the fwvpnd daemon.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use ipnet::Ipv4Net;
use serde::Deserialize;

use crate::error::VpnError;

/// Main configuration structure for the daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub socket: SocketConfig,
    pub security: SecurityConfig,
    #[serde(default)]
    pub vpn: VpnConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Socket configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SocketConfig {
    /// Path to the Unix socket file.
    pub path: PathBuf,
    /// Socket file permissions (e.g., "0660").
    #[serde(default = "default_socket_permissions")]
    pub permissions: String,
}

/// Security configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Path to the token-signing secret file.
    pub secret_path: PathBuf,
    /// Token lifetime in seconds.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_seconds: u64,
}

/// Tunnel configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct VpnConfig {
    /// WireGuard interface name.
    #[serde(default = "default_interface")]
    pub interface: String,
    /// WireGuard listen port.
    #[serde(default = "default_wg_port")]
    pub listen_port: u16,
    /// VPN subnet in CIDR notation.
    #[serde(default = "default_subnet")]
    pub subnet: Ipv4Net,
    /// Server address inside the subnet, reserved and never leased.
    #[serde(default = "default_server_ip")]
    pub server_ip: Ipv4Addr,
}

impl Default for VpnConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            listen_port: default_wg_port(),
            subnet: default_subnet(),
            server_ip: default_server_ip(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format ("pretty" or "json").
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Resource limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum control message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Per-read/write socket timeout in seconds.
    #[serde(default = "default_socket_timeout")]
    pub socket_timeout_seconds: u64,
    /// Maximum concurrent client connections.
    #[serde(default = "default_max_connections")]
    pub max_concurrent_connections: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            socket_timeout_seconds: default_socket_timeout(),
            max_concurrent_connections: default_max_connections(),
        }
    }
}

fn default_socket_permissions() -> String {
    "0660".to_string()
}

fn default_token_ttl() -> u64 {
    86_400
}

fn default_interface() -> String {
    "wg0".to_string()
}

fn default_wg_port() -> u16 {
    51_820
}

fn default_subnet() -> Ipv4Net {
    "10.0.0.0/24".parse().expect("valid default subnet")
}

fn default_server_ip() -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, 1)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_max_message_size() -> usize {
    65_536
}

fn default_socket_timeout() -> u64 {
    30
}

fn default_max_connections() -> usize {
    64
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, VpnError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| VpnError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| VpnError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate settings for internal consistency.
    pub fn validate(&self) -> Result<(), VpnError> {
        if !self.vpn.subnet.contains(&self.vpn.server_ip) {
            return Err(VpnError::Config {
                message: format!(
                    "Server IP {} is not inside subnet {}",
                    self.vpn.server_ip, self.vpn.subnet
                ),
            });
        }

        // Allocation scans host offsets 2..=254, which assumes at least
        // a handful of usable hosts.
        if self.vpn.subnet.prefix_len() > 30 {
            return Err(VpnError::Config {
                message: format!(
                    "Subnet {} is too small to lease addresses from",
                    self.vpn.subnet
                ),
            });
        }

        if self.security.token_ttl_seconds == 0 {
            return Err(VpnError::Config {
                message: "token_ttl_seconds must be greater than zero".to_string(),
            });
        }

        if self.limits.max_message_size == 0 {
            return Err(VpnError::Config {
                message: "max_message_size must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(contents.as_bytes())
            .expect("Failed to write config");
        file
    }

    #[test]
    fn test_load_minimal_config() {
        let file = write_config(
            r#"
[socket]
path = "/run/fwvpn/fwvpnd.sock"

[security]
secret_path = "/etc/fwvpn/secret.key"
"#,
        );

        let settings = Settings::load(file.path()).expect("Failed to load config");
        assert_eq!(settings.vpn.interface, "wg0");
        assert_eq!(settings.vpn.listen_port, 51_820);
        assert_eq!(settings.vpn.subnet, "10.0.0.0/24".parse::<Ipv4Net>().unwrap());
        assert_eq!(settings.vpn.server_ip, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(settings.security.token_ttl_seconds, 86_400);
        assert_eq!(settings.socket.permissions, "0660");
    }

    #[test]
    fn test_server_ip_outside_subnet_rejected() {
        let file = write_config(
            r#"
[socket]
path = "/run/fwvpn/fwvpnd.sock"

[security]
secret_path = "/etc/fwvpn/secret.key"

[vpn]
subnet = "10.0.0.0/24"
server_ip = "192.168.1.1"
"#,
        );

        let result = Settings::load(file.path());
        assert!(matches!(result, Err(VpnError::Config { .. })));
    }

    #[test]
    fn test_tiny_subnet_rejected() {
        let file = write_config(
            r#"
[socket]
path = "/run/fwvpn/fwvpnd.sock"

[security]
secret_path = "/etc/fwvpn/secret.key"

[vpn]
subnet = "10.0.0.0/31"
server_ip = "10.0.0.1"
"#,
        );

        let result = Settings::load(file.path());
        assert!(matches!(result, Err(VpnError::Config { .. })));
    }
}
