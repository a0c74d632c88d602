//! Daemon configuration (§10.3): loaded from TOML, validated, with per-OS default paths
//! mirroring the teacher's `GeneralConfig` shape.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DaemonError, Result};

/// Default RADIUS authentication port (RFC 2865).
pub const DEFAULT_RADIUS_PORT: u16 = 1812;

fn default_chewie_id() -> String {
    "44-44-44-44-44-44:".to_string()
}

fn default_radius_port() -> u16 {
    DEFAULT_RADIUS_PORT
}

fn default_retrans_while_secs() -> u64 {
    30
}

fn default_a_while_secs() -> u64 {
    30
}

fn default_session_timeout_secs() -> u32 {
    3600
}

fn default_port_up_identity_wait_secs() -> u64 {
    20
}

fn default_preemptive_identity_interval_secs() -> u64 {
    60
}

fn default_max_retrans() -> u32 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> PathBuf {
    if cfg!(target_os = "linux") || cfg!(target_os = "macos") {
        PathBuf::from("/var/log/dot8021x-authd.log")
    } else {
        PathBuf::from("dot8021x-authd.log")
    }
}

fn default_pid_file() -> PathBuf {
    if cfg!(target_os = "linux") || cfg!(target_os = "macos") {
        PathBuf::from("/var/run/dot8021x-authd.pid")
    } else {
        PathBuf::from("dot8021x-authd.pid")
    }
}

/// RADIUS server connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadiusConfig {
    /// Server's IPv4/IPv6 address.
    pub server_ip: std::net::IpAddr,
    /// Server's UDP port.
    #[serde(default = "default_radius_port")]
    pub server_port: u16,
    /// Shared secret used to sign requests and verify replies.
    pub secret: String,
}

/// Session timer defaults (802.1X-2010 Table 8-1, §4.5/§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimersConfig {
    /// Retransmission timeout for an outstanding EAP Request.
    #[serde(default = "default_retrans_while_secs")]
    pub retrans_while_secs: u64,
    /// Wait for an outstanding AAA round trip before treating it as a timeout.
    #[serde(default = "default_a_while_secs")]
    pub a_while_secs: u64,
    /// Session-Timeout used when the RADIUS server's Access-Accept omits one.
    #[serde(default = "default_session_timeout_secs")]
    pub default_session_timeout_secs: u32,
    /// Delay after `port_up` before a preemptive Identity Request is issued.
    #[serde(default = "default_port_up_identity_wait_secs")]
    pub port_up_identity_wait_secs: u64,
    /// Interval between subsequent preemptive Identity Requests on an idle port.
    #[serde(default = "default_preemptive_identity_interval_secs")]
    pub preemptive_identity_interval_secs: u64,
    /// Maximum retransmissions before a session fails.
    #[serde(default = "default_max_retrans")]
    pub max_retrans: u32,
}

impl Default for TimersConfig {
    fn default() -> Self {
        Self {
            retrans_while_secs: default_retrans_while_secs(),
            a_while_secs: default_a_while_secs(),
            default_session_timeout_secs: default_session_timeout_secs(),
            port_up_identity_wait_secs: default_port_up_identity_wait_secs(),
            preemptive_identity_interval_secs: default_preemptive_identity_interval_secs(),
            max_retrans: default_max_retrans(),
        }
    }
}

/// Logging, PID file, and run-mode settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Run attached to the controlling terminal instead of daemonizing.
    #[serde(default)]
    pub foreground: bool,
    /// `tracing_subscriber::EnvFilter` directive, overridable by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Path the log is written to when daemonized.
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    /// Path the daemon's PID is written to.
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            foreground: false,
            log_level: default_log_level(),
            log_file: default_log_file(),
            pid_file: default_pid_file(),
        }
    }
}

/// Top-level authenticator daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Name of the switch-facing NIC the EAPOL and MAB sockets bind to.
    pub interface: String,
    /// RADIUS server connection settings.
    pub radius: RadiusConfig,
    /// Authenticator identifier embedded in Called-Station-Id.
    #[serde(default = "default_chewie_id")]
    pub chewie_id: String,
    /// Session timer defaults.
    #[serde(default)]
    pub timers: TimersConfig,
    /// Logging, PID file, and run-mode settings.
    #[serde(default)]
    pub general: GeneralConfig,
}

impl DaemonConfig {
    /// Loads and validates configuration from a TOML file.
    ///
    /// # Errors
    /// Returns [`DaemonError::TomlParse`] on malformed TOML or [`DaemonError::Config`] if the
    /// loaded configuration fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes this configuration to a TOML file.
    ///
    /// # Errors
    /// Returns [`DaemonError::Io`] if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| DaemonError::config(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Rejects configurations that cannot possibly run: an empty interface name, a zero-length
    /// RADIUS secret, or `max_retrans == 0`.
    ///
    /// # Errors
    /// Returns [`DaemonError::Config`] describing the first failing check.
    pub fn validate(&self) -> Result<()> {
        if self.interface.trim().is_empty() {
            return Err(DaemonError::config("interface name must not be empty"));
        }
        if self.radius.secret.is_empty() {
            return Err(DaemonError::config("RADIUS secret must not be empty"));
        }
        if self.timers.max_retrans == 0 {
            return Err(DaemonError::config("timers.max_retrans must be at least 1"));
        }
        Ok(())
    }

    /// The platform-default configuration file path, following the teacher's per-OS
    /// `cfg!(target_os = ...)` convention.
    #[must_use]
    pub fn default_path() -> PathBuf {
        if cfg!(target_os = "linux") {
            PathBuf::from("/etc/dot8021x-authd/config.toml")
        } else if cfg!(target_os = "macos") {
            PathBuf::from("/usr/local/etc/dot8021x-authd/config.toml")
        } else if let Some(dir) = dirs::config_dir() {
            dir.join("dot8021x-authd").join("config.toml")
        } else {
            PathBuf::from("dot8021x-authd.toml")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> DaemonConfig {
        DaemonConfig {
            interface: "eth0".to_string(),
            radius: RadiusConfig {
                server_ip: "127.0.0.1".parse().unwrap(),
                server_port: default_radius_port(),
                secret: "testing123".to_string(),
            },
            chewie_id: default_chewie_id(),
            timers: TimersConfig::default(),
            general: GeneralConfig::default(),
        }
    }

    #[test]
    fn default_chewie_id_matches_original_construction() {
        assert_eq!(default_chewie_id(), "44-44-44-44-44-44:");
    }

    #[test]
    fn empty_interface_fails_validation() {
        let mut config = valid();
        config.interface = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_secret_fails_validation() {
        let mut config = valid();
        config.radius.secret = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_max_retrans_fails_validation() {
        let mut config = valid();
        config.timers.max_retrans = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn round_trips_through_toml() {
        let config = valid();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        config.save(&path).unwrap();
        let loaded = DaemonConfig::load(&path).unwrap();
        assert_eq!(loaded.interface, config.interface);
        assert_eq!(loaded.radius.server_port, config.radius.server_port);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let toml_text = r#"
            interface = "eth0"

            [radius]
            server_ip = "127.0.0.1"
            secret = "s3cret"
        "#;
        let config: DaemonConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(config.radius.server_port, DEFAULT_RADIUS_PORT);
        assert_eq!(config.chewie_id, "44-44-44-44-44-44:");
        assert_eq!(config.timers.max_retrans, 5);
        assert!(!config.general.foreground);
    }
}
