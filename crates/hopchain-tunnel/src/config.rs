//! Configuration structures for the tunnel.
//!
//! The configuration can come from a TOML file, from command-line flags,
//! from environment variables, or any mix of them (flags and environment
//! win over the file). [`TunnelConfig::validate`] turns the raw strings
//! into parsed, checked settings.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TunnelError;
use crate::forward::RelaySettings;
use crate::hop::{Endpoint, HopSpec};
use crate::transport::ssh::SshSettings;

/// Top-level tunnel configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Hop chain and credentials.
    #[serde(default)]
    pub ssh: SshConfig,

    /// Local `host:port` to listen on.
    #[serde(default)]
    pub local_addr: String,

    /// Destination `host:port` as seen from the final hop.
    #[serde(default)]
    pub remote_addr: String,

    /// Timeout and buffer settings.
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Periodic chain refresh.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Log level (e.g. "info", "debug", "hopchain_tunnel=trace").
    #[serde(default)]
    pub log_level: Option<String>,
}

/// Secure-shell hop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    /// Comma-separated `user@host[:port]` chain in dial order.
    #[serde(default)]
    pub hosts: String,

    /// Private key used on every hop.
    #[serde(default)]
    pub key: PathBuf,

    /// Keepalive interval (seconds, 0 = disabled).
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_secs: u64,

    /// Unanswered keepalives before a session is dropped.
    #[serde(default = "default_keepalive_max")]
    pub keepalive_max: usize,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            hosts: String::new(),
            key: PathBuf::new(),
            keepalive_interval_secs: default_keepalive_interval(),
            keepalive_max: default_keepalive_max(),
        }
    }
}

/// Timeout and buffer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Timeout for the TCP dial to the first hop (seconds, 0 = none).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle session timeout (seconds, 0 = disabled).
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Relay buffer size per direction (bytes).
    #[serde(default = "default_relay_buffer_size")]
    pub relay_buffer_size: usize,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            relay_buffer_size: default_relay_buffer_size(),
        }
    }
}

/// Scheduled chain refresh configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Rebuild the chain every this many sessions (0 = never).
    #[serde(default = "default_reconnect_every")]
    pub every_sessions: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            every_sessions: default_reconnect_every(),
        }
    }
}

/// Configuration after parsing and validation.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub hops: Arc<HopSpec>,
    pub key: PathBuf,
    pub local_addr: String,
    pub remote: Endpoint,
    pub connect_timeout: Option<Duration>,
    pub reconnect_every: u64,
    pub ssh: SshSettings,
    pub relay: RelaySettings,
}

impl TunnelConfig {
    /// Load a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TunnelError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            TunnelError::Config(format!("failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&data).map_err(|e| TunnelError::Config(format!("failed to parse {path:?}: {e}")))
    }

    /// Check required fields and parse addresses.
    pub fn validate(&self) -> Result<ValidatedConfig, TunnelError> {
        if self.ssh.hosts.trim().is_empty() {
            return Err(TunnelError::Config("ssh host is empty (sshhost / SSHHOST)".into()));
        }
        if self.ssh.key.as_os_str().is_empty() {
            return Err(TunnelError::Config("ssh key is empty (sshkey / SSHKEY)".into()));
        }
        if self.local_addr.trim().is_empty() {
            return Err(TunnelError::Config("local address is empty (localaddr / LOCALADDR)".into()));
        }
        if self.remote_addr.trim().is_empty() {
            return Err(TunnelError::Config("remote address is empty (remoteaddr / REMOTEADDR)".into()));
        }
        if self.timeouts.relay_buffer_size == 0 {
            return Err(TunnelError::Config("timeouts.relay_buffer_size must be > 0".into()));
        }

        let hops: HopSpec = self.ssh.hosts.parse().map_err(|e| {
            TunnelError::Config(format!("unable to parse hostnames {:?}: {e}", self.ssh.hosts))
        })?;
        let remote = Endpoint::parse(&self.remote_addr, None)?;

        Ok(ValidatedConfig {
            hops: Arc::new(hops),
            key: self.ssh.key.clone(),
            local_addr: self.local_addr.trim().to_string(),
            remote,
            connect_timeout: secs(self.timeouts.connect_timeout_secs),
            reconnect_every: self.reconnect.every_sessions,
            ssh: SshSettings {
                keepalive_interval: secs(self.ssh.keepalive_interval_secs),
                keepalive_max: self.ssh.keepalive_max,
            },
            relay: RelaySettings {
                idle_timeout: secs(self.timeouts.idle_timeout_secs),
                buffer_size: self.timeouts.relay_buffer_size,
            },
        })
    }
}

/// Zero means "disabled".
fn secs(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

fn default_keepalive_interval() -> u64 {
    hopchain_core::DEFAULT_KEEPALIVE_INTERVAL_SECS
}
fn default_keepalive_max() -> usize {
    hopchain_core::DEFAULT_KEEPALIVE_MAX
}
fn default_connect_timeout() -> u64 {
    hopchain_core::DEFAULT_CONNECT_TIMEOUT_SECS
}
fn default_idle_timeout() -> u64 {
    hopchain_core::DEFAULT_IDLE_TIMEOUT_SECS
}
fn default_relay_buffer_size() -> usize {
    hopchain_core::DEFAULT_RELAY_BUFFER_SIZE
}
fn default_reconnect_every() -> u64 {
    hopchain_core::DEFAULT_RECONNECT_EVERY
}
