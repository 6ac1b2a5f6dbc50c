//! Configuration types for the WinDNS system
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};

use crate::command::Credentials;

/// Main WinDNS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinDnsConfig {
    /// SSH transport configuration
    pub ssh: SshConfig,

    /// DNS server targeted by the remote cmdlets (`-ComputerName`)
    ///
    /// `None` (or an empty string) runs the cmdlets against the SSH host itself.
    #[serde(default)]
    pub dns_server: Option<String>,

    /// Optional connection pool settings
    #[serde(default)]
    pub pool: PoolConfig,

    /// Engine behaviour configuration
    #[serde(default)]
    pub engine: EngineConfig,
}

impl WinDnsConfig {
    /// Create a new configuration for the given SSH target
    pub fn new(ssh: SshConfig) -> Self {
        Self {
            ssh,
            dns_server: None,
            pool: PoolConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Set the DNS server hostname; an empty name means "local to the SSH host"
    pub fn with_dns_server(mut self, dns_server: impl Into<String>) -> Self {
        let dns_server = dns_server.into();
        self.dns_server = if dns_server.trim().is_empty() {
            None
        } else {
            Some(dns_server)
        };
        self
    }

    /// Set the pool configuration
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.ssh.validate()?;
        self.pool.validate()?;

        if self.engine.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }

        if let Some(server) = &self.dns_server
            && server.trim().is_empty()
        {
            return Err(crate::Error::config("DNS server hostname cannot be blank"));
        }

        Ok(())
    }

    /// Settings the engine stamps onto every command it builds
    pub fn server_settings(&self) -> ServerSettings {
        ServerSettings {
            dns_server: self
                .dns_server
                .as_ref()
                .filter(|server| !server.trim().is_empty())
                .cloned(),
            credentials: Credentials::new(&self.ssh.username, &self.ssh.password),
        }
    }
}

/// SSH transport configuration
///
/// A single username/hostname/password triple shared by every pooled session.
#[derive(Clone, Serialize, Deserialize)]
pub struct SshConfig {
    /// Username for password authentication
    pub username: String,

    /// Password for password authentication
    /// ⚠️ NEVER log this value
    pub password: String,

    /// Host running the SSH service and PowerShell
    pub hostname: String,

    /// SSH port
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// TCP connect timeout (in seconds)
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl SshConfig {
    /// Create a new SSH configuration with default port and timeout
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            hostname: hostname.into(),
            port: default_ssh_port(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }

    /// Set the SSH port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Validate the SSH configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.username.is_empty() {
            return Err(crate::Error::config("SSH username cannot be empty"));
        }
        if self.password.is_empty() {
            return Err(crate::Error::config("SSH password cannot be empty"));
        }
        if self.hostname.is_empty() {
            return Err(crate::Error::config("SSH hostname cannot be empty"));
        }
        if self.port == 0 {
            return Err(crate::Error::config("SSH port must be > 0"));
        }
        if self.connect_timeout_secs == 0 {
            return Err(crate::Error::config("SSH connect timeout must be > 0"));
        }
        Ok(())
    }

    /// `host:port` address of the SSH service
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

// Custom Debug implementation that hides the password
impl std::fmt::Debug for SshConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshConfig")
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Connection pool configuration
///
/// The defaults reproduce the plain behaviour: no eviction, no probing,
/// a returned handle is assumed reusable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Close idle sessions older than this when they are popped (in seconds)
    #[serde(default)]
    pub max_idle_secs: Option<u64>,

    /// Probe a popped session with `Connector::is_alive` before handing it out
    #[serde(default)]
    pub probe_on_acquire: bool,
}

impl PoolConfig {
    /// Validate the pool configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.max_idle_secs == Some(0) {
            return Err(crate::Error::config(
                "Pool max idle time must be > 0 (omit it to disable eviction)",
            ));
        }
        Ok(())
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Event channel capacity (bounded to prevent memory exhaustion)
    ///
    /// When the channel is full, new events are dropped with a warning.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// Per-command settings derived from configuration
#[derive(Debug, Clone, Default)]
pub struct ServerSettings {
    /// Target for `-ComputerName`
    pub dns_server: Option<String>,

    /// Credentials declared on every command descriptor
    pub credentials: Credentials,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    1000
}
