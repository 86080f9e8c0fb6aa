//! Network configuration.
//!
//! The engine's cvar system owns these settings; the transport reads them
//! through a plain [`NetConfig`] handed over at startup and never writes
//! them back.

use std::time::Duration;

use super::constants;
use crate::protocol::Netmode;

/// Network configuration, read-only to the transport core.
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Listening port (servers) or remote port (clients).
    pub port: u16,

    /// Listen backlog hint for the server socket.
    pub backlog: u32,

    /// Maximum number of concurrent remote clients (slots 1..=max_clients).
    pub max_clients: usize,

    /// Initial admission policy.
    pub netmode: Netmode,

    /// Per-connection inactivity timeout before eviction.
    pub timeout: Duration,

    /// Bind/connect over IPv6 instead of IPv4.
    pub ipv6: bool,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            port: constants::DEFAULT_PORT,
            backlog: constants::DEFAULT_BACKLOG,
            max_clients: constants::DEFAULT_MAX_CLIENTS,
            netmode: Netmode::Green,
            timeout: constants::DEFAULT_TIMEOUT,
            ipv6: false,
        }
    }
}

impl NetConfig {
    /// Start building a configuration from the defaults.
    pub fn builder() -> NetConfigBuilder {
        NetConfigBuilder::new()
    }
}

/// Builder for [`NetConfig`].
#[derive(Debug, Default)]
pub struct NetConfigBuilder {
    config: NetConfig,
}

impl NetConfigBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: NetConfig::default(),
        }
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the listen backlog hint.
    pub fn backlog(mut self, backlog: u32) -> Self {
        self.config.backlog = backlog;
        self
    }

    /// Set the maximum number of remote clients.
    pub fn max_clients(mut self, max_clients: usize) -> Self {
        self.config.max_clients = max_clients;
        self
    }

    /// Set the initial admission policy.
    pub fn netmode(mut self, netmode: Netmode) -> Self {
        self.config.netmode = netmode;
        self
    }

    /// Set the inactivity timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Enable or disable IPv6.
    pub fn ipv6(mut self, ipv6: bool) -> Self {
        self.config.ipv6 = ipv6;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> NetConfig {
        self.config
    }
}
