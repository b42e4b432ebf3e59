//! Bootstrap configuration

use crate::listener::ListenAddress;
use crate::namespace::HOST_NETNS_PATH;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default listen address: every interface, port 7082.
pub const DEFAULT_LISTEN_PORT: u16 = 7082;

/// Where and in which namespace to bind the listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Namespace file of the network namespace to bind in
    pub netns_path: PathBuf,

    /// Address to listen on
    pub listen_address: ListenAddress,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            netns_path: default_netns_path(),
            listen_address: ListenAddress::any(DEFAULT_LISTEN_PORT),
        }
    }
}

impl BootstrapConfig {
    /// Create a new config builder
    #[must_use]
    pub fn builder() -> BootstrapConfigBuilder {
        BootstrapConfigBuilder::default()
    }
}

/// Builder for BootstrapConfig
#[derive(Debug, Default)]
pub struct BootstrapConfigBuilder {
    config: BootstrapConfig,
}

impl BootstrapConfigBuilder {
    #[must_use]
    pub fn netns_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.netns_path = path.into();
        self
    }

    #[must_use]
    pub fn listen_address(mut self, address: ListenAddress) -> Self {
        self.config.listen_address = address;
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.listen_address = ListenAddress::new(self.config.listen_address.host(), port);
        self
    }

    #[must_use]
    pub fn build(self) -> BootstrapConfig {
        self.config
    }
}

/// Get the target namespace path from HOSTNS_NETNS_PATH or the host default
///
/// Returns:
/// - `$HOSTNS_NETNS_PATH` if set
/// - `/proc/1/ns/net` otherwise
pub fn default_netns_path() -> PathBuf {
    netns_path_from(std::env::var_os("HOSTNS_NETNS_PATH").map(PathBuf::from))
}

fn netns_path_from(var: Option<PathBuf>) -> PathBuf {
    var.filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(HOST_NETNS_PATH))
}
