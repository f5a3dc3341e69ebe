//! Provider adapter
//!
//! The OS tunnel-provider object is an injected capability. The core only
//! holds a non-owning [`ProviderHandle`]: every call upgrades the weak
//! reference first, and a provider that has already gone away turns the
//! call into a no-op.

use crate::path::DefaultPathObserver;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Smallest MTU an IPv4-only interface may use
pub const MIN_IPV4_MTU: u16 = 576;
/// Smallest MTU allowed once IPv6 is configured
pub const MIN_IPV6_MTU: u16 = 1280;

/// OS tunnel provider, as seen by the reducer and the path bridge
pub trait TunnelProvider: Send + Sync {
    /// Toggle the "reasserting" flag of the provider
    fn set_reasserting(&self, reasserting: bool);

    /// Apply interface, address and DNS settings
    fn set_tunnel_network_settings(
        &self,
        settings: &TunnelNetworkSettings,
    ) -> Result<(), ProviderError>;

    /// Set or unset the default path observer
    fn set_default_path_observer(
        &self,
        observer: Option<Arc<dyn DefaultPathObserver>>,
    ) -> Result<(), ProviderError>;
}

/// Provider adapter errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("Invalid network settings: {0}")]
    Configuration(String),

    #[error("Platform error: {0}")]
    Platform(String),
}

/// Weak, non-owning handle to the tunnel provider
#[derive(Clone)]
pub struct ProviderHandle {
    provider: Weak<dyn TunnelProvider>,
}

impl ProviderHandle {
    pub fn new(provider: Weak<dyn TunnelProvider>) -> Self {
        Self { provider }
    }

    /// Handle with no provider behind it
    pub fn detached() -> Self {
        Self::new(Weak::<DetachedProvider>::new())
    }

    /// Whether the provider is still alive
    pub fn is_attached(&self) -> bool {
        self.provider.strong_count() > 0
    }

    fn with<R>(&self, op: &str, f: impl FnOnce(&dyn TunnelProvider) -> R) -> Option<R> {
        match self.provider.upgrade() {
            Some(provider) => Some(f(provider.as_ref())),
            None => {
                debug!("Tunnel provider is gone, skipping {}", op);
                None
            }
        }
    }

    pub fn set_reasserting(&self, reasserting: bool) {
        self.with("set_reasserting", |provider| {
            debug!("Setting reasserting = {}", reasserting);
            provider.set_reasserting(reasserting);
        });
    }

    /// Validate and apply network settings.
    ///
    /// Errors are returned to the caller untouched. Without a provider the
    /// call is skipped and reports success.
    pub fn apply_network_settings(
        &self,
        settings: &TunnelNetworkSettings,
    ) -> Result<(), ProviderError> {
        settings.validate()?;
        self.with("set_tunnel_network_settings", |provider| {
            info!(
                "Applying network settings (remote: {}, mtu: {})",
                settings.tunnel_remote_address, settings.mtu
            );
            provider.set_tunnel_network_settings(settings).inspect_err(|e| {
                warn!("Failed to apply network settings: {}", e);
            })
        })
        .unwrap_or(Ok(()))
    }

    pub fn set_default_path_observer(
        &self,
        observer: Option<Arc<dyn DefaultPathObserver>>,
    ) -> Result<(), ProviderError> {
        self.with("set_default_path_observer", |provider| {
            provider.set_default_path_observer(observer)
        })
        .unwrap_or(Ok(()))
    }
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Type used to build an empty `Weak<dyn TunnelProvider>`
struct DetachedProvider;

impl TunnelProvider for DetachedProvider {
    fn set_reasserting(&self, _reasserting: bool) {}

    fn set_tunnel_network_settings(
        &self,
        _settings: &TunnelNetworkSettings,
    ) -> Result<(), ProviderError> {
        Ok(())
    }

    fn set_default_path_observer(
        &self,
        _observer: Option<Arc<dyn DefaultPathObserver>>,
    ) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Network settings handed to the OS tunnel provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelNetworkSettings {
    /// Address of the entry node the tunnel talks to
    pub tunnel_remote_address: String,
    pub ipv4: Option<Ipv4Settings>,
    pub ipv6: Option<Ipv6Settings>,
    pub dns: Option<DnsSettings>,
    pub mtu: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipv4Settings {
    pub addresses: Vec<Ipv4Addr>,
    pub prefix: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipv6Settings {
    pub addresses: Vec<Ipv6Addr>,
    pub prefix: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsSettings {
    pub servers: Vec<IpAddr>,
    #[serde(default)]
    pub search_domains: Vec<String>,
    #[serde(default)]
    pub match_domains: Vec<String>,
}

impl TunnelNetworkSettings {
    /// Reject settings the provider could never apply
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.tunnel_remote_address.trim().is_empty() {
            return Err(config_error("tunnel remote address is empty"));
        }
        if self.ipv4.is_none() && self.ipv6.is_none() {
            return Err(config_error("no IPv4 or IPv6 settings"));
        }
        if let Some(ipv4) = &self.ipv4 {
            if ipv4.addresses.is_empty() {
                return Err(config_error("IPv4 enabled without addresses"));
            }
            if ipv4.prefix > 32 {
                return Err(config_error(format!("invalid IPv4 prefix /{}", ipv4.prefix)));
            }
        }
        if let Some(ipv6) = &self.ipv6 {
            if ipv6.addresses.is_empty() {
                return Err(config_error("IPv6 enabled without addresses"));
            }
            if ipv6.prefix > 128 {
                return Err(config_error(format!("invalid IPv6 prefix /{}", ipv6.prefix)));
            }
        }

        let min_mtu = if self.ipv6.is_some() {
            MIN_IPV6_MTU
        } else {
            MIN_IPV4_MTU
        };
        if self.mtu < min_mtu {
            return Err(config_error(format!(
                "MTU {} below minimum {}",
                self.mtu, min_mtu
            )));
        }

        if let Some(dns) = &self.dns {
            if dns.servers.is_empty() {
                return Err(config_error("DNS settings without servers"));
            }
        }
        Ok(())
    }
}

fn config_error(msg: impl Into<String>) -> ProviderError {
    ProviderError::Configuration(msg.into())
}
