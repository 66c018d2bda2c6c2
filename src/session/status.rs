//! Session status reported to the owner.

use std::time::Duration;

use crate::config::{
    Configuration, Ipv4Interface, Ipv6Interface, ProxySettings, Route4, Route6, RoutingPolicy,
    Topology,
};
use crate::crypto::Cipher;

/// Network settings the owner applies to its virtual interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelSettings {
    /// Local IPv4 interface.
    pub ipv4: Option<Ipv4Interface>,
    /// Local IPv6 interface.
    pub ipv6: Option<Ipv6Interface>,
    /// Interface topology.
    pub topology: Option<Topology>,
    /// Gateway for `subnet` topology.
    pub route_gateway: Option<std::net::Ipv4Addr>,
    /// IPv4 routes.
    pub routes4: Vec<Route4>,
    /// IPv6 routes.
    pub routes6: Vec<Route6>,
    /// Default gateway redirection.
    pub routing_policies: Vec<RoutingPolicy>,
    /// DNS servers.
    pub dns_servers: Vec<String>,
    /// DNS domain.
    pub dns_domain: Option<String>,
    /// DNS search domains.
    pub search_domains: Vec<String>,
    /// HTTP proxy.
    pub http_proxy: Option<ProxySettings>,
    /// HTTPS proxy.
    pub https_proxy: Option<ProxySettings>,
    /// Tunnel MTU.
    pub mtu: Option<u16>,
    /// Negotiated data cipher.
    pub cipher: Cipher,
    /// Client renegotiation interval.
    pub renegotiation_interval: Option<Duration>,
}

impl TunnelSettings {
    /// Extract the settings of a negotiated (profile plus pushed) configuration.
    pub fn from_configuration(configuration: &Configuration) -> Self {
        Self {
            ipv4: configuration.ipv4,
            ipv6: configuration.ipv6,
            topology: configuration.topology,
            route_gateway: configuration.route_gateway,
            routes4: configuration.routes4.clone().unwrap_or_default(),
            routes6: configuration.routes6.clone().unwrap_or_default(),
            routing_policies: configuration.routing_policies.clone().unwrap_or_default(),
            dns_servers: configuration.dns_servers.clone().unwrap_or_default(),
            dns_domain: configuration.dns_domain.clone(),
            search_domains: configuration.search_domains.clone().unwrap_or_default(),
            http_proxy: configuration.http_proxy.clone(),
            https_proxy: configuration.https_proxy.clone(),
            mtu: configuration.mtu,
            cipher: configuration.fallback_cipher(),
            renegotiation_interval: configuration.renegotiation_interval,
        }
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionStatus {
    /// Not started.
    #[default]
    Idle,
    /// Initial negotiation in progress.
    Connecting,
    /// Data flows. Renegotiations keep this status.
    Connected(TunnelSettings),
    /// Stopped for good, by request or error.
    Stopped,
}

impl SessionStatus {
    /// Whether the data channel is up.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }

    /// Whether the session ended.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

/// Tunnel payload byte counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataCount {
    /// Plaintext bytes written to the tunnel.
    pub received: u64,
    /// Plaintext bytes read from the tunnel and sent.
    pub sent: u64,
}
