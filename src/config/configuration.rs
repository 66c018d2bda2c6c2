//! The structured form of an OpenVPN profile.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use crate::crypto::{Cipher, Digest, KeyDirection, StaticKey};

/// Default OpenVPN port.
pub const DEFAULT_PORT: u16 = 1194;

/// Transport protocol of a remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketType {
    /// UDP, any address family.
    Udp,
    /// UDP over IPv4 only.
    Udp4,
    /// UDP over IPv6 only.
    Udp6,
    /// TCP, any address family.
    Tcp,
    /// TCP over IPv4 only.
    Tcp4,
    /// TCP over IPv6 only.
    Tcp6,
}

impl SocketType {
    /// Parse `proto` and `remote` arguments (`udp`, `tcp-client`, `tcp4`...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "udp" => Some(Self::Udp),
            "udp4" => Some(Self::Udp4),
            "udp6" => Some(Self::Udp6),
            "tcp" | "tcp-client" => Some(Self::Tcp),
            "tcp4" | "tcp4-client" => Some(Self::Tcp4),
            "tcp6" | "tcp6-client" => Some(Self::Tcp6),
            _ => None,
        }
    }

    /// Directive spelling.
    pub fn name(self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Udp4 => "udp4",
            Self::Udp6 => "udp6",
            Self::Tcp => "tcp",
            Self::Tcp4 => "tcp4",
            Self::Tcp6 => "tcp6",
        }
    }

    /// Whether the transport is stream based.
    pub fn is_reliable(self) -> bool {
        matches!(self, Self::Tcp | Self::Tcp4 | Self::Tcp6)
    }
}

impl fmt::Display for SocketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One candidate server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Hostname or address literal.
    pub host: String,
    /// Port.
    pub port: u16,
    /// Transport.
    pub proto: SocketType,
}

impl Endpoint {
    /// Convenience constructor.
    pub fn new(host: impl Into<String>, port: u16, proto: SocketType) -> Self {
        Self {
            host: host.into(),
            port,
            proto,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.proto)
    }
}

/// Compression framing expected on the data channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionFraming {
    /// No compression header.
    #[default]
    Disabled,
    /// `comp-lzo`: one header byte.
    CompLzo,
    /// `compress`: header byte swapped to the end of the payload.
    Compress,
    /// `compress stub-v2`: header only when escaping.
    CompressV2,
}

/// Compression algorithm announced by `comp-lzo` or `compress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionAlgorithm {
    /// Framing only, payloads are never compressed.
    #[default]
    Disabled,
    /// LZO, accepted for framing but not performed.
    Lzo,
}

/// How pushed or configured routes redirect traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutingPolicy {
    /// Default IPv4 route through the tunnel.
    Ipv4,
    /// Default IPv6 route through the tunnel.
    Ipv6,
    /// Also block the local LAN.
    BlockLocal,
}

/// Interface topology (`topology`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// Legacy /30 per client.
    Net30,
    /// Point to point.
    P2p,
    /// Shared subnet.
    Subnet,
}

impl Topology {
    /// Parse the directive argument.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "net30" => Some(Self::Net30),
            "p2p" => Some(Self::P2p),
            "subnet" => Some(Self::Subnet),
            _ => None,
        }
    }

    /// Directive spelling.
    pub fn name(self) -> &'static str {
        match self {
            Self::Net30 => "net30",
            Self::P2p => "p2p",
            Self::Subnet => "subnet",
        }
    }
}

/// IPv4 route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Route4 {
    /// Destination network.
    pub destination: Ipv4Addr,
    /// Network mask.
    pub mask: Ipv4Addr,
    /// Gateway, `None` for the VPN gateway.
    pub gateway: Option<Ipv4Addr>,
}

/// IPv6 route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Route6 {
    /// Destination network.
    pub destination: Ipv6Addr,
    /// Prefix length.
    pub prefix: u8,
    /// Gateway, `None` for the VPN gateway.
    pub gateway: Option<Ipv6Addr>,
}

/// `ifconfig` arguments. The second address is a peer in `net30`/`p2p`
/// topologies and a netmask in `subnet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Interface {
    /// Local address.
    pub address: Ipv4Addr,
    /// Peer address or netmask.
    pub peer_or_mask: Ipv4Addr,
}

/// `ifconfig-ipv6` arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Interface {
    /// Local address.
    pub address: Ipv6Addr,
    /// Prefix length.
    pub prefix: u8,
    /// Remote gateway.
    pub gateway: Option<Ipv6Addr>,
}

/// HTTP proxy pushed through `dhcp-option PROXY_HTTP(S)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    /// Proxy host.
    pub host: String,
    /// Proxy port.
    pub port: u16,
}

/// Control channel wrapping strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsWrapStrategy {
    /// HMAC authentication of control packets.
    Auth,
    /// Encryption and authentication of control packets.
    Crypt,
}

/// Static key wrapping the control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsWrap {
    /// Wrapping strategy.
    pub strategy: TlsWrapStrategy,
    /// Shared static key.
    pub key: StaticKey,
}

/// An immutable OpenVPN profile.
///
/// Produced by [`ConfigurationParser`](super::ConfigurationParser) from a
/// `.ovpn` file, or from the option list of a `PUSH_REPLY`. Every field is
/// optional so that pushed options can be layered over the profile with
/// [`merged_with`](Self::merged_with).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Configuration {
    /// Data channel cipher (`cipher`, `data-ciphers-fallback`, pushed `cipher`).
    pub cipher: Option<Cipher>,
    /// Negotiable ciphers, in preference order.
    pub data_ciphers: Option<Vec<Cipher>>,
    /// HMAC digest for CBC ciphers and tls-auth.
    pub digest: Option<Digest>,
    /// Compression framing.
    pub compression_framing: Option<CompressionFraming>,
    /// Compression algorithm.
    pub compression_algorithm: Option<CompressionAlgorithm>,
    /// CA certificate PEM.
    pub ca: Option<String>,
    /// Client certificate PEM.
    pub client_certificate: Option<String>,
    /// Client private key PEM, decrypted.
    pub client_key: Option<String>,
    /// tls-auth or tls-crypt key.
    pub tls_wrap: Option<TlsWrap>,
    /// `key-direction` for the static key.
    pub key_direction: Option<KeyDirection>,
    /// Candidate servers, in connection attempt order.
    pub remotes: Option<Vec<Endpoint>>,
    /// Shuffle remotes before connecting.
    pub random_remote: Option<bool>,
    /// Prepend a random label to remote hostnames.
    pub random_hostname: Option<bool>,
    /// Client initiated renegotiation interval (`reneg-sec`).
    pub renegotiation_interval: Option<Duration>,
    /// Send a ping after this much outbound silence.
    pub keepalive_interval: Option<Duration>,
    /// Fail after this much inbound silence.
    pub keepalive_timeout: Option<Duration>,
    /// Negotiation deadline (`hand-window`).
    pub negotiation_timeout: Option<Duration>,
    /// Require the server certificate to carry the TLS server EKU.
    pub checks_eku: Option<bool>,
    /// Expected server name (`verify-x509-name`).
    pub san_host: Option<String>,
    /// Tunnel MTU.
    pub mtu: Option<u16>,
    /// Whether the server expects username and password.
    pub authenticates_user: Option<bool>,
    /// Token replacing the password on renegotiations.
    pub auth_token: Option<String>,
    /// Default gateway redirection.
    pub routing_policies: Option<Vec<RoutingPolicy>>,
    /// Ignore routes pushed by the server.
    pub no_pull_routes: Option<bool>,
    /// IPv4 routes.
    pub routes4: Option<Vec<Route4>>,
    /// IPv6 routes.
    pub routes6: Option<Vec<Route6>>,
    /// Gateway used by `subnet` topology.
    pub route_gateway: Option<Ipv4Addr>,
    /// Local IPv4 interface.
    pub ipv4: Option<Ipv4Interface>,
    /// Local IPv6 interface.
    pub ipv6: Option<Ipv6Interface>,
    /// Interface topology.
    pub topology: Option<Topology>,
    /// DNS servers.
    pub dns_servers: Option<Vec<String>>,
    /// DNS domain.
    pub dns_domain: Option<String>,
    /// DNS search domains.
    pub search_domains: Option<Vec<String>>,
    /// HTTP proxy.
    pub http_proxy: Option<ProxySettings>,
    /// HTTPS proxy.
    pub https_proxy: Option<ProxySettings>,
    /// Peer id for `DATA_V2` frames.
    pub peer_id: Option<u32>,
    /// Derive data keys through TLS keying material export.
    pub uses_tls_ekm: Option<bool>,
}

macro_rules! merge_fields {
    ($target:ident, $other:ident, $($field:ident),+ $(,)?) => {
        $(
            if $other.$field.is_some() {
                $target.$field = $other.$field.clone();
            }
        )+
    };
}

impl Configuration {
    /// Remotes, or an empty slice.
    pub fn remotes(&self) -> &[Endpoint] {
        self.remotes.as_deref().unwrap_or(&[])
    }

    /// Effective cipher, falling back to the OpenVPN 2.6 default set.
    pub fn fallback_cipher(&self) -> Cipher {
        self.cipher.unwrap_or(Cipher::Aes128Cbc)
    }

    /// Effective digest.
    pub fn fallback_digest(&self) -> Digest {
        self.digest.unwrap_or(Digest::Sha1)
    }

    /// Ciphers offered through `IV_CIPHERS`.
    pub fn offered_ciphers(&self) -> Vec<Cipher> {
        match &self.data_ciphers {
            Some(ciphers) if !ciphers.is_empty() => ciphers.clone(),
            _ => {
                let mut ciphers = vec![Cipher::Aes256Gcm, Cipher::Aes128Gcm, Cipher::ChaCha20Poly1305];
                match self.cipher {
                    Some(cipher) if !ciphers.contains(&cipher) => ciphers.push(cipher),
                    _ => {}
                }
                ciphers
            }
        }
    }

    /// Layer `other` (typically pushed options) over `self`. Fields set in
    /// `other` win. Pushed routes are ignored under `route-nopull`.
    pub fn merged_with(&self, other: &Configuration) -> Configuration {
        let mut merged = self.clone();
        merge_fields!(
            merged, other,
            cipher, data_ciphers, digest, compression_framing, compression_algorithm,
            ca, client_certificate, client_key, tls_wrap, key_direction, remotes,
            random_remote, random_hostname, renegotiation_interval, keepalive_interval,
            keepalive_timeout, negotiation_timeout, checks_eku, san_host, mtu,
            authenticates_user, auth_token, no_pull_routes, route_gateway, ipv4, ipv6,
            topology, dns_servers, dns_domain, search_domains, http_proxy, https_proxy,
            peer_id, uses_tls_ekm,
        );
        if self.no_pull_routes != Some(true) {
            merge_fields!(merged, other, routing_policies, routes4, routes6);
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_type_names() {
        assert_eq!(SocketType::from_name("tcp-client"), Some(SocketType::Tcp));
        assert_eq!(SocketType::from_name("UDP6"), Some(SocketType::Udp6));
        assert_eq!(SocketType::from_name("sctp"), None);
        assert!(SocketType::Tcp4.is_reliable());
        assert!(!SocketType::Udp.is_reliable());
    }

    #[test]
    fn test_merge_prefers_pushed_values() {
        let profile = Configuration {
            cipher: Some(Cipher::Aes128Cbc),
            keepalive_interval: Some(Duration::from_secs(5)),
            remotes: Some(vec![Endpoint::new("a", 1, SocketType::Udp)]),
            ..Default::default()
        };
        let pushed = Configuration {
            cipher: Some(Cipher::Aes256Gcm),
            peer_id: Some(3),
            ..Default::default()
        };
        let merged = profile.merged_with(&pushed);
        assert_eq!(merged.cipher, Some(Cipher::Aes256Gcm));
        assert_eq!(merged.peer_id, Some(3));
        assert_eq!(merged.keepalive_interval, Some(Duration::from_secs(5)));
        assert_eq!(merged.remotes().len(), 1);
    }

    #[test]
    fn test_merge_honors_route_nopull() {
        let profile = Configuration {
            no_pull_routes: Some(true),
            ..Default::default()
        };
        let pushed = Configuration {
            routes4: Some(vec![Route4 {
                destination: Ipv4Addr::new(10, 0, 0, 0),
                mask: Ipv4Addr::new(255, 0, 0, 0),
                gateway: None,
            }]),
            routing_policies: Some(vec![RoutingPolicy::Ipv4]),
            ..Default::default()
        };
        let merged = profile.merged_with(&pushed);
        assert_eq!(merged.routes4, None);
        assert_eq!(merged.routing_policies, None);
    }

    #[test]
    fn test_offered_ciphers_include_fallback() {
        let config = Configuration {
            cipher: Some(Cipher::Aes256Cbc),
            ..Default::default()
        };
        let offered = config.offered_ciphers();
        assert_eq!(offered.first(), Some(&Cipher::Aes256Gcm));
        assert_eq!(offered.last(), Some(&Cipher::Aes256Cbc));
    }
}
