//! Catalog of recognized profile directives and inline blocks.

/// A recognized directive. Matching is on the first word of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Directive {
    Client,
    Dev,
    Proto,
    Port,
    Remote,
    RemoteRandom,
    RemoteRandomHostname,
    Cipher,
    DataCiphers,
    DataCiphersFallback,
    Auth,
    KeyDirection,
    /// `ca`, `cert`, `key`, `tls-auth`, `tls-crypt` on a single line.
    FileReference,
    CompLzo,
    Compress,
    RenegSec,
    Keepalive,
    Ping,
    PingRestart,
    HandWindow,
    RemoteCertTls,
    VerifyX509Name,
    TunMtu,
    AuthUserPass,
    AuthToken,
    RedirectGateway,
    Route,
    RouteIpv6,
    RouteNoPull,
    RouteGateway,
    DhcpOption,
    Ifconfig,
    IfconfigIpv6,
    Topology,
    PeerId,
    KeyDerivation,
    ProtocolFlags,
    /// Known and harmless, nothing to configure.
    Ignored,
    /// Known but not implemented by the engine.
    Unsupported,
}

const CATALOG: &[(&str, Directive)] = &[
    ("client", Directive::Client),
    ("tls-client", Directive::Client),
    ("dev", Directive::Dev),
    ("proto", Directive::Proto),
    ("port", Directive::Port),
    ("remote", Directive::Remote),
    ("remote-random", Directive::RemoteRandom),
    ("remote-random-hostname", Directive::RemoteRandomHostname),
    ("cipher", Directive::Cipher),
    ("data-ciphers", Directive::DataCiphers),
    ("ncp-ciphers", Directive::DataCiphers),
    ("data-ciphers-fallback", Directive::DataCiphersFallback),
    ("auth", Directive::Auth),
    ("key-direction", Directive::KeyDirection),
    ("ca", Directive::FileReference),
    ("cert", Directive::FileReference),
    ("key", Directive::FileReference),
    ("tls-auth", Directive::FileReference),
    ("tls-crypt", Directive::FileReference),
    ("comp-lzo", Directive::CompLzo),
    ("compress", Directive::Compress),
    ("reneg-sec", Directive::RenegSec),
    ("keepalive", Directive::Keepalive),
    ("ping", Directive::Ping),
    ("ping-restart", Directive::PingRestart),
    ("hand-window", Directive::HandWindow),
    ("remote-cert-tls", Directive::RemoteCertTls),
    ("verify-x509-name", Directive::VerifyX509Name),
    ("tun-mtu", Directive::TunMtu),
    ("auth-user-pass", Directive::AuthUserPass),
    ("auth-token", Directive::AuthToken),
    ("redirect-gateway", Directive::RedirectGateway),
    ("route", Directive::Route),
    ("route-ipv6", Directive::RouteIpv6),
    ("route-nopull", Directive::RouteNoPull),
    ("route-gateway", Directive::RouteGateway),
    ("dhcp-option", Directive::DhcpOption),
    ("ifconfig", Directive::Ifconfig),
    ("ifconfig-ipv6", Directive::IfconfigIpv6),
    ("topology", Directive::Topology),
    ("peer-id", Directive::PeerId),
    ("key-derivation", Directive::KeyDerivation),
    ("protocol-flags", Directive::ProtocolFlags),
    // known, nothing to do
    ("allow-compression", Directive::Ignored),
    ("auth-nocache", Directive::Ignored),
    ("auth-retry", Directive::Ignored),
    ("block-outside-dns", Directive::Ignored),
    ("explicit-exit-notify", Directive::Ignored),
    ("float", Directive::Ignored),
    ("link-mtu", Directive::Ignored),
    ("mssfix", Directive::Ignored),
    ("mute", Directive::Ignored),
    ("mute-replay-warnings", Directive::Ignored),
    ("nobind", Directive::Ignored),
    ("persist-key", Directive::Ignored),
    ("persist-tun", Directive::Ignored),
    ("pull", Directive::Ignored),
    ("push-continuation", Directive::Ignored),
    ("rcvbuf", Directive::Ignored),
    ("register-dns", Directive::Ignored),
    ("resolv-retry", Directive::Ignored),
    ("script-security", Directive::Ignored),
    ("setenv", Directive::Ignored),
    ("sndbuf", Directive::Ignored),
    ("tls-version-min", Directive::Ignored),
    ("tun-ipv6", Directive::Ignored),
    ("verb", Directive::Ignored),
    // known, not implemented
    ("fragment", Directive::Unsupported),
    ("http-proxy", Directive::Unsupported),
    ("http-proxy-option", Directive::Unsupported),
    ("socks-proxy", Directive::Unsupported),
    ("secret", Directive::Unsupported),
    ("pkcs12", Directive::Unsupported),
];

impl Directive {
    /// Look up the directive named by the first word of a line.
    pub(crate) fn lookup(name: &str) -> Option<Self> {
        CATALOG
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, directive)| *directive)
    }
}

/// Inline `<tag>...</tag>` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Block {
    Ca,
    Cert,
    Key,
    TlsAuth,
    TlsCrypt,
    /// `<connection>`, not supported.
    Connection,
    /// Any other tag, skipped.
    Unknown,
}

impl Block {
    /// Recognize an opening tag such as `<ca>`.
    pub(crate) fn open(line: &str) -> Option<(Self, &str)> {
        let tag = line.strip_prefix('<')?.strip_suffix('>')?;
        if tag.is_empty() || tag.starts_with('/') || tag.contains(' ') {
            return None;
        }
        let block = match tag {
            "ca" => Self::Ca,
            "cert" => Self::Cert,
            "key" => Self::Key,
            "tls-auth" => Self::TlsAuth,
            "tls-crypt" => Self::TlsCrypt,
            "connection" => Self::Connection,
            _ => Self::Unknown,
        };
        Some((block, tag))
    }

    /// Whether `line` closes a block opened with `tag`.
    pub(crate) fn closes(line: &str, tag: &str) -> bool {
        line.strip_prefix("</")
            .and_then(|rest| rest.strip_suffix('>'))
            .is_some_and(|closing| closing == tag)
    }
}
