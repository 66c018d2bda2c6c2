//! # ovpn-session
//!
//! OpenVPN client tunnel session engine.
//!
//! The engine parses `.ovpn` profiles, negotiates the control channel over
//! an unreliable link (reset exchange, TLS, key method 2, pushed options),
//! renegotiates keys without interrupting traffic and carries IP packets
//! between a network [`Link`](core::Link) and a virtual [`Tunnel`](core::Tunnel).
//!
//! TLS itself, the virtual interface and reconnect policy belong to the
//! embedding application and plug in through the traits in [`core`].
//!
//! ## Feature Flags
//!
//! - `udp` (default): [`link::UdpLink`], a tokio UDP [`Link`](core::Link)
//!
//! ## Modules
//!
//! - [`core`]: collaborator traits, constants, and error types
//! - [`config`]: profile model and parser
//! - [`packet`]: wire format
//! - [`control`]: reliable control channel and tls-auth
//! - [`crypto`]: PRF, HMAC, static keys and key material
//! - [`data`]: data channel encryption and key rotation
//! - [`negotiator`]: per-key negotiation state machine
//! - [`session`]: session core and async session handle
//! - [`link`]: network links
//!
//! ## Example Usage
//!
//! ```rust
//! use ovpn_session::prelude::*;
//!
//! let profile = "\
//! client
//! remote vpn.example.com 1194 udp
//! cipher AES-256-GCM
//! <ca>
//! -----BEGIN CERTIFICATE-----
//! MIIB
//! -----END CERTIFICATE-----
//! </ca>
//! ";
//! let result = ConfigurationParser::new().parse_str(profile, None).unwrap();
//! let remote = &result.configuration.remotes()[0];
//! assert_eq!((remote.host.as_str(), remote.port), ("vpn.example.com", 1194));
//! assert_eq!(result.configuration.cipher, Some(Cipher::Aes256Gcm));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod control;
pub mod core;
pub mod crypto;
pub mod data;
pub mod link;
pub mod negotiator;
pub mod packet;
pub mod session;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{
        CryptoError, Link, OpenVpnError, PacketError, ParserError, PrivateKeyDecrypter,
        SecureChannel, SecureChannelFactory, SessionError, TlsError, Tunnel,
    };

    pub use crate::config::{
        CompressionFraming, Configuration, ConfigurationParser, Endpoint, ParseResult,
        ParserWarning, SocketType,
    };

    pub use crate::crypto::{Cipher, Digest};

    pub use crate::negotiator::Credentials;

    pub use crate::session::{
        DataCount, Session, SessionOptions, SessionOptionsBuilder, SessionStatus, TunnelSettings,
    };

    #[cfg(feature = "udp")]
    pub use crate::link::UdpLink;
}

pub use crate::core::{OpenVpnError, SessionError};
pub use crate::config::{Configuration, ConfigurationParser};
pub use crate::session::{Session, SessionOptions, SessionStatus};
