//! Collaborator interfaces consumed by the engine.
//!
//! The engine owns no sockets, no virtual interface and no TLS library. The
//! embedding application supplies them through these traits.

use std::io;

use async_trait::async_trait;

use super::error::TlsError;
use crate::config::Configuration;

/// The network transport carrying framed OpenVPN packets.
///
/// Implementations handle socket details, including the 2-byte length
/// prefix used over TCP. Each `Vec<u8>` is one whole OpenVPN packet.
#[async_trait]
pub trait Link: Send + Sync {
    /// Wait for the next batch of inbound packets.
    ///
    /// An error is fatal for the session.
    async fn read_packets(&self) -> io::Result<Vec<Vec<u8>>>;

    /// Send a batch of outbound packets.
    async fn write_packets(&self, packets: Vec<Vec<u8>>) -> io::Result<()>;

    /// Whether the transport guarantees delivery (TCP).
    ///
    /// Control packets are never retransmitted over reliable links.
    fn is_reliable(&self) -> bool {
        false
    }
}

/// The virtual network interface carrying plaintext IP packets.
#[async_trait]
pub trait Tunnel: Send + Sync {
    /// Wait for the next batch of outbound IP packets.
    async fn read_packets(&self) -> io::Result<Vec<Vec<u8>>>;

    /// Deliver a batch of decrypted IP packets to the system.
    async fn write_packets(&self, packets: Vec<Vec<u8>>) -> io::Result<()>;
}

/// A TLS client driven through memory buffers.
///
/// The negotiator moves ciphertext between this channel and control packets,
/// and plaintext between this channel and the key method exchange.
pub trait SecureChannel: Send {
    /// Begin the handshake. The ClientHello becomes available through
    /// [`pull_ciphertext`](Self::pull_ciphertext).
    fn start(&mut self) -> Result<(), TlsError>;

    /// Feed ciphertext received from the peer.
    fn put_ciphertext(&mut self, data: &[u8]) -> Result<(), TlsError>;

    /// Take ciphertext that must be sent to the peer. Empty when idle.
    fn pull_ciphertext(&mut self) -> Result<Vec<u8>, TlsError>;

    /// Whether the handshake completed.
    fn is_connected(&self) -> bool;

    /// Encrypt application data for the peer.
    fn write_plaintext(&mut self, data: &[u8]) -> Result<(), TlsError>;

    /// Take decrypted application data. Empty when nothing is pending.
    fn pull_plaintext(&mut self) -> Result<Vec<u8>, TlsError>;

    /// RFC 5705 keying material export.
    fn export_keying_material(&self, label: &str, len: usize) -> Result<Vec<u8>, TlsError>;
}

/// Creates one [`SecureChannel`] per negotiation.
///
/// Renegotiations run a fresh TLS session, so the session asks for a new
/// channel each time.
pub trait SecureChannelFactory: Send + Sync {
    /// Build a client channel for the given profile (CA, client certificate,
    /// key, EKU and SAN checks).
    fn make_channel(&self, configuration: &Configuration) -> Result<Box<dyn SecureChannel>, TlsError>;
}

/// Decrypts passphrase-protected PEM private keys for the parser.
pub trait PrivateKeyDecrypter {
    /// Return the decrypted PEM, or `None` if the passphrase is wrong.
    fn decrypted_key(&self, pem: &str, passphrase: &str) -> Result<Option<String>, String>;
}
