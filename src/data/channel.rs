//! Data channel of one key id.

use std::fmt;

use tracing::trace;

use crate::config::CompressionFraming;
use crate::core::{CryptoError, KEY_SLOT_SIZE, MAX_DATA_PACKET_ID, PING_MAGIC};
use crate::crypto::{Cipher, Digest, KeyMaterial, Role};
use crate::packet::{DataHeader, PacketCode};

use super::aead::AeadCrypto;
use super::cbc::CbcCrypto;
use super::framing;
use super::replay::ReplayWindow;

/// Packet protection of one cipher family.
pub(crate) trait PacketCrypto: Send + Sync {
    /// Protect `payload` numbered `packet_id`. Returns the bytes after the
    /// clear-text header.
    fn seal(&self, header: &[u8], packet_id: u32, payload: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Authenticate and decrypt the bytes after the header.
    fn open(&self, header: &[u8], body: &[u8]) -> Result<(u32, Vec<u8>), CryptoError>;
}

/// Encrypts tunnel packets and decrypts link frames for one key id.
///
/// Outbound packet ids start at 1. The replay window lives and dies with
/// the channel, so a fresh key always starts with a fresh window.
pub struct DataChannel {
    key: u8,
    peer_id: Option<u32>,
    framing: CompressionFraming,
    crypto: Box<dyn PacketCrypto>,
    next_packet_id: u32,
    replay: ReplayWindow,
}

impl DataChannel {
    /// Build the channel for `key` from negotiated key material.
    pub fn new(
        cipher: Cipher,
        digest: Digest,
        material: &KeyMaterial,
        role: Role,
        key: u8,
        peer_id: Option<u32>,
        framing: CompressionFraming,
    ) -> Result<Self, CryptoError> {
        let crypto: Box<dyn PacketCrypto> = if cipher.is_aead() {
            Box::new(AeadCrypto::new(
                cipher,
                material.encrypt_cipher_key(role, cipher.key_len()),
                material.encrypt_hmac_key(role, KEY_SLOT_SIZE),
                material.decrypt_cipher_key(role, cipher.key_len()),
                material.decrypt_hmac_key(role, KEY_SLOT_SIZE),
            )?)
        } else {
            Box::new(CbcCrypto::new(
                cipher,
                digest,
                (
                    material.encrypt_cipher_key(role, cipher.key_len()),
                    material.encrypt_hmac_key(role, digest.output_len()),
                ),
                (
                    material.decrypt_cipher_key(role, cipher.key_len()),
                    material.decrypt_hmac_key(role, digest.output_len()),
                ),
            )?)
        };
        Ok(Self {
            key,
            peer_id,
            framing,
            crypto,
            next_packet_id: 1,
            replay: ReplayWindow::new(),
        })
    }

    /// Key id.
    pub fn key(&self) -> u8 {
        self.key
    }

    /// Encrypt one tunnel packet into a complete data frame.
    pub fn encrypt(&mut self, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if self.next_packet_id > MAX_DATA_PACKET_ID {
            return Err(CryptoError::PacketIdExhausted);
        }
        let packet_id = self.next_packet_id;
        self.next_packet_id += 1;

        let header = DataHeader::for_peer(self.key, self.peer_id);
        let mut frame = header.encode();
        let framed = framing::frame(self.framing, payload);
        let body = self.crypto.seal(associated_header(&header, &frame), packet_id, &framed)?;
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// Encrypt a keepalive ping.
    pub fn encrypt_ping(&mut self) -> Result<Vec<u8>, CryptoError> {
        self.encrypt(&PING_MAGIC)
    }

    /// Decrypt one data frame, header included.
    ///
    /// Returns `Ok(None)` for keepalive pings, which are never handed to
    /// the tunnel.
    pub fn decrypt(&mut self, frame: &[u8]) -> Result<Option<Vec<u8>>, CryptoError> {
        let header = DataHeader::decode(frame).map_err(|_| CryptoError::Truncated)?;
        let (head, body) = frame.split_at(header.len().min(frame.len()));
        let (packet_id, framed) = self.crypto.open(associated_header(&header, head), body)?;
        self.replay.check_and_update(packet_id)?;

        let payload = framing::unframe(self.framing, framed)?;
        if payload == PING_MAGIC {
            trace!(key = self.key, packet_id, "keepalive ping received");
            return Ok(None);
        }
        Ok(Some(payload))
    }
}

// only DATA_V2 authenticates its header
fn associated_header<'a>(header: &DataHeader, bytes: &'a [u8]) -> &'a [u8] {
    match header.code {
        PacketCode::DataV2 => bytes,
        _ => &[],
    }
}

impl fmt::Debug for DataChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataChannel")
            .field("key", &self.key)
            .field("peer_id", &self.peer_id)
            .field("framing", &self.framing)
            .field("next_packet_id", &self.next_packet_id)
            .finish_non_exhaustive()
    }
}
