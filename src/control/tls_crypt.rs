//! `tls-crypt`: encryption and authentication of control packets.
//!
//! ```text
//! plain:   | op | session id | rest...                                          |
//! wrapped: | op | session id | replay id (4) | time (4) | tag (32) | AES-CTR(rest) |
//! tag = HMAC-SHA256(op | session id | replay id | time | rest)
//! iv  = tag[..16]
//! ```
//! The client always uses the inverse key direction; `key-direction` does
//! not apply.

use aes::Aes256;
use aes::cipher::{KeyIvInit, StreamCipher};
use zeroize::Zeroizing;

use crate::core::{
    CryptoError, PacketError, TLS_AUTH_REPLAY_SIZE, TLS_CRYPT_KEY_SIZE, TLS_CRYPT_TAG_SIZE,
};
use crate::crypto::{Digest, KeyDirection, StaticKey, hmac};

use super::tls_auth::{HEADER_SIZE, replay_block};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

const IV_SIZE: usize = 16;

/// Encrypts outbound and decrypts inbound control packets.
pub struct TlsCrypt {
    send_cipher: Zeroizing<Vec<u8>>,
    send_hmac: Zeroizing<Vec<u8>>,
    receive_cipher: Zeroizing<Vec<u8>>,
    receive_hmac: Zeroizing<Vec<u8>>,
    next_replay_id: u32,
}

impl TlsCrypt {
    /// Client side of `key`.
    pub fn client(key: &StaticKey) -> Self {
        Self::new(key, KeyDirection::Inverse)
    }

    /// Derive the directional keys of a static key.
    pub fn new(key: &StaticKey, direction: KeyDirection) -> Self {
        let direction = Some(direction);
        let take = |slot: &[u8]| Zeroizing::new(slot[..TLS_CRYPT_KEY_SIZE].to_vec());
        Self {
            send_cipher: take(key.cipher_send_key(direction)),
            send_hmac: take(key.hmac_send_key(direction)),
            receive_cipher: take(key.cipher_receive_key(direction)),
            receive_hmac: take(key.hmac_receive_key(direction)),
            next_replay_id: 1,
        }
    }

    /// Bytes added to every control packet.
    pub fn overhead(&self) -> usize {
        TLS_AUTH_REPLAY_SIZE + TLS_CRYPT_TAG_SIZE
    }

    /// Encrypt and sign a plain control packet.
    pub fn wrap(&mut self, plain: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if plain.len() < HEADER_SIZE {
            return Err(CryptoError::Truncated);
        }
        let replay = replay_block(&mut self.next_replay_id)?;
        let (header, rest) = plain.split_at(HEADER_SIZE);
        let tag = hmac::compute(Digest::Sha256, &self.send_hmac, &[header, replay.as_slice(), rest])?;

        let mut encrypted = rest.to_vec();
        apply_ctr(&self.send_cipher, &tag[..IV_SIZE], &mut encrypted)?;

        let mut wrapped = Vec::with_capacity(plain.len() + self.overhead());
        wrapped.extend_from_slice(header);
        wrapped.extend_from_slice(&replay);
        wrapped.extend_from_slice(&tag);
        wrapped.extend_from_slice(&encrypted);
        Ok(wrapped)
    }

    /// Decrypt an inbound packet and verify its tag.
    pub fn unwrap(&self, wrapped: &[u8]) -> Result<Vec<u8>, PacketError> {
        let min = HEADER_SIZE + TLS_AUTH_REPLAY_SIZE + TLS_CRYPT_TAG_SIZE;
        if wrapped.len() < min {
            return Err(PacketError::Truncated {
                expected: min,
                actual: wrapped.len(),
            });
        }
        let (header, tail) = wrapped.split_at(HEADER_SIZE);
        let (replay, tail) = tail.split_at(TLS_AUTH_REPLAY_SIZE);
        let (tag, encrypted) = tail.split_at(TLS_CRYPT_TAG_SIZE);

        let mut rest = Zeroizing::new(encrypted.to_vec());
        apply_ctr(&self.receive_cipher, &tag[..IV_SIZE], &mut rest)
            .map_err(|_| PacketError::AuthenticationFailed)?;
        hmac::verify(Digest::Sha256, &self.receive_hmac, &[header, replay, rest.as_slice()], tag)
            .map_err(|_| PacketError::AuthenticationFailed)?;

        let mut plain = Vec::with_capacity(HEADER_SIZE + rest.len());
        plain.extend_from_slice(header);
        plain.extend_from_slice(&rest);
        Ok(plain)
    }
}

fn apply_ctr(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<(), CryptoError> {
    let mut cipher = Aes256Ctr::new_from_slices(key, iv).map_err(|_| CryptoError::InvalidKeyLength)?;
    cipher.apply_keystream(buf);
    Ok(())
}

impl std::fmt::Debug for TlsCrypt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsCrypt")
            .field("next_replay_id", &self.next_replay_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::STATIC_KEY_SIZE;

    fn key() -> StaticKey {
        let mut bytes = [0u8; STATIC_KEY_SIZE];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(7).wrapping_add(3);
        }
        StaticKey::from_bytes(bytes)
    }

    fn plain() -> Vec<u8> {
        // control packet: op, session id, no acks, packet id, payload
        [vec![0x20], vec![9; 8], vec![0], vec![0, 0, 0, 4], b"client hello".to_vec()].concat()
    }

    #[test]
    fn test_client_server_interoperate() {
        let mut client = TlsCrypt::client(&key());
        let mut server = TlsCrypt::new(&key(), KeyDirection::Normal);

        let plain = plain();
        let wrapped = client.wrap(&plain).unwrap();
        assert_eq!(wrapped.len(), plain.len() + 40);
        assert_eq!(&wrapped[..9], &plain[..9]);
        // the payload is not readable on the wire
        assert!(!wrapped.windows(12).any(|w| w == b"client hello"));
        assert_eq!(server.unwrap(&wrapped).unwrap(), plain);

        let reply = server.wrap(&plain).unwrap();
        assert_eq!(client.unwrap(&reply).unwrap(), plain);
    }

    #[test]
    fn test_replay_id_advances() {
        let mut client = TlsCrypt::client(&key());
        let first = client.wrap(&plain()).unwrap();
        let second = client.wrap(&plain()).unwrap();
        assert_eq!(&first[9..13], &[0, 0, 0, 1]);
        assert_eq!(&second[9..13], &[0, 0, 0, 2]);
        assert_ne!(first[17..], second[17..]);
    }

    #[test]
    fn test_same_direction_rejected() {
        let mut a = TlsCrypt::client(&key());
        let b = TlsCrypt::client(&key());
        let wrapped = a.wrap(&plain()).unwrap();
        assert_eq!(b.unwrap(&wrapped), Err(PacketError::AuthenticationFailed));
    }

    #[test]
    fn test_tampering_detected() {
        let mut client = TlsCrypt::client(&key());
        let server = TlsCrypt::new(&key(), KeyDirection::Normal);
        let mut wrapped = client.wrap(&plain()).unwrap();
        let last = wrapped.len() - 1;
        wrapped[last] ^= 1;
        assert_eq!(server.unwrap(&wrapped), Err(PacketError::AuthenticationFailed));
        assert!(matches!(server.unwrap(&wrapped[..40]), Err(PacketError::Truncated { .. })));
    }
}
