//! `tls-auth`: HMAC authentication of control packets.
//!
//! ```text
//! plain:   | op | session id | rest...                                |
//! wrapped: | op | session id | hmac | replay id (4) | time (4) | rest |
//! hmac = HMAC(replay id | time | op | session id | rest)
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use zeroize::Zeroizing;

use crate::core::{CryptoError, PacketError, SESSION_ID_SIZE, TLS_AUTH_REPLAY_SIZE};
use crate::crypto::{Digest, KeyDirection, StaticKey, hmac};

pub(super) const HEADER_SIZE: usize = 1 + SESSION_ID_SIZE;

/// Next replay id and the current time, as carried by wrapped packets.
pub(super) fn replay_block(next_replay_id: &mut u32) -> Result<[u8; TLS_AUTH_REPLAY_SIZE], CryptoError> {
    let replay_id = *next_replay_id;
    *next_replay_id = replay_id.checked_add(1).ok_or(CryptoError::PacketIdExhausted)?;
    let time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or_default();

    let mut replay = [0u8; TLS_AUTH_REPLAY_SIZE];
    replay[..4].copy_from_slice(&replay_id.to_be_bytes());
    replay[4..].copy_from_slice(&time.to_be_bytes());
    Ok(replay)
}

/// Signs outbound and verifies inbound control packets.
pub struct TlsAuth {
    digest: Digest,
    send_key: Zeroizing<Vec<u8>>,
    receive_key: Zeroizing<Vec<u8>>,
    next_replay_id: u32,
}

impl TlsAuth {
    /// Derive the directional HMAC keys from a static key.
    pub fn new(key: &StaticKey, direction: Option<KeyDirection>, digest: Digest) -> Self {
        let len = digest.output_len();
        Self {
            digest,
            send_key: Zeroizing::new(key.hmac_send_key(direction)[..len].to_vec()),
            receive_key: Zeroizing::new(key.hmac_receive_key(direction)[..len].to_vec()),
            next_replay_id: 1,
        }
    }

    /// Bytes added to every control packet.
    pub fn overhead(&self) -> usize {
        self.digest.output_len() + TLS_AUTH_REPLAY_SIZE
    }

    /// Wrap a plain control packet.
    pub fn wrap(&mut self, plain: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if plain.len() < HEADER_SIZE {
            return Err(CryptoError::Truncated);
        }
        let replay = replay_block(&mut self.next_replay_id)?;
        let (header, rest) = plain.split_at(HEADER_SIZE);
        let tag = hmac::compute(self.digest, &self.send_key, &[&replay, header, rest])?;

        let mut wrapped = Vec::with_capacity(plain.len() + self.overhead());
        wrapped.extend_from_slice(header);
        wrapped.extend_from_slice(&tag);
        wrapped.extend_from_slice(&replay);
        wrapped.extend_from_slice(rest);
        Ok(wrapped)
    }

    /// Verify and strip the authentication fields of an inbound packet.
    pub fn unwrap(&self, wrapped: &[u8]) -> Result<Vec<u8>, PacketError> {
        let tag_len = self.digest.output_len();
        let min = HEADER_SIZE + tag_len + TLS_AUTH_REPLAY_SIZE;
        if wrapped.len() < min {
            return Err(PacketError::Truncated {
                expected: min,
                actual: wrapped.len(),
            });
        }
        let (header, tail) = wrapped.split_at(HEADER_SIZE);
        let (tag, tail) = tail.split_at(tag_len);
        let (replay, rest) = tail.split_at(TLS_AUTH_REPLAY_SIZE);

        hmac::verify(self.digest, &self.receive_key, &[replay, header, rest], tag)
            .map_err(|_| PacketError::AuthenticationFailed)?;

        let mut plain = Vec::with_capacity(HEADER_SIZE + rest.len());
        plain.extend_from_slice(header);
        plain.extend_from_slice(rest);
        Ok(plain)
    }
}

impl std::fmt::Debug for TlsAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsAuth")
            .field("digest", &self.digest)
            .field("next_replay_id", &self.next_replay_id)
            .finish_non_exhaustive()
    }
}
