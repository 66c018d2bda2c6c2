//! Static keys and data channel key material.
//!
//! Both are 256-byte blocks split into four 64-byte slots:
//! ```text
//! [0..64)    cipher key, direction A
//! [64..128)  hmac key,   direction A
//! [128..192) cipher key, direction B
//! [192..256) hmac key,   direction B
//! ```
//! Secret bytes are zeroized on drop.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::core::{
    CryptoError, KEY_MATERIAL_SIZE, KEY_SLOT_SIZE, PRE_MASTER_SIZE, PRF_EXPANSION_LABEL,
    PRF_MASTER_LABEL, ParserError, RANDOM_SIZE, SESSION_ID_SIZE, STATIC_KEY_SIZE,
};

use super::prf::prf;

const STATIC_KEY_BEGIN: &str = "-----BEGIN OpenVPN Static key V1-----";
const STATIC_KEY_END: &str = "-----END OpenVPN Static key V1-----";
const STATIC_KEY_LINE_BYTES: usize = 16;

/// `key-direction` of a static key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyDirection {
    /// `key-direction 0`, used by servers.
    Normal,
    /// `key-direction 1`, used by clients.
    Inverse,
}

impl KeyDirection {
    /// Parse the numeric directive argument.
    pub fn from_value(value: &str) -> Option<Self> {
        match value {
            "0" => Some(Self::Normal),
            "1" => Some(Self::Inverse),
            _ => None,
        }
    }

    /// Numeric directive argument.
    pub fn value(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Inverse => 1,
        }
    }
}

/// A 2048-bit OpenVPN static key (`tls-auth`, `tls-crypt`).
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct StaticKey {
    bytes: [u8; STATIC_KEY_SIZE],
}

impl StaticKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; STATIC_KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Parse the hex body between the `OpenVPN Static key V1` markers.
    pub fn from_pem_lines<S: AsRef<str>>(lines: &[S]) -> Result<Self, ParserError> {
        let mut hex_body = String::with_capacity(STATIC_KEY_SIZE * 2);
        let mut inside = false;
        for line in lines {
            let line = line.as_ref().trim();
            match line {
                STATIC_KEY_BEGIN => inside = true,
                STATIC_KEY_END => inside = false,
                _ if inside => hex_body.push_str(line),
                _ => {}
            }
        }

        let mut decoded = hex::decode(&hex_body)
            .map_err(|e| ParserError::malformed("static key", e.to_string()))?;
        let result = <[u8; STATIC_KEY_SIZE]>::try_from(decoded.as_slice())
            .map(Self::from_bytes)
            .map_err(|_| {
                ParserError::malformed(
                    "static key",
                    format!("expected {STATIC_KEY_SIZE} bytes, got {}", decoded.len()),
                )
            });
        decoded.zeroize();
        result
    }

    /// Render back to the marker-delimited hex form.
    pub fn to_pem_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(STATIC_KEY_SIZE / STATIC_KEY_LINE_BYTES + 2);
        lines.push(STATIC_KEY_BEGIN.to_string());
        lines.extend(self.bytes.chunks(STATIC_KEY_LINE_BYTES).map(hex::encode));
        lines.push(STATIC_KEY_END.to_string());
        lines
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; STATIC_KEY_SIZE] {
        &self.bytes
    }

    /// HMAC key used to sign outbound packets.
    pub fn hmac_send_key(&self, direction: Option<KeyDirection>) -> &[u8] {
        match direction {
            Some(KeyDirection::Inverse) => self.slot(3),
            _ => self.slot(1),
        }
    }

    /// HMAC key used to verify inbound packets.
    pub fn hmac_receive_key(&self, direction: Option<KeyDirection>) -> &[u8] {
        match direction {
            Some(KeyDirection::Normal) => self.slot(3),
            _ => self.slot(1),
        }
    }

    /// Cipher key used to encrypt outbound packets.
    pub fn cipher_send_key(&self, direction: Option<KeyDirection>) -> &[u8] {
        match direction {
            Some(KeyDirection::Inverse) => self.slot(2),
            _ => self.slot(0),
        }
    }

    /// Cipher key used to decrypt inbound packets.
    pub fn cipher_receive_key(&self, direction: Option<KeyDirection>) -> &[u8] {
        match direction {
            Some(KeyDirection::Normal) => self.slot(2),
            _ => self.slot(0),
        }
    }

    fn slot(&self, index: usize) -> &[u8] {
        &self.bytes[index * KEY_SLOT_SIZE..(index + 1) * KEY_SLOT_SIZE]
    }
}

impl fmt::Debug for StaticKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticKey(<redacted>)")
    }
}

/// Which side of the data channel a key block is used by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Client: encrypts with direction B, decrypts with direction A.
    Client,
    /// Server: encrypts with direction A, decrypts with direction B.
    Server,
}

/// Data channel keys produced by one negotiation.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    bytes: [u8; KEY_MATERIAL_SIZE],
}

/// Inputs of the key method 2 PRF derivation.
pub struct PrfInputs<'a> {
    /// Client pre-master secret.
    pub pre_master: &'a [u8; PRE_MASTER_SIZE],
    /// Client first random.
    pub client_random1: &'a [u8; RANDOM_SIZE],
    /// Client second random.
    pub client_random2: &'a [u8; RANDOM_SIZE],
    /// Server first random.
    pub server_random1: &'a [u8; RANDOM_SIZE],
    /// Server second random.
    pub server_random2: &'a [u8; RANDOM_SIZE],
    /// Client control channel session id.
    pub client_session_id: &'a [u8; SESSION_ID_SIZE],
    /// Server control channel session id.
    pub server_session_id: &'a [u8; SESSION_ID_SIZE],
}

impl KeyMaterial {
    /// Wrap a full key block, e.g. from TLS keying material export.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes = <[u8; KEY_MATERIAL_SIZE]>::try_from(bytes).map_err(|_| CryptoError::InvalidKeyLength)?;
        Ok(Self { bytes })
    }

    /// Derive the key block with the OpenVPN TLS 1.0 PRF.
    pub fn from_prf(inputs: &PrfInputs<'_>) -> Result<Self, CryptoError> {
        let mut master_seed = Vec::with_capacity(2 * RANDOM_SIZE);
        master_seed.extend_from_slice(inputs.client_random1);
        master_seed.extend_from_slice(inputs.server_random1);
        let mut master = prf(inputs.pre_master, PRF_MASTER_LABEL, &master_seed, PRE_MASTER_SIZE)?;

        let mut expansion_seed = Vec::with_capacity(2 * RANDOM_SIZE + 2 * SESSION_ID_SIZE);
        expansion_seed.extend_from_slice(inputs.client_random2);
        expansion_seed.extend_from_slice(inputs.server_random2);
        expansion_seed.extend_from_slice(inputs.client_session_id);
        expansion_seed.extend_from_slice(inputs.server_session_id);
        let mut block = prf(&master, PRF_EXPANSION_LABEL, &expansion_seed, KEY_MATERIAL_SIZE)?;
        master.zeroize();

        let result = Self::from_slice(&block);
        block.zeroize();
        result
    }

    /// Cipher key for outbound packets, `len` bytes.
    pub fn encrypt_cipher_key(&self, role: Role, len: usize) -> &[u8] {
        &self.slot(Self::outbound_slot(role))[..len.min(KEY_SLOT_SIZE)]
    }

    /// HMAC key (or AEAD implicit IV) for outbound packets.
    pub fn encrypt_hmac_key(&self, role: Role, len: usize) -> &[u8] {
        &self.slot(Self::outbound_slot(role) + 1)[..len.min(KEY_SLOT_SIZE)]
    }

    /// Cipher key for inbound packets, `len` bytes.
    pub fn decrypt_cipher_key(&self, role: Role, len: usize) -> &[u8] {
        &self.slot(Self::inbound_slot(role))[..len.min(KEY_SLOT_SIZE)]
    }

    /// HMAC key (or AEAD implicit IV) for inbound packets.
    pub fn decrypt_hmac_key(&self, role: Role, len: usize) -> &[u8] {
        &self.slot(Self::inbound_slot(role) + 1)[..len.min(KEY_SLOT_SIZE)]
    }

    fn outbound_slot(role: Role) -> usize {
        match role {
            Role::Client => 2,
            Role::Server => 0,
        }
    }

    fn inbound_slot(role: Role) -> usize {
        match role {
            Role::Client => 0,
            Role::Server => 2,
        }
    }

    /// Cipher key used to encrypt outbound packets.
    pub fn cipher_send_key(&self, direction: Option<KeyDirection>) -> &[u8] {
        match direction {
            Some(KeyDirection::Inverse) => self.slot(2),
            _ => self.slot(0),
        }
    }

    /// Cipher key used to decrypt inbound packets.
    pub fn cipher_receive_key(&self, direction: Option<KeyDirection>) -> &[u8] {
        match direction {
            Some(KeyDirection::Normal) => self.slot(2),
            _ => self.slot(0),
        }
    }

    fn slot(&self, index: usize) -> &[u8] {
        &self.bytes[index * KEY_SLOT_SIZE..(index + 1) * KEY_SLOT_SIZE]
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_static_key() -> StaticKey {
        let mut bytes = [0u8; STATIC_KEY_SIZE];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        StaticKey::from_bytes(bytes)
    }

    #[test]
    fn test_static_key_pem_roundtrip() {
        let key = sample_static_key();
        let lines = key.to_pem_lines();
        assert_eq!(lines.len(), 18);
        assert_eq!(lines[1], "000102030405060708090a0b0c0d0e0f");
        assert_eq!(StaticKey::from_pem_lines(&lines).unwrap(), key);
    }

    #[test]
    fn test_static_key_ignores_header_comments() {
        let mut lines = vec!["#".to_string(), "# 2048 bit OpenVPN static key".to_string()];
        lines.extend(sample_static_key().to_pem_lines());
        assert_eq!(StaticKey::from_pem_lines(&lines).unwrap(), sample_static_key());
    }

    #[test]
    fn test_static_key_wrong_size() {
        let lines = [STATIC_KEY_BEGIN, "0011", STATIC_KEY_END];
        assert!(matches!(
            StaticKey::from_pem_lines(&lines),
            Err(ParserError::MalformedOption { .. })
        ));
    }

    #[test]
    fn test_static_key_directions() {
        let key = sample_static_key();
        let a = &key.as_bytes()[64..128];
        let b = &key.as_bytes()[192..256];

        assert_eq!(key.hmac_send_key(Some(KeyDirection::Inverse)), b);
        assert_eq!(key.hmac_receive_key(Some(KeyDirection::Inverse)), a);
        assert_eq!(key.hmac_send_key(Some(KeyDirection::Normal)), a);
        assert_eq!(key.hmac_receive_key(Some(KeyDirection::Normal)), b);
        assert_eq!(key.hmac_send_key(None), a);
        assert_eq!(key.hmac_receive_key(None), a);
    }

    #[test]
    fn test_key_material_roles_mirror() {
        let mut bytes = [0u8; KEY_MATERIAL_SIZE];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        let keys = KeyMaterial::from_slice(&bytes).unwrap();

        assert_eq!(keys.encrypt_cipher_key(Role::Client, 32), &bytes[128..160]);
        assert_eq!(keys.encrypt_hmac_key(Role::Client, 20), &bytes[192..212]);
        assert_eq!(keys.decrypt_cipher_key(Role::Client, 16), &bytes[0..16]);
        assert_eq!(keys.decrypt_hmac_key(Role::Client, 8), &bytes[64..72]);

        assert_eq!(
            keys.encrypt_cipher_key(Role::Server, 32),
            keys.decrypt_cipher_key(Role::Client, 32)
        );
        assert_eq!(
            keys.decrypt_hmac_key(Role::Server, 64),
            keys.encrypt_hmac_key(Role::Client, 64)
        );
    }

    #[test]
    fn test_key_material_from_prf() {
        let pre_master = [1u8; PRE_MASTER_SIZE];
        let (cr1, cr2, sr1, sr2) = ([2u8; 32], [3u8; 32], [4u8; 32], [5u8; 32]);
        let (csid, ssid) = ([6u8; 8], [7u8; 8]);
        let inputs = PrfInputs {
            pre_master: &pre_master,
            client_random1: &cr1,
            client_random2: &cr2,
            server_random1: &sr1,
            server_random2: &sr2,
            client_session_id: &csid,
            server_session_id: &ssid,
        };
        let a = KeyMaterial::from_prf(&inputs).unwrap();
        let b = KeyMaterial::from_prf(&inputs).unwrap();
        assert_eq!(a.encrypt_cipher_key(Role::Client, 64), b.encrypt_cipher_key(Role::Client, 64));

        let other_sid = [8u8; 8];
        let changed = KeyMaterial::from_prf(&PrfInputs {
            server_session_id: &other_sid,
            ..inputs
        })
        .unwrap();
        assert_ne!(a.encrypt_cipher_key(Role::Client, 64), changed.encrypt_cipher_key(Role::Client, 64));
    }

    #[test]
    fn test_key_material_wrong_length() {
        assert_eq!(
            KeyMaterial::from_slice(&[0u8; 10]).unwrap_err(),
            CryptoError::InvalidKeyLength
        );
    }
}
