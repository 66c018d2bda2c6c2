//! AEAD data channel crypto (AES-GCM, ChaCha20-Poly1305).
//!
//! ```text
//! | packet id (4) | tag (16) | ciphertext |
//! nonce = packet id || implicit iv (8)
//! ad    = DATA_V2 header (4, V2 only) || packet id
//! ```

use aes::Aes192;
use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{AeadInPlace, KeyInit, Nonce, Tag};
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use chacha20poly1305::ChaCha20Poly1305;

use crate::core::{AEAD_IMPLICIT_IV_SIZE, AEAD_NONCE_SIZE, AEAD_TAG_SIZE, CryptoError, PACKET_ID_SIZE};
use crate::crypto::Cipher;

use super::channel::PacketCrypto;

type Aes192Gcm = AesGcm<Aes192, U12>;

enum AeadCipher {
    Aes128(Box<Aes128Gcm>),
    Aes192(Box<Aes192Gcm>),
    Aes256(Box<Aes256Gcm>),
    ChaCha(Box<ChaCha20Poly1305>),
}

fn init<A: KeyInit>(key: &[u8]) -> Result<Box<A>, CryptoError> {
    A::new_from_slice(key).map(Box::new).map_err(|_| CryptoError::InvalidKeyLength)
}

fn seal_with<A: AeadInPlace>(
    cipher: &A,
    nonce: &[u8],
    ad: &[u8],
    buffer: &mut [u8],
) -> Result<Vec<u8>, CryptoError> {
    cipher
        .encrypt_in_place_detached(Nonce::<A>::from_slice(nonce), ad, buffer)
        .map(|tag| tag.to_vec())
        .map_err(|_| CryptoError::EncryptionFailed)
}

fn open_with<A: AeadInPlace>(
    cipher: &A,
    nonce: &[u8],
    ad: &[u8],
    buffer: &mut [u8],
    tag: &[u8],
) -> Result<(), CryptoError> {
    cipher
        .decrypt_in_place_detached(Nonce::<A>::from_slice(nonce), ad, buffer, Tag::<A>::from_slice(tag))
        .map_err(|_| CryptoError::DecryptionFailed)
}

impl AeadCipher {
    fn new(cipher: Cipher, key: &[u8]) -> Result<Self, CryptoError> {
        match cipher {
            Cipher::Aes128Gcm => Ok(Self::Aes128(init(key)?)),
            Cipher::Aes192Gcm => Ok(Self::Aes192(init(key)?)),
            Cipher::Aes256Gcm => Ok(Self::Aes256(init(key)?)),
            Cipher::ChaCha20Poly1305 => Ok(Self::ChaCha(init(key)?)),
            other => Err(CryptoError::Unsupported(other.name().to_string())),
        }
    }

    fn seal(&self, nonce: &[u8], ad: &[u8], buffer: &mut [u8]) -> Result<Vec<u8>, CryptoError> {
        match self {
            Self::Aes128(c) => seal_with(c.as_ref(), nonce, ad, buffer),
            Self::Aes192(c) => seal_with(c.as_ref(), nonce, ad, buffer),
            Self::Aes256(c) => seal_with(c.as_ref(), nonce, ad, buffer),
            Self::ChaCha(c) => seal_with(c.as_ref(), nonce, ad, buffer),
        }
    }

    fn open(&self, nonce: &[u8], ad: &[u8], buffer: &mut [u8], tag: &[u8]) -> Result<(), CryptoError> {
        match self {
            Self::Aes128(c) => open_with(c.as_ref(), nonce, ad, buffer, tag),
            Self::Aes192(c) => open_with(c.as_ref(), nonce, ad, buffer, tag),
            Self::Aes256(c) => open_with(c.as_ref(), nonce, ad, buffer, tag),
            Self::ChaCha(c) => open_with(c.as_ref(), nonce, ad, buffer, tag),
        }
    }
}

/// One direction of an AEAD data channel.
struct Direction {
    cipher: AeadCipher,
    implicit_iv: [u8; AEAD_IMPLICIT_IV_SIZE],
}

impl Direction {
    fn new(cipher: Cipher, key: &[u8], implicit_iv: &[u8]) -> Result<Self, CryptoError> {
        let implicit_iv = implicit_iv
            .get(..AEAD_IMPLICIT_IV_SIZE)
            .and_then(|iv| <[u8; AEAD_IMPLICIT_IV_SIZE]>::try_from(iv).ok())
            .ok_or(CryptoError::InvalidKeyLength)?;
        Ok(Self {
            cipher: AeadCipher::new(cipher, key)?,
            implicit_iv,
        })
    }

    fn nonce(&self, packet_id: &[u8]) -> [u8; AEAD_NONCE_SIZE] {
        let mut nonce = [0u8; AEAD_NONCE_SIZE];
        nonce[..PACKET_ID_SIZE].copy_from_slice(packet_id);
        nonce[PACKET_ID_SIZE..].copy_from_slice(&self.implicit_iv);
        nonce
    }
}

/// AEAD packet protection for both directions.
pub(crate) struct AeadCrypto {
    encrypt: Direction,
    decrypt: Direction,
}

impl AeadCrypto {
    /// Keys are `cipher.key_len()` bytes; implicit IVs come from the hmac slots.
    pub(crate) fn new(
        cipher: Cipher,
        encrypt_key: &[u8],
        encrypt_iv: &[u8],
        decrypt_key: &[u8],
        decrypt_iv: &[u8],
    ) -> Result<Self, CryptoError> {
        Ok(Self {
            encrypt: Direction::new(cipher, encrypt_key, encrypt_iv)?,
            decrypt: Direction::new(cipher, decrypt_key, decrypt_iv)?,
        })
    }
}

impl PacketCrypto for AeadCrypto {
    fn seal(&self, header: &[u8], packet_id: u32, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let pid = packet_id.to_be_bytes();
        let nonce = self.encrypt.nonce(&pid);
        let ad = [header, &pid[..]].concat();

        let mut buffer = payload.to_vec();
        let tag = self.encrypt.cipher.seal(&nonce, &ad, &mut buffer)?;

        let mut body = Vec::with_capacity(PACKET_ID_SIZE + AEAD_TAG_SIZE + buffer.len());
        body.extend_from_slice(&pid);
        body.extend_from_slice(&tag);
        body.extend_from_slice(&buffer);
        Ok(body)
    }

    fn open(&self, header: &[u8], body: &[u8]) -> Result<(u32, Vec<u8>), CryptoError> {
        if body.len() < PACKET_ID_SIZE + AEAD_TAG_SIZE {
            return Err(CryptoError::Truncated);
        }
        let (pid, rest) = body.split_at(PACKET_ID_SIZE);
        let (tag, ciphertext) = rest.split_at(AEAD_TAG_SIZE);
        let nonce = self.decrypt.nonce(pid);
        let ad = [header, pid].concat();

        let mut buffer = ciphertext.to_vec();
        self.decrypt.cipher.open(&nonce, &ad, &mut buffer, tag)?;
        let packet_id = u32::from_be_bytes([pid[0], pid[1], pid[2], pid[3]]);
        Ok((packet_id, buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(cipher: Cipher) -> (AeadCrypto, AeadCrypto) {
        let a = vec![0x11; cipher.key_len()];
        let b = vec![0x22; cipher.key_len()];
        let local = AeadCrypto::new(cipher, &a, &[1; 8], &b, &[2; 8]).unwrap();
        let remote = AeadCrypto::new(cipher, &b, &[2; 8], &a, &[1; 8]).unwrap();
        (local, remote)
    }

    #[test]
    fn test_all_aead_ciphers_interoperate() {
        for cipher in Cipher::ALL.into_iter().filter(|c| c.is_aead()) {
            let (local, remote) = pair(cipher);
            let body = local.seal(&[0x48, 0, 0, 1], 7, b"ip packet").unwrap();
            assert_eq!(&body[..4], &[0, 0, 0, 7]);
            assert_eq!(body.len(), 4 + 16 + 9);
            assert_eq!(remote.open(&[0x48, 0, 0, 1], &body).unwrap(), (7, b"ip packet".to_vec()));
        }
    }

    #[test]
    fn test_header_is_authenticated() {
        let (local, remote) = pair(Cipher::Aes256Gcm);
        let body = local.seal(&[0x48, 0, 0, 1], 1, b"x").unwrap();
        assert_eq!(remote.open(&[0x48, 0, 0, 2], &body), Err(CryptoError::DecryptionFailed));
        assert_eq!(remote.open(&[], &body[..10]), Err(CryptoError::Truncated));
    }

    #[test]
    fn test_cbc_is_not_aead() {
        assert!(matches!(
            AeadCrypto::new(Cipher::Aes128Cbc, &[0; 16], &[0; 8], &[0; 16], &[0; 8]),
            Err(CryptoError::Unsupported(_))
        ));
    }
}
