//! AES-CBC with HMAC, for servers that predate AEAD negotiation.
//!
//! ```text
//! | hmac(iv || ciphertext) | iv (16) | ciphertext |
//! ciphertext = AES-CBC(packet id || payload), PKCS#7 padded
//! ```

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::core::{CBC_IV_SIZE, CryptoError, PACKET_ID_SIZE};
use crate::crypto::{Cipher, Digest, hmac};

use super::channel::PacketCrypto;

fn encrypt_padded(cipher: Cipher, key: &[u8], iv: &[u8], plain: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let invalid = |_| CryptoError::InvalidKeyLength;
    Ok(match cipher {
        Cipher::Aes128Cbc => cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(invalid)?
            .encrypt_padded_vec_mut::<Pkcs7>(plain),
        Cipher::Aes192Cbc => cbc::Encryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(invalid)?
            .encrypt_padded_vec_mut::<Pkcs7>(plain),
        Cipher::Aes256Cbc => cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(invalid)?
            .encrypt_padded_vec_mut::<Pkcs7>(plain),
        other => return Err(CryptoError::Unsupported(other.name().to_string())),
    })
}

fn decrypt_padded(cipher: Cipher, key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let invalid = |_| CryptoError::InvalidKeyLength;
    let unpadded = match cipher {
        Cipher::Aes128Cbc => cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(invalid)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        Cipher::Aes192Cbc => cbc::Decryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(invalid)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        Cipher::Aes256Cbc => cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(invalid)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        other => return Err(CryptoError::Unsupported(other.name().to_string())),
    };
    unpadded.map_err(|_| CryptoError::DecryptionFailed)
}

/// CBC + HMAC packet protection for both directions.
pub(crate) struct CbcCrypto {
    cipher: Cipher,
    digest: Digest,
    encrypt_key: Zeroizing<Vec<u8>>,
    encrypt_hmac: Zeroizing<Vec<u8>>,
    decrypt_key: Zeroizing<Vec<u8>>,
    decrypt_hmac: Zeroizing<Vec<u8>>,
}

impl CbcCrypto {
    pub(crate) fn new(
        cipher: Cipher,
        digest: Digest,
        encrypt: (&[u8], &[u8]),
        decrypt: (&[u8], &[u8]),
    ) -> Result<Self, CryptoError> {
        if cipher.is_aead() {
            return Err(CryptoError::Unsupported(cipher.name().to_string()));
        }
        let hmac_len = digest.output_len();
        let check = |key: &[u8], len: usize| {
            key.get(..len)
                .map(|k| Zeroizing::new(k.to_vec()))
                .ok_or(CryptoError::InvalidKeyLength)
        };
        Ok(Self {
            cipher,
            digest,
            encrypt_key: check(encrypt.0, cipher.key_len())?,
            encrypt_hmac: check(encrypt.1, hmac_len)?,
            decrypt_key: check(decrypt.0, cipher.key_len())?,
            decrypt_hmac: check(decrypt.1, hmac_len)?,
        })
    }
}

impl PacketCrypto for CbcCrypto {
    fn seal(&self, _header: &[u8], packet_id: u32, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut iv = [0u8; CBC_IV_SIZE];
        OsRng.fill_bytes(&mut iv);

        let plain = Zeroizing::new([&packet_id.to_be_bytes()[..], payload].concat());
        let ciphertext = encrypt_padded(self.cipher, &self.encrypt_key, &iv, &plain)?;
        let tag = hmac::compute(self.digest, &self.encrypt_hmac, &[&iv, &ciphertext])?;

        let mut body = Vec::with_capacity(tag.len() + CBC_IV_SIZE + ciphertext.len());
        body.extend_from_slice(&tag);
        body.extend_from_slice(&iv);
        body.extend_from_slice(&ciphertext);
        Ok(body)
    }

    fn open(&self, _header: &[u8], body: &[u8]) -> Result<(u32, Vec<u8>), CryptoError> {
        let tag_len = self.digest.output_len();
        if body.len() < tag_len + 2 * CBC_IV_SIZE {
            return Err(CryptoError::Truncated);
        }
        let (tag, rest) = body.split_at(tag_len);
        hmac::verify(self.digest, &self.decrypt_hmac, &[rest], tag)?;

        let (iv, ciphertext) = rest.split_at(CBC_IV_SIZE);
        let plain = Zeroizing::new(decrypt_padded(self.cipher, &self.decrypt_key, iv, ciphertext)?);
        if plain.len() < PACKET_ID_SIZE {
            return Err(CryptoError::Truncated);
        }
        let packet_id = u32::from_be_bytes([plain[0], plain[1], plain[2], plain[3]]);
        Ok((packet_id, plain[PACKET_ID_SIZE..].to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(cipher: Cipher, digest: Digest) -> (CbcCrypto, CbcCrypto) {
        let (ka, ha, kb, hb) = ([1u8; 64], [2u8; 64], [3u8; 64], [4u8; 64]);
        let local = CbcCrypto::new(cipher, digest, (&ka, &ha), (&kb, &hb)).unwrap();
        let remote = CbcCrypto::new(cipher, digest, (&kb, &hb), (&ka, &ha)).unwrap();
        (local, remote)
    }

    #[test]
    fn test_cbc_interoperates() {
        for cipher in [Cipher::Aes128Cbc, Cipher::Aes192Cbc, Cipher::Aes256Cbc] {
            let (local, remote) = pair(cipher, Digest::Sha256);
            let body = local.seal(&[], 42, b"hello tun").unwrap();
            // 32 hmac + 16 iv + one padded block for 4 + 9 bytes
            assert_eq!(body.len(), 32 + 16 + 16);
            assert_eq!(remote.open(&[], &body).unwrap(), (42, b"hello tun".to_vec()));
        }
    }

    #[test]
    fn test_block_aligned_plaintext_gets_full_padding_block() {
        let (local, remote) = pair(Cipher::Aes256Cbc, Digest::Sha256);
        // packet id plus payload fill exactly one block
        let body = local.seal(&[], 7, b"hello tunnel").unwrap();
        assert_eq!(body.len(), 32 + 16 + 32);
        assert_eq!(remote.open(&[], &body).unwrap(), (7, b"hello tunnel".to_vec()));
    }

    #[test]
    fn test_random_iv_per_packet() {
        let (local, _) = pair(Cipher::Aes128Cbc, Digest::Sha1);
        let a = local.seal(&[], 1, b"same").unwrap();
        let b = local.seal(&[], 1, b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_hmac_checked_before_decrypt() {
        let (local, remote) = pair(Cipher::Aes256Cbc, Digest::Sha1);
        let mut body = local.seal(&[], 1, b"payload").unwrap();
        let last = body.len() - 1;
        body[last] ^= 0x80;
        assert_eq!(remote.open(&[], &body), Err(CryptoError::HmacMismatch));
        assert_eq!(remote.open(&[], &body[..30]), Err(CryptoError::Truncated));
    }
}
