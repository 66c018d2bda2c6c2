//! HMAC dispatch over the supported digests.

use ::hmac::{Hmac, Mac, digest::KeyInit};
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};

use crate::core::CryptoError;

use super::Digest;

fn keyed<M: Mac + KeyInit>(key: &[u8], parts: &[&[u8]]) -> Result<M, CryptoError> {
    let mut mac = <M as KeyInit>::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength)?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac)
}

fn sign<M: Mac + KeyInit>(key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>, CryptoError> {
    Ok(keyed::<M>(key, parts)?.finalize().into_bytes().to_vec())
}

fn check<M: Mac + KeyInit>(key: &[u8], parts: &[&[u8]], tag: &[u8]) -> Result<(), CryptoError> {
    keyed::<M>(key, parts)?
        .verify_slice(tag)
        .map_err(|_| CryptoError::HmacMismatch)
}

/// HMAC over the concatenation of `parts`.
pub fn compute(digest: Digest, key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>, CryptoError> {
    match digest {
        Digest::Sha1 => sign::<Hmac<Sha1>>(key, parts),
        Digest::Sha224 => sign::<Hmac<Sha224>>(key, parts),
        Digest::Sha256 => sign::<Hmac<Sha256>>(key, parts),
        Digest::Sha384 => sign::<Hmac<Sha384>>(key, parts),
        Digest::Sha512 => sign::<Hmac<Sha512>>(key, parts),
    }
}

/// Constant-time verification of `tag` against the HMAC of `parts`.
pub fn verify(digest: Digest, key: &[u8], parts: &[&[u8]], tag: &[u8]) -> Result<(), CryptoError> {
    match digest {
        Digest::Sha1 => check::<Hmac<Sha1>>(key, parts, tag),
        Digest::Sha224 => check::<Hmac<Sha224>>(key, parts, tag),
        Digest::Sha256 => check::<Hmac<Sha256>>(key, parts, tag),
        Digest::Sha384 => check::<Hmac<Sha384>>(key, parts, tag),
        Digest::Sha512 => check::<Hmac<Sha512>>(key, parts, tag),
    }
}

/// Keyed MAC for an arbitrary hash, used by the PRF.
pub(crate) fn raw<M: Mac + KeyInit>(key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>, CryptoError> {
    sign::<M>(key, parts)
}
