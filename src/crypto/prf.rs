//! TLS 1.0 pseudo-random function (RFC 2246, section 5).
//!
//! OpenVPN derives the key method 2 master secret and key block with it when
//! keying material export is not negotiated.

use ::hmac::{Hmac, Mac, digest::KeyInit};
use md5::Md5;
use sha1::Sha1;
use zeroize::Zeroize;

use crate::core::CryptoError;

use super::hmac::raw;

/// `P_hash(secret, seed)` expanded into `out`.
fn p_hash<M: Mac + KeyInit>(secret: &[u8], seed: &[u8], out: &mut [u8]) -> Result<(), CryptoError> {
    let mut a = raw::<M>(secret, &[seed])?;
    let mut offset = 0;
    while offset < out.len() {
        let mut chunk = raw::<M>(secret, &[&a, seed])?;
        let n = chunk.len().min(out.len() - offset);
        out[offset..offset + n].copy_from_slice(&chunk[..n]);
        offset += n;
        chunk.zeroize();

        let next = raw::<M>(secret, &[&a])?;
        a.zeroize();
        a = next;
    }
    a.zeroize();
    Ok(())
}

/// `PRF(secret, label, seed) = P_MD5(S1, label + seed) XOR P_SHA1(S2, label + seed)`.
///
/// S1 and S2 are the two halves of the secret, sharing the middle byte when
/// its length is odd.
pub fn prf(secret: &[u8], label: &[u8], seed: &[u8], len: usize) -> Result<Vec<u8>, CryptoError> {
    let half = secret.len().div_ceil(2);
    let s1 = &secret[..half];
    let s2 = &secret[secret.len() - half..];

    let mut full_seed = Vec::with_capacity(label.len() + seed.len());
    full_seed.extend_from_slice(label);
    full_seed.extend_from_slice(seed);

    let mut md5_out = vec![0u8; len];
    let mut sha1_out = vec![0u8; len];
    p_hash::<Hmac<Md5>>(s1, &full_seed, &mut md5_out)?;
    p_hash::<Hmac<Sha1>>(s2, &full_seed, &mut sha1_out)?;

    for (out, other) in md5_out.iter_mut().zip(sha1_out.iter()) {
        *out ^= other;
    }
    sha1_out.zeroize();
    Ok(md5_out)
}
