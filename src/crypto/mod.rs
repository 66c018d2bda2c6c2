//! Cryptographic building blocks:
//! - Cipher and digest catalog
//! - HMAC dispatch
//! - TLS 1.0 PRF for key method 2
//! - Static keys and derived key material

mod algorithm;
pub(crate) mod hmac;
mod keys;
mod prf;

pub use algorithm::{Cipher, Digest};
pub use keys::{KeyDirection, KeyMaterial, PrfInputs, Role, StaticKey};
pub use prf::prf;
