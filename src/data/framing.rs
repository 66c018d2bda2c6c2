//! Compression framing of data channel payloads.
//!
//! The engine never compresses. It only speaks the framing the server
//! expects so that uncompressed payloads are recognized on both ends:
//! ```text
//! comp-lzo      | 0xFA | payload |
//! compress      | 0xFB | payload[1..] | payload[0] |
//! compress v2   | 0x50 0x00 | payload |   (only if payload starts with 0x50)
//! ```

use crate::config::CompressionFraming;
use crate::core::CryptoError;

const NO_COMPRESS: u8 = 0xfa;
const NO_COMPRESS_SWAP: u8 = 0xfb;
const LZO_COMPRESS: u8 = 0x66;
const LZ4_COMPRESS: u8 = 0x69;
const V2_INDICATOR: u8 = 0x50;
const V2_NO_COMPRESS: u8 = 0x00;

/// Apply outbound framing.
pub(crate) fn frame(framing: CompressionFraming, payload: &[u8]) -> Vec<u8> {
    match framing {
        CompressionFraming::Disabled => payload.to_vec(),
        CompressionFraming::CompLzo => {
            let mut out = Vec::with_capacity(payload.len() + 1);
            out.push(NO_COMPRESS);
            out.extend_from_slice(payload);
            out
        }
        CompressionFraming::Compress => {
            let mut out = Vec::with_capacity(payload.len() + 1);
            out.push(NO_COMPRESS_SWAP);
            if let Some((first, rest)) = payload.split_first() {
                out.extend_from_slice(rest);
                out.push(*first);
            }
            out
        }
        CompressionFraming::CompressV2 => {
            let mut out = Vec::with_capacity(payload.len() + 2);
            if payload.first() == Some(&V2_INDICATOR) {
                out.extend_from_slice(&[V2_INDICATOR, V2_NO_COMPRESS]);
            }
            out.extend_from_slice(payload);
            out
        }
    }
}

/// Strip inbound framing.
///
/// Fails with [`CryptoError::CompressedPayload`] when the peer actually
/// compressed the packet.
pub(crate) fn unframe(framing: CompressionFraming, payload: Vec<u8>) -> Result<Vec<u8>, CryptoError> {
    match framing {
        CompressionFraming::Disabled => Ok(payload),
        CompressionFraming::CompLzo | CompressionFraming::Compress => match payload.first() {
            None => Ok(payload),
            Some(&NO_COMPRESS) => Ok(payload[1..].to_vec()),
            Some(&NO_COMPRESS_SWAP) => {
                let mut out = payload[1..].to_vec();
                if let Some(last) = out.pop() {
                    out.insert(0, last);
                }
                Ok(out)
            }
            Some(&LZO_COMPRESS) | Some(&LZ4_COMPRESS) => Err(CryptoError::CompressedPayload),
            Some(_) => Ok(payload),
        },
        CompressionFraming::CompressV2 => match payload.as_slice() {
            [V2_INDICATOR, V2_NO_COMPRESS, rest @ ..] => Ok(rest.to_vec()),
            [V2_INDICATOR, ..] => Err(CryptoError::CompressedPayload),
            _ => Ok(payload),
        },
    }
}
