//! Data frame headers and frame classification.

use crate::core::{PEER_ID_SIZE, PEER_ID_UNDEFINED, PacketError};

use super::code::PacketCode;

/// Clear-text header in front of an encrypted data payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataHeader {
    /// `DataV1` or `DataV2`.
    pub code: PacketCode,
    /// Data channel key id.
    pub key: u8,
    /// Peer id, only carried by `DataV2`.
    pub peer_id: Option<u32>,
}

impl DataHeader {
    /// Header for a `DATA_V1` frame.
    pub fn v1(key: u8) -> Self {
        Self {
            code: PacketCode::DataV1,
            key,
            peer_id: None,
        }
    }

    /// Header for a `DATA_V2` frame. Peer ids are 24 bits wide.
    pub fn v2(key: u8, peer_id: u32) -> Self {
        Self {
            code: PacketCode::DataV2,
            key,
            peer_id: Some(peer_id & PEER_ID_UNDEFINED),
        }
    }

    /// Header for outbound frames given the pushed peer id, if any.
    pub fn for_peer(key: u8, peer_id: Option<u32>) -> Self {
        match peer_id {
            Some(id) => Self::v2(key, id),
            None => Self::v1(key),
        }
    }

    /// Encoded length.
    pub fn len(&self) -> usize {
        match self.peer_id {
            Some(_) => 1 + PEER_ID_SIZE,
            None => 1,
        }
    }

    /// Never empty; present for clippy's `len_without_is_empty`.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Append the header to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.code.first_byte(self.key));
        if let Some(id) = self.peer_id {
            buf.extend_from_slice(&id.to_be_bytes()[1..]);
        }
    }

    /// Encoded header bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.len());
        self.encode_into(&mut buf);
        buf
    }

    /// Decode the header at the start of a data frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, PacketError> {
        let first = *bytes.first().ok_or(PacketError::Empty)?;
        let (code, key) = PacketCode::split_first_byte(first)?;
        match code {
            PacketCode::DataV1 => Ok(Self::v1(key)),
            PacketCode::DataV2 => {
                let raw = bytes.get(1..1 + PEER_ID_SIZE).ok_or(PacketError::Truncated {
                    expected: 1 + PEER_ID_SIZE,
                    actual: bytes.len(),
                })?;
                let peer_id = u32::from_be_bytes([0, raw[0], raw[1], raw[2]]);
                Ok(Self::v2(key, peer_id))
            }
            other => Err(PacketError::WrongClass(other)),
        }
    }
}

/// An inbound frame after looking at its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    /// Control-class frame, still possibly tls-auth wrapped.
    Control {
        /// Opcode.
        code: PacketCode,
        /// Key id from the opcode byte.
        key: u8,
        /// Whole frame.
        bytes: &'a [u8],
    },
    /// Data-class frame.
    Data {
        /// Decoded header.
        header: DataHeader,
        /// Whole frame, header included.
        bytes: &'a [u8],
    },
}

impl Frame<'_> {
    /// Key id the frame is tagged with.
    pub fn key(&self) -> u8 {
        match self {
            Frame::Control { key, .. } => *key,
            Frame::Data { header, .. } => header.key,
        }
    }
}

/// Classify a raw inbound frame by opcode.
///
/// Fails on empty frames, unknown opcodes and `DATA_V2` frames too short for
/// the peer id. Callers drop the frame and keep going.
pub fn classify(bytes: &[u8]) -> Result<Frame<'_>, PacketError> {
    let first = *bytes.first().ok_or(PacketError::Empty)?;
    let (code, key) = PacketCode::split_first_byte(first)?;
    if code.is_data() {
        let header = DataHeader::decode(bytes)?;
        Ok(Frame::Data { header, bytes })
    } else {
        Ok(Frame::Control { code, key, bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v2_header_layout() {
        let header = DataHeader::v2(3, 0x0a0b0c);
        assert_eq!(header.encode(), vec![0x4b, 0x0a, 0x0b, 0x0c]);
        assert_eq!(header.len(), 4);
        assert_eq!(DataHeader::decode(&[0x4b, 0x0a, 0x0b, 0x0c, 0xff]).unwrap(), header);
    }

    #[test]
    fn test_v1_header_layout() {
        let header = DataHeader::v1(1);
        assert_eq!(header.encode(), vec![0x31]);
        assert_eq!(header.len(), 1);
    }

    #[test]
    fn test_short_v2_is_malformed() {
        assert!(matches!(
            classify(&[0x48, 0x00]),
            Err(PacketError::Truncated { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_classify() {
        let data = [0x4d, 0, 0, 7, 1, 2, 3];
        match classify(&data).unwrap() {
            Frame::Data { header, bytes } => {
                assert_eq!(header.key, 5);
                assert_eq!(header.peer_id, Some(7));
                assert_eq!(bytes.len(), data.len());
            }
            other => panic!("unexpected {other:?}"),
        }

        let control = [0x20, 0, 0, 0, 0, 0, 0, 0, 0];
        let frame = classify(&control).unwrap();
        assert!(matches!(frame, Frame::Control { code: PacketCode::Control, key: 0, .. }));

        assert_eq!(classify(&[]), Err(PacketError::Empty));
        assert_eq!(classify(&[0x00]), Err(PacketError::UnknownCode(0)));
    }
}
