//! Control channel packet encoding and decoding.
//!
//! Wire format (after optional tls-auth unwrapping):
//! ```text
//! +--------+------------+-----------+-------------------+-----------------+-------------+---------+
//! | op|key | session id | ack count | ack ids           | remote sid      | packet id   | payload |
//! | 1 byte | 8 bytes    | 1 byte    | 4 bytes each (BE) | 8 bytes if acks | 4 bytes, BE | rest    |
//! +--------+------------+-----------+-------------------+-----------------+-------------+---------+
//! ```
//! `ACK_V1` packets stop after the ack block.

use crate::core::{KEY_ID_MASK, MAX_ACKS_PER_PACKET, PACKET_ID_SIZE, PacketError, SESSION_ID_SIZE};

use super::code::{PacketCode, SessionId};

/// Offset where the ack block starts.
pub(crate) const ACK_BLOCK_OFFSET: usize = 1 + SESSION_ID_SIZE;

/// One control channel message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPacket {
    /// Opcode.
    pub code: PacketCode,
    /// Key id of the negotiation this packet belongs to.
    pub key: u8,
    /// Sender's session id.
    pub session_id: SessionId,
    /// Sequence number within the key's control stream. Zero for acks.
    pub packet_id: u32,
    /// Acknowledged packet ids, when the packet carries an ack block.
    pub ack_ids: Option<Vec<u32>>,
    /// Receiver's session id, present together with `ack_ids`.
    pub ack_remote_session_id: Option<SessionId>,
    /// Payload, present unless the packet is a pure ack.
    pub payload: Option<Vec<u8>>,
}

impl ControlPacket {
    /// Create a packet carrying a payload.
    pub fn new(
        code: PacketCode,
        key: u8,
        session_id: SessionId,
        packet_id: u32,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            code,
            key,
            session_id,
            packet_id,
            ack_ids: None,
            ack_remote_session_id: None,
            payload: Some(payload),
        }
    }

    /// Create a pure acknowledgment.
    pub fn ack(key: u8, session_id: SessionId, ack_ids: Vec<u32>, remote_session_id: SessionId) -> Self {
        Self {
            code: PacketCode::Ack,
            key,
            session_id,
            packet_id: 0,
            ack_ids: Some(ack_ids),
            ack_remote_session_id: Some(remote_session_id),
            payload: None,
        }
    }

    /// Whether this is a pure acknowledgment.
    pub fn is_ack(&self) -> bool {
        self.code == PacketCode::Ack
    }

    /// Serialize to plain wire bytes (without tls-auth).
    ///
    /// Fails for field combinations that would not decode back to the same
    /// packet: empty or oversized ack lists, an ack list without the remote
    /// session id, a payload on a pure ack or none on any other packet.
    pub fn serialize(&self) -> Result<Vec<u8>, PacketError> {
        self.validate()?;
        let acks = self.ack_ids.as_deref().unwrap_or(&[]);
        let payload = self.payload.as_deref().unwrap_or(&[]);

        let mut buf = Vec::with_capacity(
            ACK_BLOCK_OFFSET + 1 + acks.len() * PACKET_ID_SIZE + SESSION_ID_SIZE + PACKET_ID_SIZE + payload.len(),
        );
        buf.push(self.code.first_byte(self.key));
        buf.extend_from_slice(self.session_id.as_bytes());

        buf.push(acks.len() as u8);
        if let Some(remote) = self.ack_remote_session_id {
            for id in acks {
                buf.extend_from_slice(&id.to_be_bytes());
            }
            buf.extend_from_slice(remote.as_bytes());
        }

        if !self.is_ack() {
            buf.extend_from_slice(&self.packet_id.to_be_bytes());
            buf.extend_from_slice(payload);
        }
        Ok(buf)
    }

    fn validate(&self) -> Result<(), PacketError> {
        if self.code.is_data() {
            return Err(PacketError::WrongClass(self.code));
        }
        if self.key > KEY_ID_MASK {
            return Err(PacketError::Unencodable("key id out of range"));
        }
        match (&self.ack_ids, &self.ack_remote_session_id) {
            (Some(ids), _) if ids.len() > MAX_ACKS_PER_PACKET => {
                return Err(PacketError::TooManyAcks(ids.len()));
            }
            (Some(ids), Some(_)) if ids.is_empty() => {
                return Err(PacketError::Unencodable("empty ack list"));
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(PacketError::Unencodable("ack list and remote session id must come together"));
            }
            _ => {}
        }
        match (self.is_ack(), &self.payload) {
            (true, Some(_)) => Err(PacketError::Unencodable("pure ack with payload")),
            (true, None) if self.packet_id != 0 => Err(PacketError::Unencodable("pure ack with packet id")),
            (false, None) => Err(PacketError::Unencodable("missing payload")),
            _ => Ok(()),
        }
    }

    /// Parse plain wire bytes (without tls-auth).
    pub fn deserialize(bytes: &[u8]) -> Result<Self, PacketError> {
        let first = *bytes.first().ok_or(PacketError::Empty)?;
        let (code, key) = PacketCode::split_first_byte(first)?;
        if code.is_data() {
            return Err(PacketError::WrongClass(code));
        }

        let mut reader = Reader::new(bytes, 1);
        let session_id = SessionId::from_slice(reader.take(SESSION_ID_SIZE)?)?;

        let ack_count = reader.take(1)?[0] as usize;
        if ack_count > MAX_ACKS_PER_PACKET {
            return Err(PacketError::TooManyAcks(ack_count));
        }
        let (ack_ids, ack_remote_session_id) = if ack_count > 0 {
            let mut ids = Vec::with_capacity(ack_count);
            for _ in 0..ack_count {
                ids.push(reader.u32()?);
            }
            let remote = SessionId::from_slice(reader.take(SESSION_ID_SIZE)?)?;
            (Some(ids), Some(remote))
        } else {
            (None, None)
        };

        let (packet_id, payload) = if code == PacketCode::Ack {
            (0, None)
        } else {
            let id = reader.u32()?;
            (id, Some(reader.rest().to_vec()))
        };

        Ok(Self {
            code,
            key,
            session_id,
            packet_id,
            ack_ids,
            ack_remote_session_id,
            payload,
        })
    }

    /// Render for logs. Session ids and payload bytes appear only when
    /// `with_sensitive_data` is set.
    pub fn debug_description(&self, with_sensitive_data: bool) -> String {
        let sensitive_id = |id: &SessionId| {
            if with_sensitive_data {
                id.to_hex()
            } else {
                "<redacted>".to_string()
            }
        };

        let mut parts = vec![
            format!("{} | {}", self.code, self.key),
            format!("sid: {}", sensitive_id(&self.session_id)),
        ];
        if let (Some(ids), Some(remote)) = (&self.ack_ids, &self.ack_remote_session_id) {
            parts.push(format!("acks: {{{:?}, {}}}", ids, sensitive_id(remote)));
        }
        if !self.is_ack() {
            parts.push(format!("pid: {}", self.packet_id));
        }
        if let Some(payload) = &self.payload {
            if with_sensitive_data {
                parts.push(hex::encode(payload));
            } else {
                parts.push(format!("[{} bytes]", payload.len()));
            }
        }
        format!("{{{}}}", parts.join(", "))
    }
}

/// Bounds-checked cursor over a frame.
pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8], offset: usize) -> Self {
        Self { bytes, offset }
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8], PacketError> {
        let end = self.offset + len;
        let slice = self.bytes.get(self.offset..end).ok_or(PacketError::Truncated {
            expected: end,
            actual: self.bytes.len(),
        })?;
        self.offset = end;
        Ok(slice)
    }

    pub(crate) fn u32(&mut self) -> Result<u32, PacketError> {
        let raw = self.take(PACKET_ID_SIZE)?;
        Ok(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    pub(crate) fn rest(&self) -> &'a [u8] {
        &self.bytes[self.offset.min(self.bytes.len())..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sid(byte: u8) -> SessionId {
        SessionId::from_bytes([byte; SESSION_ID_SIZE])
    }

    #[test]
    fn test_control_roundtrip_with_acks() {
        let packet = ControlPacket {
            code: PacketCode::Control,
            key: 2,
            session_id: sid(0xaa),
            packet_id: 7,
            ack_ids: Some(vec![4, 5]),
            ack_remote_session_id: Some(sid(0xbb)),
            payload: Some(b"tls record".to_vec()),
        };
        let bytes = packet.serialize().unwrap();
        assert_eq!(bytes[0], 0x22);
        assert_eq!(ControlPacket::deserialize(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_hard_reset_layout() {
        let packet = ControlPacket::new(PacketCode::HardResetClient, 0, sid(0x01), 0, Vec::new());
        let bytes = packet.serialize().unwrap();
        // opcode, session id, zero ack count, packet id
        assert_eq!(hex::encode(&bytes), "38010101010101010100".to_string() + "00000000");

        let decoded = ControlPacket::deserialize(&bytes).unwrap();
        assert_eq!(decoded.payload, Some(Vec::new()));
        assert_eq!(decoded.ack_ids, None);
    }

    #[test]
    fn test_pure_ack_has_no_payload() {
        // ACK_V1, session id, one ack (packet id 1), remote session id
        let mut bytes = vec![0x28];
        bytes.extend_from_slice(&[0x11; 8]);
        bytes.push(1);
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(&[0x22; 8]);

        let packet = ControlPacket::deserialize(&bytes).unwrap();
        assert!(packet.is_ack());
        assert_eq!(packet.payload, None);
        assert_eq!(packet.ack_ids, Some(vec![1]));
        assert_eq!(packet.ack_remote_session_id, Some(sid(0x22)));
        assert_eq!(packet.serialize().unwrap(), bytes);
    }

    #[test]
    fn test_truncated_packets_rejected() {
        let full = ControlPacket::new(PacketCode::Control, 0, sid(3), 9, b"x".to_vec()).serialize().unwrap();
        for len in [0, 1, 5, 9, 13] {
            assert!(ControlPacket::deserialize(&full[..len]).is_err(), "len {len}");
        }
        // ack count claims two ids but only one follows
        let mut bytes = vec![0x28];
        bytes.extend_from_slice(&[0; 8]);
        bytes.push(2);
        bytes.extend_from_slice(&[0; 4]);
        assert!(matches!(
            ControlPacket::deserialize(&bytes),
            Err(PacketError::Truncated { .. })
        ));
    }

    #[test]
    fn test_data_code_rejected() {
        assert_eq!(
            ControlPacket::deserialize(&[0x48, 0, 0, 1]),
            Err(PacketError::WrongClass(PacketCode::DataV2))
        );
    }

    #[test]
    fn test_debug_description_redaction() {
        let packet = ControlPacket {
            code: PacketCode::Control,
            key: 0,
            session_id: sid(0xab),
            packet_id: 3,
            ack_ids: Some(vec![1]),
            ack_remote_session_id: Some(sid(0xcd)),
            payload: Some(vec![0xde, 0xad]),
        };

        let redacted = packet.debug_description(false);
        assert!(!redacted.contains("abababab"));
        assert!(!redacted.contains("dead"));
        assert!(redacted.contains("[2 bytes]"));
        assert!(redacted.contains("pid: 3"));

        let full = packet.debug_description(true);
        assert!(full.contains("abababababababab"));
        assert!(full.contains("cdcdcdcdcdcdcdcd"));
        assert!(full.contains("dead"));
    }

    #[test]
    fn test_unencodable_packets_rejected() {
        let mut packet = ControlPacket::new(PacketCode::Control, 0, sid(1), 3, b"x".to_vec());
        packet.ack_ids = Some(Vec::new());
        packet.ack_remote_session_id = Some(sid(2));
        assert_eq!(packet.serialize(), Err(PacketError::Unencodable("empty ack list")));

        packet.ack_ids = Some((0..300).collect());
        assert_eq!(packet.serialize(), Err(PacketError::TooManyAcks(300)));

        packet.ack_ids = Some(vec![1]);
        packet.ack_remote_session_id = None;
        assert!(matches!(packet.serialize(), Err(PacketError::Unencodable(_))));

        let mut ack = ControlPacket::ack(0, sid(1), vec![1], sid(2));
        ack.payload = Some(vec![1]);
        assert!(matches!(ack.serialize(), Err(PacketError::Unencodable(_))));

        let mut reset = ControlPacket::new(PacketCode::SoftReset, 9, sid(1), 0, Vec::new());
        assert!(matches!(reset.serialize(), Err(PacketError::Unencodable(_))));
        reset.key = 1;
        reset.payload = None;
        assert_eq!(reset.serialize(), Err(PacketError::Unencodable("missing payload")));
    }

    #[test]
    fn test_full_ack_block_roundtrip() {
        let ids: Vec<u32> = (0..MAX_ACKS_PER_PACKET as u32).collect();
        let packet = ControlPacket::ack(3, sid(1), ids, sid(2));
        let bytes = packet.serialize().unwrap();
        assert_eq!(bytes[ACK_BLOCK_OFFSET] as usize, MAX_ACKS_PER_PACKET);
        assert_eq!(ControlPacket::deserialize(&bytes).unwrap(), packet);
    }

    fn arb_packet() -> impl Strategy<Value = ControlPacket> {
        let code = prop::sample::select(vec![
            PacketCode::HardResetClient,
            PacketCode::HardResetServer,
            PacketCode::SoftReset,
            PacketCode::Control,
            PacketCode::Ack,
        ]);
        let acks = prop::option::of((
            prop::collection::vec(any::<u32>(), 1..=MAX_ACKS_PER_PACKET),
            any::<[u8; SESSION_ID_SIZE]>(),
        ));
        (
            code,
            0u8..=KEY_ID_MASK,
            any::<[u8; SESSION_ID_SIZE]>(),
            any::<u32>(),
            acks,
            prop::collection::vec(any::<u8>(), 0..64),
        )
            .prop_map(|(code, key, session_id, packet_id, acks, payload)| {
                let is_ack = code == PacketCode::Ack;
                let (ack_ids, ack_remote_session_id) = match acks {
                    Some((ids, remote)) => (Some(ids), Some(SessionId::from_bytes(remote))),
                    None => (None, None),
                };
                ControlPacket {
                    code,
                    key,
                    session_id: SessionId::from_bytes(session_id),
                    packet_id: if is_ack { 0 } else { packet_id },
                    ack_ids,
                    ack_remote_session_id,
                    payload: (!is_ack).then_some(payload),
                }
            })
    }

    proptest! {
        #[test]
        fn prop_encodable_packets_roundtrip(packet in arb_packet()) {
            let bytes = packet.serialize().unwrap();
            prop_assert_eq!(ControlPacket::deserialize(&bytes).unwrap(), packet);
        }
    }
}
