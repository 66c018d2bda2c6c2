//! Opcodes and the first byte of every frame.

use std::fmt;

use rand::{RngCore, rngs::OsRng};

use crate::core::{KEY_ID_MASK, OPCODE_SHIFT, PacketError, SESSION_ID_SIZE};

/// Wire opcodes, carried in the top 5 bits of the first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketCode {
    /// `P_CONTROL_SOFT_RESET_V1`: starts a renegotiation on a new key id.
    SoftReset = 3,
    /// `P_CONTROL_V1`: carries TLS records.
    Control = 4,
    /// `P_ACK_V1`: pure acknowledgment.
    Ack = 5,
    /// `P_DATA_V1`: encrypted tunnel packet.
    DataV1 = 6,
    /// `P_CONTROL_HARD_RESET_CLIENT_V2`: first packet of a session.
    HardResetClient = 7,
    /// `P_CONTROL_HARD_RESET_SERVER_V2`: server's answer to the hard reset.
    HardResetServer = 8,
    /// `P_DATA_V2`: encrypted tunnel packet with a peer id.
    DataV2 = 9,
}

impl PacketCode {
    /// Parse an opcode value (already shifted down).
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            3 => Some(Self::SoftReset),
            4 => Some(Self::Control),
            5 => Some(Self::Ack),
            6 => Some(Self::DataV1),
            7 => Some(Self::HardResetClient),
            8 => Some(Self::HardResetServer),
            9 => Some(Self::DataV2),
            _ => None,
        }
    }

    /// Opcode value (not shifted).
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Whether frames with this code go to the data channel.
    pub fn is_data(self) -> bool {
        matches!(self, Self::DataV1 | Self::DataV2)
    }

    /// Whether frames with this code go to the control channel.
    pub fn is_control(self) -> bool {
        !self.is_data()
    }

    /// Build the first byte of a frame.
    pub fn first_byte(self, key: u8) -> u8 {
        (self.value() << OPCODE_SHIFT) | (key & KEY_ID_MASK)
    }

    /// Split the first byte of a frame into opcode and key id.
    pub fn split_first_byte(byte: u8) -> Result<(Self, u8), PacketError> {
        let value = byte >> OPCODE_SHIFT;
        let code = Self::from_value(value).ok_or(PacketError::UnknownCode(value))?;
        Ok((code, byte & KEY_ID_MASK))
    }
}

impl fmt::Display for PacketCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SoftReset => "SOFT_RESET_V1",
            Self::Control => "CONTROL_V1",
            Self::Ack => "ACK_V1",
            Self::DataV1 => "DATA_V1",
            Self::HardResetClient => "HARD_RESET_CLIENT_V2",
            Self::HardResetServer => "HARD_RESET_SERVER_V2",
            Self::DataV2 => "DATA_V2",
        };
        f.write_str(name)
    }
}

/// Control channel session id (8 random bytes per endpoint).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SessionId([u8; SESSION_ID_SIZE]);

impl SessionId {
    /// Generate a new random session id.
    pub fn generate() -> Self {
        let mut id = [0u8; SESSION_ID_SIZE];
        OsRng.fill_bytes(&mut id);
        Self(id)
    }

    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; SESSION_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Read from the start of a slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, PacketError> {
        let raw: [u8; SESSION_ID_SIZE] = bytes
            .get(..SESSION_ID_SIZE)
            .and_then(|s| s.try_into().ok())
            .ok_or(PacketError::Truncated {
                expected: SESSION_ID_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self(raw))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; SESSION_ID_SIZE] {
        &self.0
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.to_hex())
    }
}

impl AsRef<[u8]> for SessionId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
