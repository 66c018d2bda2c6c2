//! OpenVPN wire format.
//!
//! Every frame starts with one byte holding the opcode (top 5 bits) and the
//! key id (bottom 3 bits). Control frames continue with a session id and the
//! reliability fields, data frames with an optional peer id and ciphertext.

mod code;
mod control;
mod data;

pub use code::{PacketCode, SessionId};
pub use control::ControlPacket;
pub(crate) use control::{ACK_BLOCK_OFFSET, Reader};
pub use data::{DataHeader, Frame, classify};
