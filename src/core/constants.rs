//! Protocol constants of the OpenVPN wire protocol.
//!
//! Wire values are fixed by the protocol and MUST NOT be changed. Timing
//! values are defaults that profiles and [`SessionOptions`] may override.
//!
//! [`SessionOptions`]: crate::session::SessionOptions

use std::time::Duration;

// =============================================================================
// FRAMING
// =============================================================================

/// Bits of the first byte carrying the key id.
pub const KEY_ID_MASK: u8 = 0b111;

/// Shift applied to the opcode within the first byte.
pub const OPCODE_SHIFT: u8 = 3;

/// Number of distinct key ids.
pub const KEY_ID_COUNT: usize = 8;

/// Control channel session id size.
pub const SESSION_ID_SIZE: usize = 8;

/// Control and data packet id size (big-endian u32).
pub const PACKET_ID_SIZE: usize = 4;

/// Peer id size carried by `DATA_V2` after the opcode byte.
pub const PEER_ID_SIZE: usize = 3;

/// Peer id value meaning "no peer id assigned".
pub const PEER_ID_UNDEFINED: u32 = 0x00ff_ffff;

/// Upper bound on ack ids a single packet may carry.
pub const MAX_ACKS_PER_PACKET: usize = 8;

// =============================================================================
// CONTROL CHANNEL
// =============================================================================

/// Default maximum TLS bytes carried by one control packet.
pub const DEFAULT_MAX_CONTROL_PAYLOAD: usize = 1200;

/// Inbound control packets accepted ahead of the next expected packet id.
/// Packets further ahead are dropped without an ack.
pub const MAX_INBOUND_WINDOW: u32 = 64;

/// Initial retransmission timeout for control packets.
pub const INITIAL_RTO: Duration = Duration::from_millis(1000);

/// Minimum retransmission timeout.
pub const MIN_RTO: Duration = Duration::from_millis(200);

/// Maximum retransmission timeout.
pub const MAX_RTO: Duration = Duration::from_secs(8);

/// Exponential backoff multiplier applied after each retransmission.
pub const RTO_BACKOFF: u32 = 2;

/// Size of a 2048-bit OpenVPN static key.
pub const STATIC_KEY_SIZE: usize = 256;

/// Length of the replay packet id plus timestamp inserted by tls-auth.
pub const TLS_AUTH_REPLAY_SIZE: usize = 8;

/// tls-crypt HMAC-SHA256 tag length. Its first 16 bytes are the CTR IV.
pub const TLS_CRYPT_TAG_SIZE: usize = 32;

/// tls-crypt AES-256 and HMAC-SHA256 key length.
pub const TLS_CRYPT_KEY_SIZE: usize = 32;

// =============================================================================
// KEY METHOD 2
// =============================================================================

/// Key method advertised in the auth exchange.
pub const KEY_METHOD: u8 = 2;

/// Pre-master secret size (client only).
pub const PRE_MASTER_SIZE: usize = 48;

/// Size of each of the two random blobs.
pub const RANDOM_SIZE: usize = 32;

/// Size of the derived key block (two directions of cipher + hmac keys).
pub const KEY_MATERIAL_SIZE: usize = 256;

/// Size of each cipher or hmac slot inside the key block.
pub const KEY_SLOT_SIZE: usize = 64;

/// PRF label for the master secret.
pub const PRF_MASTER_LABEL: &[u8] = b"OpenVPN master secret";

/// PRF label for the key expansion.
pub const PRF_EXPANSION_LABEL: &[u8] = b"OpenVPN key expansion";

/// TLS keying material exporter label.
pub const EKM_LABEL: &str = "EXPORTER-OpenVPN-datakeys";

/// `IV_PROTO` bit: client understands `DATA_V2`.
pub const IV_PROTO_DATA_V2: u32 = 1 << 1;

/// `IV_PROTO` bit: client supports TLS keying material export.
pub const IV_PROTO_TLS_KEY_EXPORT: u32 = 1 << 3;

/// Version string reported in peer info.
pub const PEER_INFO_VERSION: &str = "2.6.0";

// =============================================================================
// CONTROL MESSAGES
// =============================================================================

/// Client request for pushed options.
pub const PUSH_REQUEST: &str = "PUSH_REQUEST";

/// Prefix of the server's pushed options.
pub const PUSH_REPLY_PREFIX: &str = "PUSH_REPLY";

/// Prefix of an authentication failure notice.
pub const AUTH_FAILED_PREFIX: &str = "AUTH_FAILED";

/// Push option announcing more push reply parts follow.
pub const PUSH_CONTINUATION_MORE: &str = "push-continuation 2";

// =============================================================================
// DATA CHANNEL
// =============================================================================

/// OpenVPN keepalive payload exchanged over the data channel.
pub const PING_MAGIC: [u8; 16] = [
    0x2a, 0x18, 0x7b, 0xf3, 0x64, 0x1e, 0xb4, 0xcb, 0x07, 0xed, 0x2d, 0x0a, 0x98, 0x1f, 0xc7, 0x48,
];

/// AEAD tag size (GCM and Poly1305).
pub const AEAD_TAG_SIZE: usize = 16;

/// AEAD nonce size.
pub const AEAD_NONCE_SIZE: usize = 12;

/// Implicit IV bytes appended to the packet id to form the AEAD nonce.
pub const AEAD_IMPLICIT_IV_SIZE: usize = AEAD_NONCE_SIZE - PACKET_ID_SIZE;

/// AES block and CBC IV size.
pub const CBC_IV_SIZE: usize = 16;

/// Replay window width in packets.
pub const REPLAY_WINDOW_SIZE: usize = 128;

/// Last usable outbound data packet id before the key must be replaced.
pub const MAX_DATA_PACKET_ID: u32 = u32::MAX - 1;

// =============================================================================
// TIMING
// =============================================================================

/// Handshake window when the profile does not set `hand-window`.
pub const DEFAULT_NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(60);

/// How often the session timer fires.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(250);

/// How long a superseded key keeps decrypting late packets.
pub const DEFAULT_LAME_DUCK: Duration = Duration::from_secs(60);

/// Interval between repeated `PUSH_REQUEST` messages.
pub const DEFAULT_PUSH_REQUEST_INTERVAL: Duration = Duration::from_secs(2);
