//! Error types for the OpenVPN session engine.

use std::io;

use thiserror::Error;

/// Errors raised while parsing a configuration profile.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParserError {
    /// No line matched a known directive.
    #[error("not an OpenVPN configuration")]
    InvalidFormat,

    /// An encrypted private key was found and no usable passphrase was given.
    #[error("encryption passphrase required")]
    EncryptionPassphrase,

    /// The private key could not be decrypted for a reason other than the passphrase.
    #[error("unable to decrypt private key: {0}")]
    UnableToDecrypt(String),

    /// A directive was recognized but its arguments are invalid.
    #[error("malformed option '{option}': {reason}")]
    MalformedOption {
        /// Directive name.
        option: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A client profile lacks a mandatory setting.
    #[error("missing configuration: {0}")]
    MissingConfiguration(&'static str),
}

impl ParserError {
    pub(crate) fn malformed(option: &str, reason: impl Into<String>) -> Self {
        Self::MalformedOption {
            option: option.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors decoding a single frame. These never abort a read loop.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Zero-length frame.
    #[error("missing opcode")]
    Empty,

    /// Opcode outside the supported catalog.
    #[error("unknown code: {0}")]
    UnknownCode(u8),

    /// Frame shorter than its fixed fields.
    #[error("truncated packet: expected at least {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes required.
        expected: usize,
        /// Bytes present.
        actual: usize,
    },

    /// A data frame was handed to the control codec or vice versa.
    #[error("wrong packet class for code {0:?}")]
    WrongClass(crate::packet::PacketCode),

    /// Ack block larger than the protocol allows.
    #[error("too many acks: {0}")]
    TooManyAcks(usize),

    /// tls-auth HMAC did not verify.
    #[error("control packet authentication failed")]
    AuthenticationFailed,

    /// Packet fields with no lossless wire form.
    #[error("unencodable control packet: {0}")]
    Unencodable(&'static str),
}

/// Errors in the data channel and key derivation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Cipher or digest the engine has no implementation for.
    #[error("unsupported algorithm: {0}")]
    Unsupported(String),

    /// Key or IV of the wrong length.
    #[error("invalid key length")]
    InvalidKeyLength,

    /// Encryption failed.
    #[error("encryption failed")]
    EncryptionFailed,

    /// Decryption or tag verification failed.
    #[error("decryption failed")]
    DecryptionFailed,

    /// HMAC of a CBC packet did not verify.
    #[error("HMAC mismatch")]
    HmacMismatch,

    /// Packet id already seen or below the replay window.
    #[error("replayed packet id {0}")]
    ReplayDetected(u32),

    /// Outbound packet ids exhausted for this key.
    #[error("packet id space exhausted")]
    PacketIdExhausted,

    /// Ciphertext shorter than the cipher's fixed overhead.
    #[error("ciphertext too short")]
    Truncated,

    /// Payload was compressed by the peer and no decompressor is available.
    #[error("compressed payload not supported")]
    CompressedPayload,
}

/// Failure reported by the secure channel (TLS) collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("TLS error: {0}")]
pub struct TlsError(pub String);

/// Terminal errors of a session. Any of these stops the session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A hard reset arrived from the server while already negotiated.
    #[error("stale session")]
    StaleSession,

    /// A control packet arrived that the negotiator cannot accept in its state.
    #[error("unexpected {code:?} packet in state {state}")]
    UnexpectedPacket {
        /// Offending opcode.
        code: crate::packet::PacketCode,
        /// Negotiator state at the time.
        state: &'static str,
    },

    /// Negotiation or renegotiation did not complete in time.
    #[error("negotiation timeout")]
    NegotiationTimeout,

    /// Nothing was received within the ping-restart interval.
    #[error("ping timeout")]
    PingTimeout,

    /// The link reported a read or write failure.
    #[error("link failure: {0}")]
    LinkFailure(#[source] io::Error),

    /// The tunnel reported a read or write failure.
    #[error("tunnel failure: {0}")]
    TunnelFailure(#[source] io::Error),

    /// The server rejected the credentials.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The server asked the client to restart or halt.
    #[error("server shutdown: {0}")]
    ServerShutdown(String),

    /// The server's key method message is malformed.
    #[error("bad key method message")]
    BadKeyMethod,

    /// The server's pushed options could not be parsed.
    #[error("bad push reply: {0}")]
    BadPushReply(#[source] ParserError),

    /// Secure channel failure.
    #[error(transparent)]
    Tls(#[from] TlsError),

    /// Key derivation or data channel setup failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// An outbound control packet could not be encoded.
    #[error("control packet encoding failed: {0}")]
    Encoding(#[from] PacketError),

    /// The configuration asks for something the engine cannot do.
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// `start` was called twice.
    #[error("session already started")]
    AlreadyStarted,

    /// Internal invariant broken.
    #[error("assertion failed: {0}")]
    Assertion(&'static str),
}

impl SessionError {
    /// Whether reconnecting with the same configuration may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::StaleSession
                | Self::NegotiationTimeout
                | Self::PingTimeout
                | Self::LinkFailure(_)
                | Self::ServerShutdown(_)
        )
    }

    /// Stable short code for diagnostics.
    pub fn code(&self) -> &'static str {
        match self {
            Self::StaleSession => "staleSession",
            Self::UnexpectedPacket { .. } => "unexpectedPacket",
            Self::NegotiationTimeout => "negotiationTimeout",
            Self::PingTimeout => "pingTimeout",
            Self::LinkFailure(_) => "linkFailure",
            Self::TunnelFailure(_) => "tunnelFailure",
            Self::AuthFailed(_) => "authFailed",
            Self::ServerShutdown(_) => "serverShutdown",
            Self::BadKeyMethod => "badKeyMethod",
            Self::BadPushReply(_) => "badPushReply",
            Self::Tls(_) => "tls",
            Self::Crypto(_) => "crypto",
            Self::Encoding(_) => "encoding",
            Self::UnsupportedConfiguration(_) => "unsupportedConfiguration",
            Self::AlreadyStarted => "alreadyStarted",
            Self::Assertion(_) => "assertion",
        }
    }
}

/// Top-level errors.
#[derive(Debug, Error)]
pub enum OpenVpnError {
    /// Parser error.
    #[error("parser error: {0}")]
    Parser(#[from] ParserError),

    /// Packet error.
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    /// Crypto error.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Session error.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}
