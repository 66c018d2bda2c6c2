//! Control channel reliability layer.
//!
//! - [`ControlChannel`]: per-epoch packet ids, acks, reordering
//! - [`AckTracker`]: retransmission with RTO backoff
//! - [`ControlCodec`]: wire encoding with optional [`TlsAuth`] or [`TlsCrypt`]

mod ack;
mod channel;
mod codec;
mod tls_auth;
mod tls_crypt;

pub use ack::{AckTracker, PendingAck, RetransmitSettings};
pub use channel::ControlChannel;
pub use codec::ControlCodec;
pub use tls_auth::TlsAuth;
pub use tls_crypt::TlsCrypt;
