//! Network links.
//!
//! The engine only needs [`Link`](crate::core::Link). [`UdpLink`] is the
//! tokio UDP implementation used by real deployments.

#[cfg(feature = "udp")]
mod udp;

#[cfg(feature = "udp")]
pub use udp::{DEFAULT_MAX_BATCH, DEFAULT_RECV_BUFFER_SIZE, UdpLink, UdpLinkBuilder};
