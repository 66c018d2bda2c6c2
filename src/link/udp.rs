//! tokio UDP implementation of [`Link`].

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::trace;

use crate::core::Link;

/// Default receive buffer size.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 65535;

/// Default number of datagrams gathered into one read batch.
pub const DEFAULT_MAX_BATCH: usize = 32;

/// Connected UDP socket carrying one OpenVPN packet per datagram.
///
/// A read waits for one datagram, then drains whatever else is already
/// queued on the socket, up to the batch limit.
#[derive(Debug, Clone)]
pub struct UdpLink {
    socket: Arc<UdpSocket>,
    recv_buffer_size: usize,
    max_batch: usize,
}

impl UdpLink {
    /// Bind an ephemeral local port and connect it to `remote`.
    pub async fn connect(remote: SocketAddr) -> io::Result<Self> {
        UdpLinkBuilder::new().connect(remote).await
    }

    /// Wrap a socket that is already connected.
    pub fn from_socket(socket: UdpSocket) -> Self {
        UdpLinkBuilder::new().from_socket(socket)
    }

    /// Local address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Server address.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.socket.peer_addr()
    }
}

#[async_trait]
impl Link for UdpLink {
    async fn read_packets(&self) -> io::Result<Vec<Vec<u8>>> {
        let mut buf = vec![0u8; self.recv_buffer_size];
        let len = self.socket.recv(&mut buf).await?;
        let mut packets = vec![buf[..len].to_vec()];
        while packets.len() < self.max_batch {
            match self.socket.try_recv(&mut buf) {
                Ok(len) => packets.push(buf[..len].to_vec()),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        trace!(count = packets.len(), "udp batch received");
        Ok(packets)
    }

    async fn write_packets(&self, packets: Vec<Vec<u8>>) -> io::Result<()> {
        for packet in packets {
            self.socket.send(&packet).await?;
        }
        Ok(())
    }
}

/// Builder for [`UdpLink`] with custom buffer sizes.
#[derive(Debug, Clone)]
pub struct UdpLinkBuilder {
    recv_buffer_size: usize,
    max_batch: usize,
}

impl Default for UdpLinkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl UdpLinkBuilder {
    /// Create a builder with default options.
    pub fn new() -> Self {
        Self {
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            max_batch: DEFAULT_MAX_BATCH,
        }
    }

    /// Set the receive buffer size.
    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size;
        self
    }

    /// Set the read batch limit. At least one datagram is always read.
    pub fn max_batch(mut self, count: usize) -> Self {
        self.max_batch = count.max(1);
        self
    }

    /// Bind an ephemeral port of the remote's family and connect.
    pub async fn connect(self, remote: SocketAddr) -> io::Result<UdpLink> {
        let local: SocketAddr = match remote {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(remote).await?;
        Ok(self.from_socket(socket))
    }

    /// Wrap a connected socket.
    pub fn from_socket(self, socket: UdpSocket) -> UdpLink {
        UdpLink {
            socket: Arc::new(socket),
            recv_buffer_size: self.recv_buffer_size,
            max_batch: self.max_batch,
        }
    }
}
