// sipflow - SIP transport and transaction engine
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dual-transport connection layer.
//!
//! Presents one [`Conn`] shape over both transports: a TCP connection
//! owns its stream socket, while a UDP "connection" is a lightweight
//! pairing of the server's single shared socket with a peer address.
//! Table lookups for both use [`ConnKey`], which maps IPv4 peers into the
//! IPv6 space so every address has one canonical key.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use thiserror::Error;

mod tcp;
mod udp;

pub use tcp::TcpConn;
pub use udp::{Datagram, DatagramPool, UdpConn};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The connection was closed locally; writes are refused.
    #[error("conn closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Which transport an outbound request should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Tcp,
    Udp,
}

/// Connection-table key: the peer IP split into two 64-bit halves plus
/// the port. IPv4 addresses are mapped into IPv6 so both families share
/// one shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnKey {
    ip_hi: u64,
    ip_lo: u64,
    port: u16,
}

impl ConnKey {
    pub fn new(addr: &SocketAddr) -> Self {
        let ip = match addr.ip() {
            IpAddr::V4(v4) => v4.to_ipv6_mapped(),
            IpAddr::V6(v6) => v6,
        };
        let bits = u128::from(ip);
        Self {
            ip_hi: (bits >> 64) as u64,
            ip_lo: bits as u64,
            port: addr.port(),
        }
    }
}

/// A transport-agnostic connection handle.
#[derive(Clone)]
pub enum Conn {
    Tcp(Arc<TcpConn>),
    Udp(UdpConn),
}

impl Conn {
    pub fn network(&self) -> &'static str {
        match self {
            Conn::Tcp(_) => "tcp",
            Conn::Udp(_) => "udp",
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        match self {
            Conn::Tcp(c) => c.remote_addr(),
            Conn::Udp(c) => c.remote_addr(),
        }
    }

    pub fn remote_ip(&self) -> &str {
        match self {
            Conn::Tcp(c) => c.remote_ip(),
            Conn::Udp(c) => c.remote_ip(),
        }
    }

    pub fn remote_port(&self) -> &str {
        match self {
            Conn::Tcp(c) => c.remote_port(),
            Conn::Udp(c) => c.remote_port(),
        }
    }

    /// The precomputed `ip:port` form of the peer address.
    pub fn remote_addr_string(&self) -> &str {
        match self {
            Conn::Tcp(c) => c.remote_addr_string(),
            Conn::Udp(c) => c.remote_addr_string(),
        }
    }

    pub async fn write(&self, buf: &[u8]) -> Result<()> {
        match self {
            Conn::Tcp(c) => c.write(buf).await,
            Conn::Udp(c) => c.write(buf).await,
        }
    }

    pub fn is_udp(&self) -> bool {
        matches!(self, Conn::Udp(_))
    }
}
