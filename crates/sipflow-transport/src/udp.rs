// sipflow - SIP transport and transaction engine
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::net::UdpSocket;

use crate::Result;

/// A virtual UDP connection: the shared server socket bound to one peer
/// address. All peers share the underlying socket, so closing is a no-op
/// and writes are plain `send_to`.
#[derive(Clone)]
pub struct UdpConn {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    remote_ip: Arc<str>,
    remote_port: Arc<str>,
    remote_addr: Arc<str>,
}

impl UdpConn {
    pub fn new(socket: Arc<UdpSocket>, peer: SocketAddr) -> Self {
        let remote_ip = peer.ip().to_string();
        let remote_port = peer.port().to_string();
        let remote_addr = format!("{}:{}", remote_ip, remote_port);
        Self {
            socket,
            peer,
            remote_ip: remote_ip.into(),
            remote_port: remote_port.into(),
            remote_addr: remote_addr.into(),
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn remote_ip(&self) -> &str {
        &self.remote_ip
    }

    pub fn remote_port(&self) -> &str {
        &self.remote_port
    }

    pub fn remote_addr_string(&self) -> &str {
        &self.remote_addr
    }

    pub async fn write(&self, buf: &[u8]) -> Result<()> {
        self.socket.send_to(buf, self.peer).await?;
        Ok(())
    }
}

/// One received datagram. Implements [`AsyncRead`] over the filled
/// region so a line reader can pull several SIP messages out of a single
/// packet; reads return 0 once the region is drained.
pub struct Datagram {
    buf: Vec<u8>,
    len: usize,
    pos: usize,
    peer: SocketAddr,
}

impl Datagram {
    fn with_capacity(n: usize) -> Self {
        Self {
            buf: vec![0u8; n],
            len: 0,
            pos: 0,
            peer: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        }
    }

    /// The receive buffer for `recv_from`.
    pub fn buf_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Records the filled length and source address after a receive.
    pub fn fill(&mut self, len: usize, peer: SocketAddr) {
        self.len = len.min(self.buf.len());
        self.pos = 0;
        self.peer = peer;
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn remaining(&self) -> usize {
        self.len - self.pos
    }
}

impl AsyncRead for Datagram {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let me = self.get_mut();
        if me.pos < me.len {
            let n = buf.remaining().min(me.len - me.pos);
            buf.put_slice(&me.buf[me.pos..me.pos + n]);
            me.pos += n;
        }
        Poll::Ready(Ok(()))
    }
}

/// Free list of reusable datagram buffers, all sized to the configured
/// message length.
pub struct DatagramPool {
    free: Mutex<Vec<Datagram>>,
    buf_len: usize,
}

impl DatagramPool {
    /// Creates a pool of `buf_len`-byte datagrams with `prealloc` ready.
    pub fn new(buf_len: usize, prealloc: usize) -> Self {
        let free = (0..prealloc)
            .map(|_| Datagram::with_capacity(buf_len))
            .collect();
        Self {
            free: Mutex::new(free),
            buf_len,
        }
    }

    pub fn get(&self) -> Datagram {
        self.free
            .lock()
            .pop()
            .unwrap_or_else(|| Datagram::with_capacity(self.buf_len))
    }

    pub fn put(&self, mut datagram: Datagram) {
        datagram.len = 0;
        datagram.pos = 0;
        self.free.lock().push(datagram);
    }

    #[cfg(test)]
    fn available(&self) -> usize {
        self.free.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn datagram_reads_filled_region_then_eof() {
        let mut dg = Datagram::with_capacity(16);
        dg.buf_mut()[..5].copy_from_slice(b"hello");
        dg.fill(5, "127.0.0.1:5060".parse().unwrap());
        assert_eq!(dg.remaining(), 5);

        let mut out = [0u8; 3];
        assert_eq!(dg.read(&mut out).await.unwrap(), 3);
        assert_eq!(&out, b"hel");
        assert_eq!(dg.read(&mut out).await.unwrap(), 2);
        assert_eq!(dg.read(&mut out).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn udp_conn_sends_to_peer() {
        let server = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let peer_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer = peer_socket.local_addr().unwrap();

        let conn = UdpConn::new(server, peer);
        conn.write(b"ping").await.unwrap();

        let mut buf = [0u8; 16];
        let (n, _) = peer_socket.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(conn.remote_port(), peer.port().to_string());
    }

    #[test]
    fn pool_recycles_buffers() {
        let pool = DatagramPool::new(32, 2);
        assert_eq!(pool.available(), 2);
        let a = pool.get();
        let b = pool.get();
        let c = pool.get();
        assert_eq!(pool.available(), 0);
        pool.put(a);
        pool.put(b);
        pool.put(c);
        assert_eq!(pool.available(), 3);
        let d = pool.get();
        assert_eq!(d.remaining(), 0);
    }
}
