// sipflow - SIP transport and transaction engine
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{ConnKey, Error, Result};

/// One TCP connection. Owns the write half; the read half is handed to
/// the read task at construction. `close()` succeeds exactly once and
/// wakes the read task through the shutdown token.
pub struct TcpConn {
    key: ConnKey,
    writer: Mutex<OwnedWriteHalf>,
    closed: AtomicBool,
    write_timeout: Duration,
    shutdown: CancellationToken,
    peer: SocketAddr,
    remote_ip: String,
    remote_port: String,
    remote_addr: String,
}

impl TcpConn {
    /// Wraps an established stream, returning the connection and the read
    /// half for the caller's read task.
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        write_timeout: Duration,
    ) -> (Arc<TcpConn>, OwnedReadHalf) {
        let (read_half, write_half) = stream.into_split();
        let remote_ip = peer.ip().to_string();
        let remote_port = peer.port().to_string();
        let remote_addr = format!("{}:{}", remote_ip, remote_port);
        let conn = Arc::new(TcpConn {
            key: ConnKey::new(&peer),
            writer: Mutex::new(write_half),
            closed: AtomicBool::new(false),
            write_timeout,
            shutdown: CancellationToken::new(),
            peer,
            remote_ip,
            remote_port,
            remote_addr,
        });
        (conn, read_half)
    }

    pub fn key(&self) -> ConnKey {
        self.key
    }

    /// Token cancelled when the connection is closed; the read task
    /// selects on it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
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

    /// Writes the whole buffer under the per-write deadline.
    pub async fn write(&self, buf: &[u8]) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        let mut writer = self.writer.lock().await;
        match tokio::time::timeout(self.write_timeout, writer.write_all(buf)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(Error::Io(std::io::ErrorKind::TimedOut.into())),
        }
    }

    /// Marks the connection closed. Only the first call succeeds; later
    /// calls and writes get [`Error::Closed`].
    pub fn close(&self) -> Result<()> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.shutdown.cancel();
            Ok(())
        } else {
            Err(Error::Closed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn pair() -> (TcpStream, TcpStream, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, peer) = listener.accept().await.unwrap();
        (client, server, peer)
    }

    #[tokio::test]
    async fn writes_reach_the_peer() {
        let (client, mut server, peer) = pair().await;
        let (conn, _read) = TcpConn::new(client, peer, Duration::from_secs(1));
        conn.write(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn close_succeeds_exactly_once() {
        let (client, _server, peer) = pair().await;
        let (conn, _read) = TcpConn::new(client, peer, Duration::from_secs(1));
        let token = conn.shutdown_token();
        assert!(!token.is_cancelled());
        conn.close().unwrap();
        assert!(token.is_cancelled());
        assert!(matches!(conn.close(), Err(Error::Closed)));
        assert!(matches!(conn.write(b"x").await, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn precomputed_peer_strings() {
        let (client, _server, peer) = pair().await;
        let (conn, _read) = TcpConn::new(client, peer, Duration::from_secs(1));
        assert_eq!(conn.remote_ip(), peer.ip().to_string());
        assert_eq!(conn.remote_port(), peer.port().to_string());
        assert_eq!(
            conn.remote_addr_string(),
            format!("{}:{}", peer.ip(), peer.port())
        );
    }
}
