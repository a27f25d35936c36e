// sipflow - SIP transport and transaction engine
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Server lifecycle and the outbound request API.

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

use sipflow_core::Message;
use sipflow_transport::{Conn, ConnKey, DatagramPool, TcpConn, TransportKind, UdpConn};

use crate::config::Config;
use crate::transaction::TransactionTable;
use crate::{tcp, udp, Error, Handler, Result};

/// The dual-transport SIP server. Cheap to clone; every clone drives the
/// same engine.
#[derive(Clone)]
pub struct Server {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) cfg: Config,
    pub(crate) rto: Duration,
    pub(crate) handler: Arc<dyn Handler>,
    ok: AtomicBool,
    pub(crate) shutdown: CancellationToken,
    tasks: Mutex<JoinSet<()>>,
    pub(crate) tcp_txs: TransactionTable,
    pub(crate) udp_txs: TransactionTable,
    pub(crate) tcp_conns: DashMap<ConnKey, Arc<TcpConn>>,
    pub(crate) udp_socket: Arc<UdpSocket>,
    pub(crate) datagrams: DatagramPool,
    udp_addr: SocketAddr,
    tcp_addr: SocketAddr,
    /// Via `received` value when `addr_port` is configured.
    pub(crate) received: String,
    /// Via `rport` value when `addr_port` is configured.
    pub(crate) rport: String,
}

enum TcpCleanup {
    Ctx(CancellationToken),
    Deadline(Duration),
}

impl Server {
    /// Binds UDP and TCP on `cfg.port` and starts the read tasks: two
    /// UDP readers per core plus one TCP accept loop. A TCP bind failure
    /// tears the UDP socket down again before returning.
    pub async fn listen(cfg: Config, handler: Arc<dyn Handler>) -> Result<Server> {
        let cfg = cfg.clamped();
        let rto = cfg.rto();
        let (received, rport) = match cfg.addr_port {
            Some(public) => (public.ip().to_string(), public.port().to_string()),
            None => (String::new(), String::new()),
        };

        let bind = SocketAddr::from((Ipv4Addr::UNSPECIFIED, cfg.port));
        let udp_socket = Arc::new(UdpSocket::bind(bind).await?);
        let udp_addr = udp_socket.local_addr()?;
        let tcp_listener = match TcpListener::bind(bind).await {
            Ok(listener) => listener,
            Err(e) => {
                drop(udp_socket);
                return Err(e.into());
            }
        };
        let tcp_addr = tcp_listener.local_addr()?;

        let datagrams = DatagramPool::new(cfg.message_len, cfg.udp_queue_len);
        let server = Server {
            inner: Arc::new(Inner {
                rto,
                handler,
                ok: AtomicBool::new(true),
                shutdown: CancellationToken::new(),
                tasks: Mutex::new(JoinSet::new()),
                tcp_txs: TransactionTable::new(),
                udp_txs: TransactionTable::new(),
                tcp_conns: DashMap::new(),
                udp_socket,
                datagrams,
                udp_addr,
                tcp_addr,
                received,
                rport,
                cfg,
            }),
        };

        let readers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            * 2;
        for index in 0..readers {
            server.spawn(udp::read_task(server.clone(), index));
        }
        server.spawn(tcp::accept_task(server.clone(), tcp_listener));

        info!(udp = %udp_addr, tcp = %tcp_addr, "sip server listening");
        Ok(server)
    }

    /// Stops the server: refuses new work, closes every TCP connection
    /// and the listeners, then joins all worker tasks. A second call
    /// fails with [`Error::ServerClosed`].
    pub async fn close(&self) -> Result<()> {
        if self
            .inner
            .ok
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::ServerClosed);
        }
        self.inner.shutdown.cancel();
        for entry in self.inner.tcp_conns.iter() {
            let _ = entry.value().close();
        }
        self.inner.tcp_conns.clear();

        let mut tasks = std::mem::take(&mut *self.inner.tasks.lock());
        while tasks.join_next().await.is_some() {}
        info!("sip server closed");
        Ok(())
    }

    pub(crate) fn running(&self) -> bool {
        self.inner.ok.load(Ordering::Acquire)
    }

    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.tasks.lock().spawn(task);
    }

    /// The bound UDP address.
    pub fn udp_local_addr(&self) -> SocketAddr {
        self.inner.udp_addr
    }

    /// The bound TCP address.
    pub fn tcp_local_addr(&self) -> SocketAddr {
        self.inner.tcp_addr
    }

    /// Transactions currently live across both transports.
    pub fn pending_transactions(&self) -> usize {
        self.inner.tcp_txs.len() + self.inner.udp_txs.len()
    }

    /// Sends a new transaction request to `addr`. For TCP an existing
    /// connection is reused or a new one dialed; for UDP a virtual
    /// connection over the shared socket is built on the fly. `ctx`
    /// bounds the dial and, once the request is out, governs when the
    /// transaction is torn down.
    pub async fn send_request(
        &self,
        ctx: CancellationToken,
        transport: TransportKind,
        addr: SocketAddr,
        msg: &mut Message,
    ) -> Result<()> {
        if !self.running() {
            return Err(Error::ServerClosed);
        }
        match transport {
            TransportKind::Tcp => {
                let conn = self.get_tcp_conn(&ctx, addr).await?;
                self.send_tcp(Conn::Tcp(conn), msg, TcpCleanup::Ctx(ctx)).await
            }
            TransportKind::Udp => {
                let conn = UdpConn::new(self.inner.udp_socket.clone(), addr);
                self.send_udp(Conn::Udp(conn), msg, ctx).await
            }
        }
    }

    /// Like [`Server::send_request`] with a fresh deadline instead of a
    /// caller context. A zero `timeout` falls back to the write timeout.
    pub async fn send_request_timeout(
        &self,
        transport: TransportKind,
        addr: SocketAddr,
        msg: &mut Message,
        timeout: Duration,
    ) -> Result<()> {
        if !self.running() {
            return Err(Error::ServerClosed);
        }
        let timeout = if timeout.is_zero() {
            self.inner.cfg.write_timeout
        } else {
            timeout
        };
        match transport {
            TransportKind::Tcp => {
                let dial_ctx = deadline_token(timeout);
                let conn = self.get_tcp_conn(&dial_ctx, addr).await?;
                self.send_tcp(Conn::Tcp(conn), msg, TcpCleanup::Deadline(timeout))
                    .await
            }
            TransportKind::Udp => {
                let conn = UdpConn::new(self.inner.udp_socket.clone(), addr);
                self.send_udp(Conn::Udp(conn), msg, deadline_token(timeout)).await
            }
        }
    }

    /// Sends a new transaction request over an existing connection,
    /// skipping the connection-table lookup.
    pub async fn send_request_with_conn(
        &self,
        ctx: CancellationToken,
        conn: &Conn,
        msg: &mut Message,
    ) -> Result<()> {
        if !self.running() {
            return Err(Error::ServerClosed);
        }
        if conn.is_udp() {
            self.send_udp(conn.clone(), msg, ctx).await
        } else {
            self.send_tcp(conn.clone(), msg, TcpCleanup::Ctx(ctx)).await
        }
    }

    /// Like [`Server::send_request_with_conn`] with a fresh deadline.
    pub async fn send_request_with_conn_timeout(
        &self,
        conn: &Conn,
        msg: &mut Message,
        timeout: Duration,
    ) -> Result<()> {
        if !self.running() {
            return Err(Error::ServerClosed);
        }
        let timeout = if timeout.is_zero() {
            self.inner.cfg.write_timeout
        } else {
            timeout
        };
        if conn.is_udp() {
            self.send_udp(conn.clone(), msg, deadline_token(timeout)).await
        } else {
            self.send_tcp(conn.clone(), msg, TcpCleanup::Deadline(timeout))
                .await
        }
    }

    async fn send_tcp(&self, conn: Conn, msg: &mut Message, cleanup: TcpCleanup) -> Result<()> {
        let (t, created) = self.inner.tcp_txs.get_or_create(msg);
        if !created {
            return Err(Error::TransactionExists);
        }
        if let TcpCleanup::Ctx(ctx) = &cleanup {
            t.set_ctx(Some(ctx.clone()));
        }
        t.retain();
        if let Err(e) = t.write_message(&conn, msg).await {
            self.inner.tcp_txs.remove(&t);
            return Err(e);
        }
        let server = self.clone();
        match cleanup {
            TcpCleanup::Ctx(ctx) => self.spawn(tcp::outbound_cleanup(server, t, ctx)),
            TcpCleanup::Deadline(timeout) => {
                self.spawn(tcp::outbound_deadline(server, t, timeout))
            }
        }
        Ok(())
    }

    async fn send_udp(&self, conn: Conn, msg: &mut Message, ctx: CancellationToken) -> Result<()> {
        let (t, created) = self.inner.udp_txs.get_or_create(msg);
        if !created {
            return Err(Error::TransactionExists);
        }
        t.set_ctx(Some(ctx.clone()));
        t.retain();
        if let Err(e) = t.write_message(&conn, msg).await {
            self.inner.udp_txs.remove(&t);
            return Err(e);
        }
        let server = self.clone();
        self.spawn(udp::outbound_worker(server, t, conn, ctx));
        Ok(())
    }

    /// Returns the connection to `addr`, dialing when absent. Concurrent
    /// callers may dial in parallel; the double-checked insert keeps one
    /// winner and the losers close their duplicate.
    pub(crate) async fn get_tcp_conn(
        &self,
        ctx: &CancellationToken,
        addr: SocketAddr,
    ) -> Result<Arc<TcpConn>> {
        let key = ConnKey::new(&addr);
        if let Some(conn) = self.inner.tcp_conns.get(&key) {
            return Ok(conn.clone());
        }
        let stream = tokio::select! {
            _ = ctx.cancelled() => {
                return Err(Error::Io(std::io::ErrorKind::TimedOut.into()));
            }
            connected = TcpStream::connect(addr) => connected?,
        };
        let (conn, read_half) = TcpConn::new(stream, addr, self.inner.cfg.write_timeout);
        match self.inner.tcp_conns.entry(key) {
            Entry::Occupied(entry) => {
                let existing = entry.get().clone();
                drop(entry);
                let _ = conn.close();
                Ok(existing)
            }
            Entry::Vacant(entry) => {
                entry.insert(conn.clone());
                self.spawn(tcp::read_task(self.clone(), conn.clone(), read_half));
                Ok(conn)
            }
        }
    }

    /// Drops the connection from the table and closes it.
    pub(crate) fn remove_tcp_conn(&self, conn: &Arc<TcpConn>) {
        self.inner
            .tcp_conns
            .remove_if(&conn.key(), |_, live| Arc::ptr_eq(live, conn));
        let _ = conn.close();
    }
}

/// A token that cancels itself after `timeout`.
fn deadline_token(timeout: Duration) -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        cancel.cancel();
    });
    token
}
