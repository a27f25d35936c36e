// sipflow - SIP transport and transaction engine
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! TCP accept and read loops, message dispatch, and the TCP transaction
//! workers.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use sipflow_core::{LineReader, Message};
use sipflow_transport::{Conn, TcpConn};

use crate::request::{Request, Response};
use crate::server::Server;
use crate::transaction::Transaction;

/// Accepts inbound connections until shutdown, registering each and
/// spawning its read task.
pub(crate) async fn accept_task(server: Server, listener: TcpListener) {
    debug!("tcp accept task start");
    loop {
        let (stream, peer) = tokio::select! {
            _ = server.inner.shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!(%e, "tcp accept error");
                    continue;
                }
            },
        };
        let (conn, read_half) = TcpConn::new(stream, peer, server.inner.cfg.write_timeout);
        server.inner.tcp_conns.insert(conn.key(), conn.clone());
        server.spawn(read_task(server.clone(), conn, read_half));
    }
    debug!("tcp accept task end");
}

/// Reads messages off one connection serially, each under the read
/// deadline. Any parse error, timeout, or close tears the connection
/// down.
pub(crate) async fn read_task(server: Server, conn: Arc<TcpConn>, read_half: OwnedReadHalf) {
    let peer = conn.remote_addr_string().to_string();
    debug!(%peer, "tcp read task start");
    let mut reader = LineReader::new(read_half, server.inner.cfg.message_len);
    let closed = conn.shutdown_token();
    loop {
        let mut msg = Message::default();
        let parse = tokio::time::timeout(
            server.inner.cfg.read_timeout,
            msg.parse_from(&mut reader, server.inner.cfg.message_len),
        );
        let parsed = tokio::select! {
            _ = closed.cancelled() => break,
            result = parse => result,
        };
        match parsed {
            Ok(Ok(())) => handle_message(&server, &Conn::Tcp(conn.clone()), msg),
            Ok(Err(e)) => {
                if !e.is_eof() {
                    error!(%peer, %e, "tcp read error");
                }
                break;
            }
            Err(_) => {
                debug!(%peer, "tcp read timeout");
                break;
            }
        }
    }
    server.remove_tcp_conn(&conn);
    debug!(%peer, "tcp read task end");
}

/// Routes one parsed message into the TCP transaction table. Only the
/// dispatch-flag winner spawns a handler worker; duplicates are dropped.
pub(crate) fn handle_message(server: &Server, conn: &Conn, mut msg: Message) {
    if msg.is_request() {
        let (t, _) = server.inner.tcp_txs.get_or_create(&mut msg);
        if t.claim_request() {
            t.retain();
            server.spawn(request_worker(server.clone(), t, conn.clone(), msg));
        }
    } else if let Some(t) = server.inner.tcp_txs.get(&mut msg) {
        // Provisional responses never advance a TCP transaction.
        if msg.status().starts_with('1') {
            return;
        }
        if t.claim_response() {
            t.retain();
            server.spawn(response_worker(server.clone(), t, conn.clone(), msg));
        }
    }
}

async fn request_worker(server: Server, t: Arc<Transaction>, conn: Conn, msg: Message) {
    let request = Request {
        message: msg,
        conn,
        tx: t.clone(),
        server: server.clone(),
    };
    server.inner.handler.handle_request(request).await;
    t.finish_request();
    server.inner.tcp_txs.remove(&t);
}

async fn response_worker(server: Server, t: Arc<Transaction>, conn: Conn, msg: Message) {
    // Wake any cleanup task waiting on this transaction first.
    t.quit_token().cancel();
    let response = Response { message: msg, conn };
    server.inner.handler.handle_response(response).await;
    t.finish_response();
    server.inner.tcp_txs.remove(&t);
}

/// Tears down an outbound transaction when the caller's context ends or
/// a response has been handled.
pub(crate) async fn outbound_cleanup(server: Server, t: Arc<Transaction>, ctx: CancellationToken) {
    let quit = t.quit_token();
    tokio::select! {
        _ = ctx.cancelled() => {}
        _ = quit.cancelled() => {}
        _ = server.inner.shutdown.cancelled() => {}
    }
    server.inner.tcp_txs.remove(&t);
}

/// Tears down an outbound transaction after `timeout` at the latest.
pub(crate) async fn outbound_deadline(server: Server, t: Arc<Transaction>, timeout: Duration) {
    let quit = t.quit_token();
    tokio::select! {
        _ = tokio::time::sleep(timeout) => {
            debug!(key = %t.key(), "transaction deadline");
        }
        _ = quit.cancelled() => {}
        _ = server.inner.shutdown.cancelled() => {}
    }
    server.inner.tcp_txs.remove(&t);
}
