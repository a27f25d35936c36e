// sipflow - SIP transport and transaction engine
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! UDP read workers, message dispatch, and the retransmitting UDP
//! transaction workers.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use sipflow_core::{LineReader, Message};
use sipflow_transport::{Conn, Datagram, UdpConn};

use crate::request::{Request, Response};
use crate::server::Server;
use crate::transaction::Transaction;
use crate::{Error, Result};

/// One of the pooled UDP readers. Each receive fills a recycled
/// datagram, which then feeds the line reader until it is drained.
pub(crate) async fn read_task(server: Server, index: usize) {
    debug!(index, "udp read task start");
    let socket = server.inner.udp_socket.clone();
    let mut reader = LineReader::new(server.inner.datagrams.get(), server.inner.cfg.message_len);
    while server.running() {
        let mut datagram = server.inner.datagrams.get();
        let received = tokio::select! {
            _ = server.inner.shutdown.cancelled() => {
                server.inner.datagrams.put(datagram);
                break;
            }
            received = socket.recv_from(datagram.buf_mut()) => received,
        };
        match received {
            Ok((len, peer)) => {
                datagram.fill(len, peer);
                let drained = reader.reset(datagram);
                server.inner.datagrams.put(drained);
                handle_datagram(&server, &mut reader).await;
            }
            Err(e) => {
                error!(%e, "udp recv error");
                server.inner.datagrams.put(datagram);
            }
        }
    }
    debug!(index, "udp read task end");
}

/// Parses every message packed into the current datagram, dispatching
/// each in arrival order.
async fn handle_datagram(server: &Server, reader: &mut LineReader<Datagram>) {
    let peer = reader.source().peer();
    let conn = UdpConn::new(server.inner.udp_socket.clone(), peer);
    while server.running() {
        let mut msg = Message::default();
        match msg.parse_from(reader, server.inner.cfg.message_len).await {
            Ok(()) => handle_message(server, &Conn::Udp(conn.clone()), msg),
            Err(e) => {
                if !e.is_eof() {
                    error!(%peer, %e, "udp parse error");
                }
                return;
            }
        }
    }
}

/// Routes one parsed message into the UDP transaction table. Unlike the
/// TCP path every response proceeds, provisional or not, because any
/// response must stop an outbound retransmit loop.
pub(crate) fn handle_message(server: &Server, conn: &Conn, mut msg: Message) {
    if msg.is_request() {
        let (t, _) = server.inner.udp_txs.get_or_create(&mut msg);
        if t.claim_request() {
            t.retain();
            server.spawn(request_worker(server.clone(), t, conn.clone(), msg));
        }
    } else if let Some(t) = server.inner.udp_txs.get(&mut msg) {
        if t.claim_response() {
            t.retain();
            server.spawn(response_worker(server.clone(), t, conn.clone(), msg));
        }
    }
}

async fn request_worker(server: Server, t: Arc<Transaction>, conn: Conn, msg: Message) {
    let request = Request {
        message: msg,
        conn: conn.clone(),
        tx: t.clone(),
        server: server.clone(),
    };
    server.inner.handler.handle_request(request).await;
    // A response the handler wrote is resent until the deadline, so
    // retransmitted requests keep getting answered.
    if t.has_write_data() {
        if let Err(e) = retransmit_loop(&server, &t, &conn, None).await {
            log_loop_exit(&t, &e);
        }
    }
    t.finish_request();
    server.inner.udp_txs.remove(&t);
}

async fn response_worker(server: Server, t: Arc<Transaction>, conn: Conn, msg: Message) {
    // Stop the outbound retransmit loop before anything else.
    t.quit_token().cancel();
    let response = Response { message: msg, conn };
    server.inner.handler.handle_response(response).await;
    t.finish_response();
    // The caller's context governs how long the transaction outlives the
    // response; with no context it goes right away.
    if let Some(ctx) = t.ctx() {
        tokio::select! {
            _ = ctx.cancelled() => {}
            _ = server.inner.shutdown.cancelled() => {}
        }
    }
    server.inner.udp_txs.remove(&t);
}

/// Drives an outbound request: resend until a response arrives, the
/// context ends, or the deadline passes.
pub(crate) async fn outbound_worker(
    server: Server,
    t: Arc<Transaction>,
    conn: Conn,
    ctx: CancellationToken,
) {
    if let Err(e) = retransmit_loop(&server, &t, &conn, Some(ctx)).await {
        log_loop_exit(&t, &e);
    }
    server.inner.udp_txs.remove(&t);
}

/// Sends the transaction's buffered bytes immediately and then on every
/// `rto` tick. Elapsed time follows the tick schedule, so the resend
/// landing exactly on the deadline is still issued.
async fn retransmit_loop(
    server: &Server,
    t: &Arc<Transaction>,
    conn: &Conn,
    ctx: Option<CancellationToken>,
) -> Result<()> {
    let ctx = ctx.unwrap_or_default();
    let quit = t.quit_token();
    let mut elapsed = Duration::ZERO;
    let mut delay = Duration::ZERO;
    while server.running() {
        tokio::select! {
            _ = server.inner.shutdown.cancelled() => return Err(Error::TransactionFinished),
            _ = ctx.cancelled() => return Err(Error::TransactionFinished),
            _ = quit.cancelled() => return Err(Error::TransactionFinished),
            _ = tokio::time::sleep(delay) => {
                elapsed += delay;
                if elapsed > server.inner.cfg.write_timeout {
                    return Err(Error::TransactionTimeout);
                }
                conn.write(&t.write_data_bytes()).await?;
                debug!(key = %t.key(), "retransmission");
                delay = server.inner.rto;
            }
        }
    }
    Ok(())
}

fn log_loop_exit(t: &Arc<Transaction>, e: &Error) {
    match e {
        Error::TransactionTimeout | Error::TransactionFinished => {
            debug!(key = %t.key(), %e, "retransmit loop done");
        }
        _ => error!(key = %t.key(), %e, "retransmit send failed"),
    }
}
