// sipflow - SIP transport and transaction engine
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end tests over loopback sockets.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use smol_str::SmolStr;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use sipflow_core::{status, LineReader, Message, Via};
use sipflow_engine::{Config, Error, Handler, Request, Response, Server, TransportKind};

fn test_config(write_timeout: Duration) -> Config {
    Config {
        port: 0,
        write_timeout,
        ..Config::default()
    }
}

fn build_request(method: &str, call_id: &str, branch: &str) -> Message {
    let mut msg = Message::default();
    msg.init_request_line(method, "sip:bob@example.com");
    let mut via = Via::new("UDP", "127.0.0.1");
    via.branch = SmolStr::new(branch);
    msg.header.via.push(via);
    msg.header.from.parse("<sip:alice@example.com>;tag=a1").unwrap();
    msg.header.to.parse("<sip:bob@example.com>").unwrap();
    msg.header.call_id = SmolStr::new(call_id);
    msg.header.cseq.parse(&format!("1 {method}")).unwrap();
    msg
}

fn raw_request(call_id: &str, branch: &str) -> String {
    format!(
        "MESSAGE sip:bob@example.com SIP/2.0\r\n\
         Via: SIP/2.0/UDP 127.0.0.1;rport;branch={branch}\r\n\
         From: <sip:alice@example.com>;tag=a1\r\n\
         To: <sip:bob@example.com>\r\n\
         Call-ID: {call_id}\r\n\
         CSeq: 1 MESSAGE\r\n\
         Content-Length: 0\r\n\r\n"
    )
}

fn raw_response(status_code: &str, phrase: &str, call_id: &str, branch: &str) -> String {
    format!(
        "SIP/2.0 {status_code} {phrase}\r\n\
         Via: SIP/2.0/UDP 127.0.0.1;branch={branch}\r\n\
         From: <sip:alice@example.com>;tag=a1\r\n\
         To: <sip:bob@example.com>;tag=b1\r\n\
         Call-ID: {call_id}\r\n\
         CSeq: 1 MESSAGE\r\n\
         Content-Length: 0\r\n\r\n"
    )
}

async fn parse_bytes(raw: &[u8]) -> Message {
    let mut msg = Message::default();
    let mut reader = LineReader::new(raw, 0);
    msg.parse_from(&mut reader, 65_000).await.unwrap();
    msg
}

/// Answers every request with 200 OK and reports its Call-ID.
struct Answer {
    seen: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Handler for Answer {
    async fn handle_request(&self, mut request: Request) {
        let _ = self.seen.send(request.message.header.call_id.to_string());
        request.respond(status::OK, "").await.unwrap();
    }

    async fn handle_response(&self, _response: Response) {}
}

/// Records requests without answering them.
struct Record {
    seen: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Handler for Record {
    async fn handle_request(&self, request: Request) {
        let _ = self.seen.send(request.message.header.call_id.to_string());
    }

    async fn handle_response(&self, _response: Response) {}
}

/// Counts request dispatches, holding the handler open briefly so
/// retransmits overlap it.
struct SlowCounter {
    count: Arc<AtomicUsize>,
}

#[async_trait]
impl Handler for SlowCounter {
    async fn handle_request(&self, mut request: Request) {
        self.count.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(150)).await;
        request.respond(status::OK, "").await.unwrap();
    }

    async fn handle_response(&self, _response: Response) {}
}

/// Forwards response status tokens to a channel.
struct CollectResponses {
    seen: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Handler for CollectResponses {
    async fn handle_request(&self, _request: Request) {}

    async fn handle_response(&self, response: Response) {
        let _ = self.seen.send(response.message.status().to_string());
    }
}

/// Sends a provisional response followed by a final one.
struct RingThenAnswer;

#[async_trait]
impl Handler for RingThenAnswer {
    async fn handle_request(&self, mut request: Request) {
        request.respond(status::RINGING, "").await.unwrap();
        request.respond(status::OK, "").await.unwrap();
    }

    async fn handle_response(&self, _response: Response) {}
}

#[tokio::test]
async fn udp_request_is_answered_with_rport_stamping() {
    let (seen_tx, mut seen) = mpsc::unbounded_channel();
    let server = Server::listen(
        test_config(Duration::from_millis(600)),
        Arc::new(Answer { seen: seen_tx }),
    )
    .await
    .unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let client_port = client.local_addr().unwrap().port();
    client
        .send_to(
            raw_request("call-rport", "z9hG4bK-rport").as_bytes(),
            server.udp_local_addr(),
        )
        .await
        .unwrap();

    let mut buf = vec![0u8; 2048];
    let (n, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let response = parse_bytes(&buf[..n]).await;

    assert!(!response.is_request());
    assert_eq!(response.status(), "200");
    assert_eq!(response.phrase(), "OK");
    let via = &response.header.via[0];
    assert_eq!(via.received.as_deref(), Some("127.0.0.1"));
    assert_eq!(via.rport.as_deref(), Some(client_port.to_string().as_str()));
    assert!(!response.header.to.tag.is_empty());
    assert_eq!(response.header.user_agent, "sipflow");
    assert_eq!(seen.recv().await.unwrap(), "call-rport");

    server.close().await.unwrap();
}

#[tokio::test]
async fn identical_retransmits_dispatch_once() {
    let count = Arc::new(AtomicUsize::new(0));
    let server = Server::listen(
        test_config(Duration::from_millis(600)),
        Arc::new(SlowCounter {
            count: count.clone(),
        }),
    )
    .await
    .unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let raw = raw_request("call-dup", "z9hG4bK-dup");
    for _ in 0..5 {
        client
            .send_to(raw.as_bytes(), server.udp_local_addr())
            .await
            .unwrap();
    }

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    server.close().await.unwrap();
}

#[tokio::test]
async fn two_messages_in_one_datagram_dispatch_twice() {
    let (seen_tx, mut seen) = mpsc::unbounded_channel();
    let server = Server::listen(
        test_config(Duration::from_millis(600)),
        Arc::new(Record { seen: seen_tx }),
    )
    .await
    .unwrap();

    let packed = format!(
        "{}{}",
        raw_request("call-first", "z9hG4bK-p1"),
        raw_request("call-second", "z9hG4bK-p2")
    );
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client
        .send_to(packed.as_bytes(), server.udp_local_addr())
        .await
        .unwrap();

    let mut got = Vec::new();
    for _ in 0..2 {
        let call_id = tokio::time::timeout(Duration::from_secs(2), seen.recv())
            .await
            .unwrap()
            .unwrap();
        got.push(call_id);
    }
    got.sort();
    assert_eq!(got, vec!["call-first", "call-second"]);

    server.close().await.unwrap();
}

#[tokio::test]
async fn udp_retransmission_cadence() {
    let server = Server::listen(
        test_config(Duration::from_secs(1)),
        Arc::new(Record {
            seen: mpsc::unbounded_channel().0,
        }),
    )
    .await
    .unwrap();

    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer_addr = peer.local_addr().unwrap();

    let mut msg = build_request("MESSAGE", "call-cadence", "z9hG4bK-cadence");
    server
        .send_request(
            CancellationToken::new(),
            TransportKind::Udp,
            peer_addr,
            &mut msg,
        )
        .await
        .unwrap();

    let mut sends = 0;
    let mut buf = vec![0u8; 2048];
    let deadline = Instant::now() + Duration::from_millis(1800);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, peer.recv_from(&mut buf)).await {
            Ok(Ok(_)) => sends += 1,
            _ => break,
        }
    }
    assert!((4..=6).contains(&sends), "saw {sends} sends");
    assert_eq!(server.pending_transactions(), 0);

    server.close().await.unwrap();
}

#[tokio::test]
async fn response_stops_retransmission_early() {
    let (seen_tx, mut seen) = mpsc::unbounded_channel();
    let server = Server::listen(
        test_config(Duration::from_secs(2)),
        Arc::new(CollectResponses { seen: seen_tx }),
    )
    .await
    .unwrap();

    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer_addr = peer.local_addr().unwrap();

    let ctx = CancellationToken::new();
    let mut msg = build_request("MESSAGE", "call-early", "z9hG4bK-early");
    server
        .send_request(ctx.clone(), TransportKind::Udp, peer_addr, &mut msg)
        .await
        .unwrap();

    // Answer the first copy with a provisional response; the UDP path
    // dispatches it anyway, which is what stops the resend loop.
    let mut buf = vec![0u8; 2048];
    let (_, engine_addr) = peer.recv_from(&mut buf).await.unwrap();
    peer.send_to(
        raw_response("100", "Trying", "call-early", "z9hG4bK-early").as_bytes(),
        engine_addr,
    )
    .await
    .unwrap();

    let status = tokio::time::timeout(Duration::from_secs(2), seen.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, "100");

    // The transaction is gone and no further copies arrive.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.pending_transactions(), 0);
    let extra = tokio::time::timeout(Duration::from_millis(1500), peer.recv_from(&mut buf)).await;
    assert!(extra.is_err(), "retransmit after response");

    ctx.cancel();
    server.close().await.unwrap();
}

#[tokio::test]
async fn transaction_times_out_without_response() {
    let server = Server::listen(
        test_config(Duration::from_millis(600)),
        Arc::new(Record {
            seen: mpsc::unbounded_channel().0,
        }),
    )
    .await
    .unwrap();

    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer_addr = peer.local_addr().unwrap();

    let mut msg = build_request("MESSAGE", "call-timeout", "z9hG4bK-timeout");
    server
        .send_request(
            CancellationToken::new(),
            TransportKind::Udp,
            peer_addr,
            &mut msg,
        )
        .await
        .unwrap();
    assert_eq!(server.pending_transactions(), 1);

    tokio::time::sleep(Duration::from_millis(550)).await;
    assert_eq!(server.pending_transactions(), 1, "removed before deadline");

    let deadline = Instant::now() + Duration::from_millis(400);
    while server.pending_transactions() > 0 {
        assert!(Instant::now() < deadline, "transaction still live");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    server.close().await.unwrap();
}

#[tokio::test]
async fn duplicate_outbound_transaction_is_rejected() {
    let server = Server::listen(
        test_config(Duration::from_secs(2)),
        Arc::new(Record {
            seen: mpsc::unbounded_channel().0,
        }),
    )
    .await
    .unwrap();
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer_addr = peer.local_addr().unwrap();

    let ctx = CancellationToken::new();
    let mut first = build_request("MESSAGE", "call-twice", "z9hG4bK-twice");
    server
        .send_request(ctx.clone(), TransportKind::Udp, peer_addr, &mut first)
        .await
        .unwrap();
    let mut second = build_request("MESSAGE", "call-twice", "z9hG4bK-twice");
    let err = server
        .send_request(ctx.clone(), TransportKind::Udp, peer_addr, &mut second)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TransactionExists));

    ctx.cancel();
    server.close().await.unwrap();
}

#[tokio::test]
async fn concurrent_tcp_sends_share_one_connection() {
    let server = Server::listen(
        test_config(Duration::from_secs(2)),
        Arc::new(Record {
            seen: mpsc::unbounded_channel().0,
        }),
    )
    .await
    .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let peer_addr = listener.local_addr().unwrap();
    let counts: Arc<parking_lot::Mutex<Vec<usize>>> =
        Arc::new(parking_lot::Mutex::new(Vec::new()));
    {
        let counts = counts.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let counts = counts.clone();
                tokio::spawn(async move {
                    let mut data = Vec::new();
                    let _ = socket.read_to_end(&mut data).await;
                    let text = String::from_utf8_lossy(&data);
                    let messages = text.matches("MESSAGE sip:").count();
                    counts.lock().push(messages);
                });
            }
        });
    }

    let ctx = CancellationToken::new();
    let mut sends = tokio::task::JoinSet::new();
    for i in 0..100 {
        let server = server.clone();
        let ctx = ctx.clone();
        sends.spawn(async move {
            let mut msg = build_request(
                "MESSAGE",
                &format!("call-conn-{i}"),
                &format!("z9hG4bK-conn-{i}"),
            );
            server
                .send_request(ctx, TransportKind::Tcp, peer_addr, &mut msg)
                .await
        });
    }
    while let Some(result) = sends.join_next().await {
        result.unwrap().unwrap();
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    ctx.cancel();
    server.close().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let counts = counts.lock();
    let live: Vec<&usize> = counts.iter().filter(|&&n| n > 0).collect();
    assert_eq!(live.len(), 1, "messages spread over {counts:?}");
    assert_eq!(*live[0], 100);
}

#[tokio::test]
async fn tcp_round_trip_filters_provisional_responses() {
    let uas = Server::listen(
        test_config(Duration::from_secs(2)),
        Arc::new(RingThenAnswer),
    )
    .await
    .unwrap();

    let (seen_tx, mut seen) = mpsc::unbounded_channel();
    let uac = Server::listen(
        test_config(Duration::from_secs(2)),
        Arc::new(CollectResponses { seen: seen_tx }),
    )
    .await
    .unwrap();

    let ctx = CancellationToken::new();
    let mut msg = build_request("MESSAGE", "call-tcp", "z9hG4bK-tcp");
    uac.send_request(
        ctx.clone(),
        TransportKind::Tcp,
        uas.tcp_local_addr(),
        &mut msg,
    )
    .await
    .unwrap();

    let status = tokio::time::timeout(Duration::from_secs(2), seen.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, "200", "provisional response must be filtered");
    assert!(
        tokio::time::timeout(Duration::from_millis(300), seen.recv())
            .await
            .is_err(),
        "only one dispatch per transaction"
    );

    ctx.cancel();
    uac.close().await.unwrap();
    uas.close().await.unwrap();
}

#[tokio::test]
async fn send_request_timeout_bounds_the_transaction() {
    let server = Server::listen(
        test_config(Duration::from_secs(5)),
        Arc::new(Record {
            seen: mpsc::unbounded_channel().0,
        }),
    )
    .await
    .unwrap();
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let peer_addr = peer.local_addr().unwrap();

    let mut msg = build_request("MESSAGE", "call-deadline", "z9hG4bK-deadline");
    server
        .send_request_timeout(
            TransportKind::Udp,
            peer_addr,
            &mut msg,
            Duration::from_millis(500),
        )
        .await
        .unwrap();
    assert_eq!(server.pending_transactions(), 1);

    let deadline = Instant::now() + Duration::from_millis(1200);
    while server.pending_transactions() > 0 {
        assert!(Instant::now() < deadline, "deadline did not fire");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    server.close().await.unwrap();
}

#[tokio::test]
async fn send_apis_fail_after_close() {
    let server = Server::listen(
        test_config(Duration::from_secs(1)),
        Arc::new(Record {
            seen: mpsc::unbounded_channel().0,
        }),
    )
    .await
    .unwrap();
    server.close().await.unwrap();

    let mut msg = build_request("MESSAGE", "call-closed", "z9hG4bK-closed");
    let err = server
        .send_request(
            CancellationToken::new(),
            TransportKind::Udp,
            "127.0.0.1:5060".parse().unwrap(),
            &mut msg,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ServerClosed));
    assert!(matches!(
        server.close().await.unwrap_err(),
        Error::ServerClosed
    ));
}
