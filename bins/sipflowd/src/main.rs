// sipflow - SIP transport and transaction engine
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Minimal SIP daemon: listens on TCP and UDP and answers every inbound
//! request with `200 OK`. Useful for poking at the engine with sipp or
//! netcat.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use tracing::{info, warn};

use sipflow_core::status;
use sipflow_engine::{Config, Handler, Request, Response, Server};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Listening port for both TCP and UDP
    #[arg(long, default_value_t = 5060)]
    port: u16,
    /// Public ip:port stamped into Via received/rport (for NATed hosts)
    #[arg(long)]
    addr_port: Option<SocketAddr>,
    /// Per-read deadline on TCP connections, in seconds
    #[arg(long, default_value_t = 10)]
    read_timeout_secs: u64,
    /// Write deadline and transaction lifetime, in seconds
    #[arg(long, default_value_t = 10)]
    write_timeout_secs: u64,
}

struct AnswerOk;

#[async_trait]
impl Handler for AnswerOk {
    async fn handle_request(&self, mut request: Request) {
        info!(
            method = request.message.method(),
            peer = request.conn.remote_addr_string(),
            net = request.conn.network(),
            call_id = %request.message.header.call_id,
            "request"
        );
        if let Err(e) = request.respond(status::OK, "").await {
            warn!(%e, "respond failed");
        }
    }

    async fn handle_response(&self, response: Response) {
        info!(
            status = response.message.status(),
            peer = response.conn.remote_addr_string(),
            "response"
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    let args = Args::parse();

    let config = Config {
        port: args.port,
        addr_port: args.addr_port,
        read_timeout: Duration::from_secs(args.read_timeout_secs),
        write_timeout: Duration::from_secs(args.write_timeout_secs),
        ..Config::default()
    };
    let server = Server::listen(config, Arc::new(AnswerOk)).await?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    server.close().await?;
    Ok(())
}
