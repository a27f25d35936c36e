// sipflow - SIP transport and transaction engine
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! SIP transaction engine over TCP and UDP.
//!
//! The [`Server`] listens on both transports at once, parses messages
//! off the wire, and demultiplexes them into per-transaction state. Each
//! transaction dispatches the user [`Handler`] at most once per
//! direction, no matter how many retransmits arrive; UDP transactions
//! resend their last formatted message periodically until a response
//! arrives or the write deadline expires.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use sipflow_core::status;
//! use sipflow_engine::{Config, Handler, Request, Response, Server};
//!
//! struct Answer;
//!
//! #[async_trait]
//! impl Handler for Answer {
//!     async fn handle_request(&self, mut request: Request) {
//!         let _ = request.respond(status::OK, "").await;
//!     }
//!     async fn handle_response(&self, _response: Response) {}
//! }
//!
//! # async fn example() -> sipflow_engine::Result<()> {
//! let server = Server::listen(Config::default(), Arc::new(Answer)).await?;
//! # server.close().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

mod config;
mod error;
mod request;
mod server;
mod tcp;
mod transaction;
mod udp;

pub use config::{
    Config, DEFAULT_READ_TIMEOUT, DEFAULT_UDP_QUEUE_LEN, DEFAULT_WRITE_TIMEOUT, MIN_RTO,
    UDP_MAX_DATA_LEN, UDP_MIN_DATA_LEN,
};
pub use error::Error;
pub use request::{Request, Response};
pub use server::Server;
pub use sipflow_transport::{Conn, TransportKind};

pub type Result<T> = std::result::Result<T, Error>;

/// User callbacks, invoked once per transaction and direction.
///
/// Handlers run on their own tasks; they may block or suspend freely and
/// the engine holds no internal lock across a call.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle_request(&self, request: Request);
    async fn handle_response(&self, response: Response);
}
