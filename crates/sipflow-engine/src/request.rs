// sipflow - SIP transport and transaction engine
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::sync::Arc;

use smol_str::SmolStr;

use sipflow_core::{new_tag, status, Message};
use sipflow_transport::Conn;

use crate::server::Server;
use crate::transaction::Transaction;
use crate::Result;

/// An inbound request handed to [`Handler::handle_request`]. Holds the
/// parsed message, the connection it arrived on, and the transaction it
/// belongs to.
///
/// [`Handler::handle_request`]: crate::Handler::handle_request
pub struct Request {
    pub message: Message,
    pub conn: Conn,
    pub(crate) tx: Arc<Transaction>,
    pub(crate) server: Server,
}

impl Request {
    /// Rewrites the received request into a response in place and sends
    /// it over the same connection.
    ///
    /// An empty `phrase` falls back to the standard phrase for `status`.
    /// When the topmost Via asked for it with an `rport` parameter, the
    /// observed peer address (or the configured public address) is
    /// stamped into `received`/`rport`. An empty `To` tag gets a fresh
    /// one. On UDP the formatted bytes are buffered; the transaction
    /// worker sends and resends them until the deadline.
    pub async fn respond(&mut self, status_code: &str, phrase: &str) -> Result<()> {
        let phrase = if phrase.is_empty() {
            status::phrase(status_code)
        } else {
            phrase
        };
        self.message.init_response_line(status_code, phrase);
        if let Some(via) = self.message.header.via.first_mut() {
            if via.rport.is_some() {
                if !self.server.inner.received.is_empty() {
                    via.received = Some(SmolStr::new(&self.server.inner.received));
                    via.rport = Some(SmolStr::new(&self.server.inner.rport));
                } else {
                    via.received = Some(SmolStr::new(self.conn.remote_ip()));
                    via.rport = Some(SmolStr::new(self.conn.remote_port()));
                }
            }
        }
        if self.message.header.to.tag.is_empty() {
            self.message.header.to.tag = new_tag();
        }
        // Cleared so the formatter stamps this stack's own agent string.
        self.message.header.user_agent = SmolStr::default();
        self.tx.write_message(&self.conn, &mut self.message).await
    }
}

/// An inbound response handed to [`Handler::handle_response`].
///
/// [`Handler::handle_response`]: crate::Handler::handle_response
pub struct Response {
    pub message: Message,
    pub conn: Conn,
}
