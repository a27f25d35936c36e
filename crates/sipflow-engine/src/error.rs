// sipflow - SIP transport and transaction engine
// SPDX-License-Identifier: Apache-2.0 OR MIT

use thiserror::Error;

/// Engine-level failures surfaced from the send APIs and worker tasks.
#[derive(Debug, Error)]
pub enum Error {
    /// The server was closed; no further sends are accepted.
    #[error("server closed")]
    ServerClosed,
    /// An outbound request hit a transaction key that is still live.
    #[error("transaction exists")]
    TransactionExists,
    /// A transaction's total deadline elapsed without a response.
    #[error("transaction timeout")]
    TransactionTimeout,
    /// A transaction ended early: response arrived, context cancelled,
    /// or the server shut down.
    #[error("transaction finished")]
    TransactionFinished,
    #[error(transparent)]
    Conn(#[from] sipflow_transport::Error),
    #[error(transparent)]
    Codec(#[from] sipflow_core::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
