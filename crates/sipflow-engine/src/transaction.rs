// sipflow - SIP transport and transaction engine
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-transaction state and the keyed tables that own it.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use smol_str::SmolStr;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use sipflow_core::Message;
use sipflow_transport::Conn;

use crate::Result;

/// One SIP transaction, pooled for reuse.
///
/// The dispatch flags make the handler run at most once per direction:
/// whichever task wins the flag spawns the worker, every other arrival
/// of the same key is dropped. `recovery` counts the workers holding the
/// transaction; the table recycles the object when it reaches zero after
/// removal.
#[derive(Default)]
pub(crate) struct Transaction {
    key: RwLock<SmolStr>,
    handling_req: AtomicBool,
    handling_res: AtomicBool,
    /// Caller-supplied cancellation governing an outbound transaction.
    ctx: Mutex<Option<CancellationToken>>,
    /// Last formatted outbound message, reused by the retransmit loop.
    write_data: Mutex<BytesMut>,
    /// Cancelled on removal; wakes cleanup tasks and stops retransmits.
    quit: Mutex<CancellationToken>,
    recovery: AtomicI32,
}

impl Transaction {
    fn reset(&self, key: SmolStr) {
        *self.key.write() = key;
        *self.ctx.lock() = None;
        *self.quit.lock() = CancellationToken::new();
        self.write_data.lock().clear();
    }

    pub(crate) fn key(&self) -> SmolStr {
        self.key.read().clone()
    }

    /// The quit token of the current lifetime. Cancelled exactly once,
    /// on removal or when a response arrives.
    pub(crate) fn quit_token(&self) -> CancellationToken {
        self.quit.lock().clone()
    }

    pub(crate) fn set_ctx(&self, ctx: Option<CancellationToken>) {
        *self.ctx.lock() = ctx;
    }

    pub(crate) fn ctx(&self) -> Option<CancellationToken> {
        self.ctx.lock().clone()
    }

    /// Accounts one more worker holding this transaction.
    pub(crate) fn retain(&self) {
        self.recovery.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn claim_request(&self) -> bool {
        self.handling_req
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn finish_request(&self) {
        self.handling_req.store(false, Ordering::Release);
    }

    pub(crate) fn claim_response(&self) -> bool {
        self.handling_res
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn finish_response(&self) {
        self.handling_res.store(false, Ordering::Release);
    }

    pub(crate) fn has_write_data(&self) -> bool {
        !self.write_data.lock().is_empty()
    }

    /// A copy of the buffered outbound bytes for one send.
    pub(crate) fn write_data_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.write_data.lock())
    }

    /// Formats `msg` into the transaction's send buffer. TCP sends the
    /// bytes immediately; for UDP the retransmit loop issues the first
    /// send on its zero-delay tick.
    pub(crate) async fn write_message(&self, conn: &Conn, msg: &mut Message) -> Result<()> {
        let bytes = {
            let mut data = self.write_data.lock();
            data.clear();
            msg.encode_into(&mut data);
            Bytes::copy_from_slice(&data)
        };
        debug!(
            key = %self.key(),
            net = conn.network(),
            peer = %conn.remote_addr_string(),
            len = bytes.len(),
            "write message"
        );
        if conn.is_udp() {
            return Ok(());
        }
        conn.write(&bytes).await?;
        Ok(())
    }
}

/// Keyed transaction map plus a free list of recycled objects. The
/// server holds one per transport.
pub(crate) struct TransactionTable {
    map: DashMap<SmolStr, Arc<Transaction>>,
    pool: Mutex<Vec<Arc<Transaction>>>,
}

impl TransactionTable {
    pub(crate) fn new() -> Self {
        Self {
            map: DashMap::new(),
            pool: Mutex::new(Vec::new()),
        }
    }

    /// Looks up the transaction for `msg`, creating it when absent.
    /// Retransmitted requests find the transaction already installed.
    pub(crate) fn get_or_create(&self, msg: &mut Message) -> (Arc<Transaction>, bool) {
        let key = msg.transaction_key();
        match self.map.entry(key.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let t = self
                    .pool
                    .lock()
                    .pop()
                    .unwrap_or_else(|| Arc::new(Transaction::default()));
                t.reset(key);
                entry.insert(t.clone());
                (t, true)
            }
        }
    }

    /// Read-only lookup, used for responses.
    pub(crate) fn get(&self, msg: &mut Message) -> Option<Arc<Transaction>> {
        self.map.get(&msg.transaction_key()).map(|t| t.clone())
    }

    /// Deletes the transaction, cancels its quit token, and returns it
    /// to the pool once the last worker lets go.
    pub(crate) fn remove(&self, t: &Arc<Transaction>) {
        self.map
            .remove_if(&t.key(), |_, live| Arc::ptr_eq(live, t));
        t.quit_token().cancel();
        if t.recovery.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.pool.lock().push(t.clone());
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    #[cfg(test)]
    fn pooled(&self) -> usize {
        self.pool.lock().len()
    }
}
