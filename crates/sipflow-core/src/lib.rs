// sipflow - SIP transport and transaction engine
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! SIP message model and codec.
//!
//! Provides the wire-level building blocks shared by both transports: a
//! bounded-buffer CRLF line reader, the [`Message`] start-line/header/body
//! model with its typed mandatory headers, and the sub-codecs for
//! `Via`, `From`/`To` addresses, URIs, `CSeq`, and bare key/value
//! parameters.
//!
//! # Example
//! ```
//! use sipflow_core::{LineReader, Message};
//! # async fn example() -> sipflow_core::Result<()> {
//! let raw: &[u8] = b"MESSAGE sip:bob@example.com SIP/2.0\r\n\
//!     Via: SIP/2.0/UDP host;branch=z9hG4bK-1\r\n\
//!     From: <sip:alice@example.com>;tag=1\r\n\
//!     To: <sip:bob@example.com>\r\n\
//!     Call-ID: abc\r\n\
//!     CSeq: 1 MESSAGE\r\n\
//!     Content-Length: 0\r\n\r\n";
//! let mut reader = LineReader::new(raw, 4096);
//! let mut msg = Message::default();
//! msg.parse_from(&mut reader, 4096).await?;
//! assert!(msg.is_request());
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU32, Ordering};

use rand::{distributions::Alphanumeric, Rng};
use smol_str::SmolStr;

mod address;
mod codec;
mod cseq;
mod error;
mod header;
mod kv;
mod message;
pub mod status;
mod uri;
mod via;

pub use address::Address;
pub use codec::{LineReader, DEFAULT_READER_BUF};
pub use cseq::CSeq;
pub use error::Error;
pub use header::{Header, UintValue};
pub use kv::Kv;
pub use message::Message;
pub use uri::Uri;
pub use via::Via;

pub type Result<T> = std::result::Result<T, Error>;

/// Protocol version token carried in start lines and Via headers.
pub const SIP_VERSION: &str = "SIP/2.0";

/// Mandatory prefix of every Via branch parameter (RFC 3261 magic cookie).
pub const BRANCH_PREFIX: &str = "z9hG4bK";

/// Request method tokens the engine knows about. Methods travel as plain
/// uppercase strings; unknown tokens pass through untouched.
pub mod method {
    pub const REGISTER: &str = "REGISTER";
    pub const INVITE: &str = "INVITE";
    pub const ACK: &str = "ACK";
    pub const BYE: &str = "BYE";
    pub const MESSAGE: &str = "MESSAGE";
    pub const NOTIFY: &str = "NOTIFY";
    pub const SUBSCRIBE: &str = "SUBSCRIBE";
    pub const INFO: &str = "INFO";
}

static SN32: AtomicU32 = AtomicU32::new(0);
static CSEQ32: AtomicU32 = AtomicU32::new(0);

/// Returns the next value of the process-wide SN counter.
pub fn next_sn() -> u32 {
    SN32.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
}

/// Returns the next value of the process-wide CSeq counter.
pub fn next_cseq() -> u32 {
    CSEQ32.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
}

/// Like [`next_sn`], formatted as a decimal string.
pub fn next_sn_string() -> String {
    next_sn().to_string()
}

/// Generates a fresh Via branch: the magic cookie plus a random suffix.
pub fn new_branch() -> SmolStr {
    let mut rng = rand::thread_rng();
    let suffix: String = (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect();
    SmolStr::new(format!("{}-{}", BRANCH_PREFIX, suffix))
}

/// Generates a random token suitable for a `To` tag.
pub fn new_tag() -> SmolStr {
    let mut rng = rand::thread_rng();
    let tag: String = (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect();
    SmolStr::new(tag)
}

/// Strips every leading `left` and every trailing `right` character.
pub fn trim_byte(s: &str, left: char, right: char) -> &str {
    s.trim_start_matches(left).trim_end_matches(right)
}
