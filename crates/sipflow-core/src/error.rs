// sipflow - SIP transport and transaction engine
// SPDX-License-Identifier: Apache-2.0 OR MIT

use thiserror::Error;

/// Errors produced while reading or parsing SIP messages.
#[derive(Debug, Error)]
pub enum Error {
    /// A single line exceeds the reader's buffer capacity.
    #[error("line exceeds reader buffer")]
    LargeLine,
    /// The message exceeds the configured byte budget.
    #[error("message exceeds size limit")]
    LargeMessage,
    #[error("malformed start line")]
    StartLineFormat,
    #[error("malformed header line")]
    HeaderFormat,
    #[error("malformed address value")]
    AddressFormat,
    #[error("malformed uri value")]
    UriFormat,
    #[error("malformed Via value")]
    ViaFormat,
    #[error("malformed CSeq value")]
    CSeqFormat,
    #[error("malformed Expires value")]
    ExpiresFormat,
    #[error("malformed Max-Forwards value")]
    MaxForwardsFormat,
    #[error("malformed Content-Length value")]
    ContentLengthFormat,
    #[error("empty parameter key")]
    EmptyKey,
    #[error("missing header Via")]
    MissingHeaderVia,
    #[error("missing header From")]
    MissingHeaderFrom,
    #[error("missing header To")]
    MissingHeaderTo,
    #[error("missing header CSeq")]
    MissingHeaderCSeq,
    #[error("missing header Call-ID")]
    MissingHeaderCallId,
    /// The source ended before `Content-Length` bytes of body arrived.
    #[error("short read while filling body")]
    ReadingBody,
    /// The source is exhausted and nothing is buffered.
    #[error("end of input")]
    Eof,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` for the clean end-of-input condition, as opposed to
    /// a malformed or truncated message.
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::Eof)
    }
}
