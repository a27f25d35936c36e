// sipflow - SIP transport and transaction engine
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bounded-buffer line extraction from any byte source.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{Error, Result};

/// Buffer capacity used when the caller passes 0.
pub const DEFAULT_READER_BUF: usize = 4096;

/// Extracts CRLF-terminated lines from an [`AsyncRead`] source through a
/// fixed-size buffer.
///
/// The buffer holds indices `begin <= parsed <= end`: `begin..end` is live
/// data, `begin..parsed` has already been scanned for a line terminator.
/// When the buffer fills without a complete line the live bytes slide to
/// the front; if they already start at the front the line cannot fit and
/// [`Error::LargeLine`] is returned.
pub struct LineReader<R> {
    src: R,
    buf: Vec<u8>,
    begin: usize,
    end: usize,
    parsed: usize,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Creates a reader with an `n`-byte buffer over `src`.
    pub fn new(src: R, n: usize) -> Self {
        let n = if n < 1 { DEFAULT_READER_BUF } else { n };
        Self {
            src,
            buf: vec![0u8; n],
            begin: 0,
            end: 0,
            parsed: 0,
        }
    }

    /// Swaps in a new source and returns the previous one. Buffered bytes
    /// are discarded.
    pub fn reset(&mut self, src: R) -> R {
        self.begin = 0;
        self.end = 0;
        self.parsed = 0;
        std::mem::replace(&mut self.src, src)
    }

    /// Borrows the underlying source.
    pub fn source(&self) -> &R {
        &self.src
    }

    /// Consumes the reader, returning the underlying source.
    pub fn into_source(self) -> R {
        self.src
    }

    /// Reads the next CRLF-terminated line, without the terminator.
    ///
    /// Returns [`Error::Eof`] when the source is exhausted before a full
    /// line arrives, and [`Error::LargeLine`] when a line cannot fit the
    /// buffer.
    pub async fn read_line(&mut self) -> Result<String> {
        loop {
            while self.parsed + 1 < self.end {
                if self.buf[self.parsed] == b'\r' && self.buf[self.parsed + 1] == b'\n' {
                    let line =
                        String::from_utf8_lossy(&self.buf[self.begin..self.parsed]).into_owned();
                    self.parsed += 2;
                    self.begin = self.parsed;
                    self.check_empty();
                    return Ok(line);
                }
                self.parsed += 1;
            }
            if self.end == self.buf.len() {
                if self.begin == 0 {
                    return Err(Error::LargeLine);
                }
                // Slide live bytes to the front to make room.
                self.buf.copy_within(self.begin..self.end, 0);
                self.end -= self.begin;
                self.parsed -= self.begin;
                self.begin = 0;
            }
            let n = self.src.read(&mut self.buf[self.end..]).await?;
            if n == 0 {
                return Err(Error::Eof);
            }
            self.end += n;
        }
    }

    /// Copies buffered bytes into `out`, falling back to the source when
    /// the buffer is empty. Used for reading the body after the header
    /// block. Returns 0 at end of input.
    pub async fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        if self.begin == self.end {
            return Ok(self.src.read(out).await?);
        }
        let n = out.len().min(self.end - self.begin);
        out[..n].copy_from_slice(&self.buf[self.begin..self.begin + n]);
        self.begin += n;
        self.parsed = self.parsed.max(self.begin);
        self.check_empty();
        Ok(n)
    }

    fn check_empty(&mut self) {
        if self.begin == self.end {
            self.begin = 0;
            self.parsed = 0;
            self.end = 0;
        }
    }
}
