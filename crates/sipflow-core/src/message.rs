// sipflow - SIP transport and transaction engine
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fmt::Write as _;

use bytes::{Bytes, BytesMut};
use smol_str::SmolStr;
use tokio::io::AsyncRead;

use crate::{codec::LineReader, Error, Header, Result, SIP_VERSION};

/// A complete SIP message: start line, headers, body.
///
/// The start line is three tokens. For a request they are the method, the
/// request URI, and `SIP/2.0`; for a response `SIP/2.0`, the status code,
/// and the reason phrase. Tokens 0 and 1 are upper-cased on parse.
#[derive(Debug, Default, Clone)]
pub struct Message {
    pub start_line: [SmolStr; 3],
    pub header: Header,
    pub body: BytesMut,
    is_request: bool,
    tx_key: SmolStr,
}

impl Message {
    /// Reads and parses one complete message, spending at most `budget`
    /// bytes across start line, headers, and body.
    pub async fn parse_from<R: AsyncRead + Unpin>(
        &mut self,
        reader: &mut LineReader<R>,
        budget: usize,
    ) -> Result<()> {
        let budget = self.parse_start_line(reader, budget).await?;
        let budget = self.header.parse_from(reader, budget).await?;
        if self.header.content_length > 0 {
            let mut need = self.header.content_length as usize;
            if need > budget {
                return Err(Error::LargeMessage);
            }
            self.body.clear();
            let mut chunk = [0u8; 512];
            while need > 0 {
                let take = need.min(chunk.len());
                let n = reader.read(&mut chunk[..take]).await?;
                if n == 0 {
                    return Err(Error::ReadingBody);
                }
                self.body.extend_from_slice(&chunk[..n]);
                need -= n;
            }
        }
        Ok(())
    }

    async fn parse_start_line<R: AsyncRead + Unpin>(
        &mut self,
        reader: &mut LineReader<R>,
        budget: usize,
    ) -> Result<usize> {
        let line = reader.read_line().await?;
        let budget = budget
            .checked_sub(line.len())
            .ok_or(Error::LargeMessage)?;
        let line = line.trim();
        let i = line.find(' ').ok_or(Error::StartLineFormat)?;
        self.start_line[0] = SmolStr::new(line[..i].to_ascii_uppercase());
        let rest = line[i + 1..].trim();
        let j = rest.find(' ').ok_or(Error::StartLineFormat)?;
        self.start_line[1] = SmolStr::new(rest[..j].to_ascii_uppercase());
        self.start_line[2] = SmolStr::new(rest[j + 1..].trim());
        if self.start_line[2] == SIP_VERSION {
            self.is_request = true;
        } else if self.start_line[0] != SIP_VERSION {
            return Err(Error::StartLineFormat);
        }
        Ok(budget)
    }

    /// Appends the formatted message to `dst`. `Content-Length` is derived
    /// from the body.
    pub fn encode_into(&mut self, dst: &mut BytesMut) {
        self.header.content_length = self.body.len() as i64;
        let mut head = String::with_capacity(256);
        let _ = write!(
            head,
            "{} {} {}\r\n",
            self.start_line[0], self.start_line[1], self.start_line[2]
        );
        self.header.format_into(&mut head);
        head.push_str("\r\n");
        dst.reserve(head.len() + self.body.len());
        dst.extend_from_slice(head.as_bytes());
        if !self.body.is_empty() {
            dst.extend_from_slice(&self.body);
        }
    }

    /// Formats the message into a fresh byte buffer.
    pub fn encode(&mut self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Returns the transaction key `CSeq.Method ++ Call-ID ++
    /// Via[0].Branch`, computed once and cached.
    pub fn transaction_key(&mut self) -> SmolStr {
        if self.tx_key.is_empty() {
            let branch = self
                .header
                .via
                .first()
                .map(|v| v.branch.as_str())
                .unwrap_or("");
            let mut key = String::with_capacity(
                self.header.cseq.method.len() + self.header.call_id.len() + branch.len(),
            );
            key.push_str(&self.header.cseq.method);
            key.push_str(&self.header.call_id);
            key.push_str(branch);
            self.tx_key = SmolStr::new(key);
        }
        self.tx_key.clone()
    }

    /// Resets every field for reuse.
    pub fn reset(&mut self) {
        self.is_request = false;
        self.tx_key = SmolStr::default();
        for token in self.start_line.iter_mut() {
            *token = SmolStr::default();
        }
        self.header.reset();
        self.body.clear();
    }

    /// Keeps the routing headers, dropping body and auxiliary fields.
    pub fn keep_basic_headers(&mut self) {
        self.tx_key = SmolStr::default();
        self.header.keep_basic();
        self.body.clear();
    }

    /// Copies start line, headers, and body into `other`.
    pub fn copy_to(&self, other: &mut Message) {
        other.start_line = self.start_line.clone();
        self.header.copy_to(&mut other.header);
        other.body.extend_from_slice(&self.body);
    }

    pub fn is_request(&self) -> bool {
        self.is_request
    }

    /// Compares the response status token against `code`.
    pub fn is_status(&self, code: &str) -> bool {
        self.start_line[1] == code
    }

    /// Sets the start line of a request.
    pub fn init_request_line(&mut self, method: &str, uri: &str) {
        self.start_line[0] = SmolStr::new(method);
        self.start_line[1] = SmolStr::new(uri);
        self.start_line[2] = SmolStr::new_static(SIP_VERSION);
        self.is_request = true;
    }

    /// Sets the start line of a response.
    pub fn init_response_line(&mut self, status: &str, phrase: &str) {
        self.start_line[0] = SmolStr::new_static(SIP_VERSION);
        self.start_line[1] = SmolStr::new(status);
        self.start_line[2] = SmolStr::new(phrase);
        self.is_request = false;
    }

    /// The request method token.
    pub fn method(&self) -> &str {
        &self.start_line[0]
    }

    /// The request URI token.
    pub fn request_uri(&self) -> &str {
        &self.start_line[1]
    }

    /// The response status token.
    pub fn status(&self) -> &str {
        &self.start_line[1]
    }

    /// The response reason phrase.
    pub fn phrase(&self) -> &str {
        &self.start_line[2]
    }
}
