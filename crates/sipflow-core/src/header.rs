// sipflow - SIP transport and transaction engine
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fmt::Write as _;

use smol_str::SmolStr;
use tokio::io::AsyncRead;

use crate::{
    codec::LineReader, trim_byte, Address, CSeq, Error, Kv, Result, Uri, Via,
};

/// An unsigned header value that remembers its original string form, so
/// formatting reproduces exactly what was parsed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UintValue {
    n: u32,
    s: SmolStr,
}

impl UintValue {
    pub fn parse(&mut self, line: &str) -> std::result::Result<(), std::num::ParseIntError> {
        self.n = line.parse()?;
        self.s = SmolStr::new(line);
        Ok(())
    }

    pub fn set(&mut self, n: u32) {
        self.n = n;
        self.s = SmolStr::new(n.to_string());
    }

    pub fn get(&self) -> u32 {
        self.n
    }

    pub fn as_str(&self) -> &str {
        &self.s
    }

    /// Returns `true` once a value has been parsed or set.
    pub fn is_set(&self) -> bool {
        !self.s.is_empty()
    }

    fn reset(&mut self) {
        self.n = 0;
        self.s = SmolStr::default();
    }
}

/// The typed mandatory headers plus every other header in arrival order.
#[derive(Debug, Default, Clone)]
pub struct Header {
    pub via: Vec<Via>,
    pub from: Address,
    pub to: Address,
    pub call_id: SmolStr,
    pub cseq: CSeq,
    pub max_forwards: UintValue,
    pub contact: Uri,
    pub expires: UintValue,
    pub content_type: SmolStr,
    pub user_agent: SmolStr,
    /// Headers the engine has no typed field for, key spelling preserved.
    pub others: Vec<Kv>,
    /// Derived from the body length on format.
    pub(crate) content_length: i64,
}

impl Header {
    /// Reads header lines until the empty line (or EOF), decrementing
    /// `budget` by each line's wire length. Returns the remaining budget.
    pub(crate) async fn parse_from<R: AsyncRead + Unpin>(
        &mut self,
        reader: &mut LineReader<R>,
        mut budget: usize,
    ) -> Result<usize> {
        self.reset();
        loop {
            let line = match reader.read_line().await {
                Ok(line) => line,
                Err(Error::Eof) => break,
                Err(e) => return Err(e),
            };
            if line.is_empty() {
                break;
            }
            budget = budget
                .checked_sub(line.len() + 2)
                .ok_or(Error::LargeMessage)?;
            let line = line.trim();
            let i = line.find(':').ok_or(Error::HeaderFormat)?;
            let key = line[..i].trim();
            let value = line[i + 1..].trim();
            match key.to_ascii_uppercase().as_str() {
                "CALL-ID" => self.call_id = SmolStr::new(value),
                "CSEQ" => self.cseq.parse(value)?,
                "TO" => self.to.parse(value)?,
                "FROM" => self.from.parse(value)?,
                "MAX-FORWARDS" => self
                    .max_forwards
                    .parse(value)
                    .map_err(|_| Error::MaxForwardsFormat)?,
                "VIA" => {
                    let mut via = Via::default();
                    via.parse(value)?;
                    self.via.push(via);
                }
                "EXPIRES" => self
                    .expires
                    .parse(value)
                    .map_err(|_| Error::ExpiresFormat)?,
                "CONTENT-TYPE" => self.content_type = SmolStr::new(value),
                "CONTACT" => {
                    let value = trim_byte(value, '<', '>');
                    // A bare "*" wildcard is stored as-is.
                    if value == "*" {
                        self.contact.address = SmolStr::new(value);
                        self.contact.original = SmolStr::new(value);
                    } else {
                        self.contact.parse(value)?;
                    }
                }
                "CONTENT-LENGTH" => {
                    let n: i64 = value.parse().map_err(|_| Error::ContentLengthFormat)?;
                    if n < 0 {
                        return Err(Error::ContentLengthFormat);
                    }
                    self.content_length = n;
                }
                _ => self.others.push(Kv {
                    key: SmolStr::new(key),
                    value: SmolStr::new(value),
                }),
            }
        }
        if self.via.is_empty() {
            return Err(Error::MissingHeaderVia);
        }
        if self.from.original.is_empty() {
            return Err(Error::MissingHeaderFrom);
        }
        if self.to.original.is_empty() {
            return Err(Error::MissingHeaderTo);
        }
        if self.cseq.original.is_empty() {
            return Err(Error::MissingHeaderCSeq);
        }
        if self.call_id.is_empty() {
            return Err(Error::MissingHeaderCallId);
        }
        Ok(budget)
    }

    /// Writes every header line. `Content-Length` must already reflect
    /// the body; `User-Agent` defaults when empty.
    pub(crate) fn format_into(&mut self, w: &mut String) {
        for via in &self.via {
            let _ = write!(w, "Via: {}\r\n", via);
        }
        let _ = write!(w, "From: {}\r\n", self.from);
        let _ = write!(w, "To: {}\r\n", self.to);
        let _ = write!(w, "Call-ID: {}\r\n", self.call_id);
        let _ = write!(w, "CSeq: {}\r\n", self.cseq);
        if !self.contact.scheme.is_empty()
            && !self.contact.name.is_empty()
            && !self.contact.address.is_empty()
        {
            let _ = write!(w, "Contact: {}\r\n", self.contact);
        }
        if self.expires.is_set() {
            let _ = write!(w, "Expires: {}\r\n", self.expires.as_str());
        }
        if self.max_forwards.is_set() {
            let _ = write!(w, "Max-Forwards: {}\r\n", self.max_forwards.as_str());
        }
        if !self.content_type.is_empty() {
            let _ = write!(w, "Content-Type: {}\r\n", self.content_type);
        }
        for kv in &self.others {
            let _ = write!(w, "{}: {}\r\n", kv.key, kv.value);
        }
        if self.user_agent.is_empty() {
            self.user_agent = SmolStr::new_static("sipflow");
        }
        let _ = write!(w, "User-Agent: {}\r\n", self.user_agent);
        let _ = write!(w, "Content-Length: {}\r\n", self.content_length);
    }

    pub fn reset(&mut self) {
        self.via.clear();
        self.from.reset();
        self.to.reset();
        self.call_id = SmolStr::default();
        self.cseq.reset();
        self.max_forwards.reset();
        self.contact.reset();
        self.expires.reset();
        self.content_type = SmolStr::default();
        self.user_agent = SmolStr::default();
        self.others.clear();
        self.content_length = 0;
    }

    /// Copies every field into `other`.
    pub fn copy_to(&self, other: &mut Header) {
        other.via.clear();
        other.via.extend_from_slice(&self.via);
        self.from.copy_to(&mut other.from);
        self.to.copy_to(&mut other.to);
        other.call_id = self.call_id.clone();
        other.cseq = self.cseq.clone();
        other.max_forwards = self.max_forwards.clone();
        other.contact = self.contact.clone();
        other.expires = self.expires.clone();
        other.content_type = self.content_type.clone();
        other.others.clear();
        other.others.extend_from_slice(&self.others);
        other.content_length = self.content_length;
    }

    /// Drops everything except the routing essentials: Contact,
    /// Content-Type, User-Agent, and the untyped headers are cleared.
    pub fn keep_basic(&mut self) {
        self.contact.reset();
        self.content_type = SmolStr::default();
        self.user_agent = SmolStr::default();
        self.reset_other();
    }

    pub fn reset_other(&mut self) {
        self.others.clear();
    }

    /// Returns the `index`-th untyped header with this exact key, or an
    /// empty string.
    pub fn get_other(&self, key: &str, index: usize) -> &str {
        self.others
            .iter()
            .filter(|kv| kv.key == key)
            .nth(index)
            .map(|kv| kv.value.as_str())
            .unwrap_or("")
    }

    /// Overwrites the first untyped header with this key, appending when
    /// absent.
    pub fn set_other(&mut self, key: &str, value: &str) {
        for kv in self.others.iter_mut() {
            if kv.key == key {
                kv.value = SmolStr::new(value);
                return;
            }
        }
        self.others.push(Kv {
            key: SmolStr::new(key),
            value: SmolStr::new(value),
        });
    }

    /// Renames the first untyped header matching `old_key`, appending a
    /// fresh one when absent.
    pub fn replace_other(&mut self, old_key: &str, new_key: &str, value: &str) {
        for kv in self.others.iter_mut() {
            if kv.key == old_key {
                kv.key = SmolStr::new(new_key);
                kv.value = SmolStr::new(value);
                return;
            }
        }
        self.others.push(Kv {
            key: SmolStr::new(new_key),
            value: SmolStr::new(value),
        });
    }

    /// Removes the first untyped header with this key.
    pub fn remove_other(&mut self, key: &str) {
        if let Some(pos) = self.others.iter().position(|kv| kv.key == key) {
            self.others.remove(pos);
        }
    }

    pub fn content_length(&self) -> i64 {
        self.content_length
    }
}
