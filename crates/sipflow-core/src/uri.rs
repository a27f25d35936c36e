// sipflow - SIP transport and transaction engine
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fmt;

use smol_str::SmolStr;

use crate::{trim_byte, Error, Kv, Result};

/// A SIP URI of the form `scheme:[name@]address[;transport=T][;...]`.
///
/// `address` is the host with an optional port. `name` is empty unless an
/// `@` is present, in which case it must be non-empty.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Uri {
    pub scheme: SmolStr,
    pub name: SmolStr,
    pub address: SmolStr,
    pub transport: SmolStr,
    pub original: SmolStr,
}

impl Uri {
    /// Parses a URI, stripping enclosing angle brackets first.
    pub fn parse(&mut self, line: &str) -> Result<()> {
        self.original = SmolStr::new(line);
        let line = trim_byte(line, '<', '>');
        let mut parts = line.split(';');
        let head = parts.next().unwrap_or("");
        let i = head.find(':').ok_or(Error::UriFormat)?;
        self.scheme = SmolStr::new(&head[..i]);
        if self.scheme.is_empty() {
            return Err(Error::UriFormat);
        }
        let rest = &head[i + 1..];
        match rest.find('@') {
            Some(0) => return Err(Error::UriFormat),
            Some(at) => {
                self.name = SmolStr::new(&rest[..at]);
                self.address = SmolStr::new(&rest[at + 1..]);
            }
            None => self.address = SmolStr::new(rest),
        }
        if self.address.is_empty() {
            return Err(Error::UriFormat);
        }
        for part in parts {
            let mut kv = Kv::default();
            kv.parse(part).map_err(|_| Error::UriFormat)?;
            if kv.key == "transport" {
                self.transport = kv.value;
            }
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.scheme = SmolStr::default();
        self.name = SmolStr::default();
        self.address = SmolStr::default();
        self.transport = SmolStr::default();
        self.original = SmolStr::default();
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}:{}@{}>", self.scheme, self.name, self.address)
    }
}
