// sipflow - SIP transport and transaction engine
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fmt;

use smol_str::SmolStr;

use crate::{Error, Result};

/// A `key` or `key=value` parameter. A bare key with no `=` is allowed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Kv {
    pub key: SmolStr,
    pub value: SmolStr,
}

impl Kv {
    /// Parses a parameter, splitting on the first `=`.
    pub fn parse(&mut self, line: &str) -> Result<()> {
        let Some(i) = line.find('=') else {
            self.key = SmolStr::new(line.trim());
            self.value = SmolStr::default();
            return Ok(());
        };
        self.key = SmolStr::new(line[..i].trim());
        self.value = SmolStr::new(line[i + 1..].trim());
        if self.key.is_empty() {
            return Err(Error::EmptyKey);
        }
        Ok(())
    }
}

impl fmt::Display for Kv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}
