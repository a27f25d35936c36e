// sipflow - SIP transport and transaction engine
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fmt;

use smol_str::SmolStr;

use crate::{Error, Result};

/// The `CSeq` header: a sequence number plus the request method.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CSeq {
    pub sn: u32,
    pub method: SmolStr,
    pub original: SmolStr,
}

impl CSeq {
    /// Parses `"sn METHOD"`; the method is upper-cased.
    pub fn parse(&mut self, line: &str) -> Result<()> {
        self.original = SmolStr::new(line);
        let mut fields = line.split_whitespace();
        let (sn, method) = match (fields.next(), fields.next(), fields.next()) {
            (Some(sn), Some(method), None) => (sn, method),
            _ => return Err(Error::CSeqFormat),
        };
        self.sn = sn.parse().map_err(|_| Error::CSeqFormat)?;
        self.method = SmolStr::new(method.to_ascii_uppercase());
        Ok(())
    }

    pub fn reset(&mut self) {
        self.sn = 0;
        self.method = SmolStr::default();
        self.original = SmolStr::default();
    }
}

impl fmt::Display for CSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.sn, self.method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sn_and_method() {
        let mut cs = CSeq::default();
        cs.parse("123 ACK").unwrap();
        assert_eq!(cs.sn, 123);
        assert_eq!(cs.method, "ACK");
        assert_eq!(cs.to_string(), "123 ACK");
    }

    #[test]
    fn method_is_upper_cased() {
        let mut cs = CSeq::default();
        cs.parse("314159 invite").unwrap();
        assert_eq!(cs.method, "INVITE");
    }

    #[test]
    fn rejects_malformed_values() {
        let mut cs = CSeq::default();
        for s in ["123ACK", "a ACK", "ACK", "1 2 3"] {
            assert!(matches!(cs.parse(s), Err(Error::CSeqFormat)), "{s}");
        }
    }
}
