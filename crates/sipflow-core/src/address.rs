// sipflow - SIP transport and transaction engine
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fmt;

use smol_str::SmolStr;

use crate::{trim_byte, Error, Kv, Result, Uri};

/// A `From`/`To` style address: `[name] <uri> [;tag=T]`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Address {
    pub name: SmolStr,
    pub uri: Uri,
    pub tag: SmolStr,
    pub original: SmolStr,
}

impl Address {
    /// Parses a display name, URI, and optional `tag` parameter.
    pub fn parse(&mut self, line: &str) -> Result<()> {
        self.original = SmolStr::new(line);
        let mut parts = line.split(';');
        let head = parts.next().unwrap_or("");
        let mut fields = head.split_whitespace();
        match (fields.next(), fields.next(), fields.next()) {
            (Some(uri), None, _) => self.uri.parse(trim_byte(uri, '<', '>'))?,
            (Some(name), Some(uri), None) => {
                self.name = SmolStr::new(name);
                self.uri.parse(trim_byte(uri, '<', '>'))?;
            }
            _ => return Err(Error::AddressFormat),
        }
        if let Some(param) = parts.next() {
            let mut kv = Kv::default();
            kv.parse(param).map_err(|_| Error::AddressFormat)?;
            if kv.key == "tag" {
                self.tag = kv.value;
            }
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.name = SmolStr::default();
        self.uri.reset();
        self.tag = SmolStr::default();
        self.original = SmolStr::default();
    }

    pub fn copy_to(&self, other: &mut Address) {
        other.name = self.name.clone();
        other.uri = self.uri.clone();
        other.tag = self.tag.clone();
        other.original = self.original.clone();
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.name.is_empty() {
            write!(f, "{} ", self.name)?;
        }
        self.uri.fmt(f)?;
        if !self.tag.is_empty() {
            write!(f, ";tag={}", self.tag)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_uri_and_tag() {
        let mut addr = Address::default();
        addr.parse("  aaa  sip:123@456;tag=321").unwrap();
        assert_eq!(addr.name, "aaa");
        assert_eq!(addr.tag, "321");
    }

    #[test]
    fn parses_bare_uri_with_tag() {
        let mut addr = Address::default();
        addr.parse("sip:123@456; tag=321 ").unwrap();
        assert_eq!(addr.name, "");
        assert_eq!(addr.tag, "321");
    }

    #[test]
    fn parses_bracketed_uri_without_tag() {
        let mut addr = Address::default();
        addr.parse("aaa <sip:123@456>").unwrap();
        assert_eq!(addr.name, "aaa");
        assert_eq!(addr.tag, "");
        assert_eq!(addr.uri.name, "123");
    }

    #[test]
    fn rejects_too_many_fields() {
        let mut addr = Address::default();
        assert!(matches!(
            addr.parse("a b sip:1@2"),
            Err(Error::AddressFormat)
        ));
    }

    #[test]
    fn formats_wire_form() {
        let mut addr = Address::default();
        addr.parse("Alice <sip:alice@atlanta.com>;tag=1928301774").unwrap();
        assert_eq!(
            addr.to_string(),
            "Alice <sip:alice@atlanta.com>;tag=1928301774"
        );
    }
}
