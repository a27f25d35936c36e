// sipflow - SIP transport and transaction engine
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fmt;

use smol_str::SmolStr;

use crate::{new_branch, Error, Kv, Result, SIP_VERSION};

/// A `Via` header value: `Version/Proto SP address (";" kv)*`.
///
/// `rport` and `received` are three-state: absent (`None`), present with
/// no value (`Some("")`), or present with a value. A bare `;rport` is the
/// peer's request to have the observed source port stamped back.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Via {
    pub version: SmolStr,
    pub proto: SmolStr,
    pub address: SmolStr,
    pub branch: SmolStr,
    pub rport: Option<SmolStr>,
    pub received: Option<SmolStr>,
    pub original: SmolStr,
}

impl Via {
    /// Builds a Via for an outbound request with a fresh branch.
    pub fn new(proto: &str, address: &str) -> Via {
        Via {
            version: SmolStr::new_static(SIP_VERSION),
            proto: SmolStr::new(proto),
            address: SmolStr::new(address),
            branch: new_branch(),
            ..Via::default()
        }
    }

    /// Parses a Via value. `rport`, `branch`, and `received` parameters
    /// are lifted into their fields; other parameters are ignored.
    pub fn parse(&mut self, line: &str) -> Result<()> {
        self.original = SmolStr::new(line);
        let mut parts = line.split(';');
        let head = parts.next().unwrap_or("");
        let mut fields = head.split_whitespace();
        let (vp, address) = match (fields.next(), fields.next(), fields.next()) {
            (Some(vp), Some(address), None) => (vp, address),
            _ => return Err(Error::ViaFormat),
        };
        match vp.rfind('/') {
            Some(i) => {
                self.version = SmolStr::new(&vp[..i]);
                self.proto = SmolStr::new(&vp[i + 1..]);
            }
            None => self.version = SmolStr::new(vp),
        }
        self.address = SmolStr::new(address);
        for part in parts {
            let mut kv = Kv::default();
            kv.parse(part).map_err(|_| Error::ViaFormat)?;
            match kv.key.as_str() {
                "rport" => {
                    if !kv.value.is_empty() && kv.value.parse::<u16>().is_err() {
                        return Err(Error::ViaFormat);
                    }
                    self.rport = Some(kv.value);
                }
                "branch" => self.branch = kv.value,
                "received" => self.received = Some(kv.value),
                _ => {}
            }
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.version = SmolStr::default();
        self.proto = SmolStr::default();
        self.address = SmolStr::default();
        self.branch = SmolStr::default();
        self.rport = None;
        self.received = None;
        self.original = SmolStr::default();
    }
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.version, self.proto, self.address)?;
        if let Some(rport) = &self.rport {
            f.write_str(";rport")?;
            if !rport.is_empty() {
                write!(f, "={}", rport)?;
            }
        }
        if !self.branch.is_empty() {
            write!(f, ";branch={}", self.branch)?;
        }
        if let Some(received) = &self.received {
            f.write_str(";received")?;
            if !received.is_empty() {
                write!(f, "={}", received)?;
            }
        }
        Ok(())
    }
}
