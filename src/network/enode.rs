use std::fmt;
use std::str::FromStr;

use crate::crypto::{id2pk, NodeId};
use crate::utils::ProbeError;

const SCHEME: &str = "enode://";

/// A remote peer: `enode://<128 hex id>@<host>:<port>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub id: NodeId,
    pub host: String,
    pub port: u16,
}

impl Target {
    /// `host:port`, with IPv6 hosts bracketed.
    pub fn addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Target {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |msg: &str| ProbeError::InvalidTarget(format!("{msg}: {s}"));

        let rest = s.trim().strip_prefix(SCHEME).ok_or_else(|| invalid("missing enode:// scheme"))?;
        let (id, addr) = rest.split_once('@').ok_or_else(|| invalid("missing '@'"))?;
        // discport and other query parameters are not needed for a TCP probe
        let addr = addr.split(['?', '#']).next().unwrap_or_default();

        let (host, port) = match addr.strip_prefix('[') {
            Some(v6) => {
                let (host, port) =
                    v6.split_once(']').ok_or_else(|| invalid("unterminated IPv6 host"))?;
                (host, port.strip_prefix(':').ok_or_else(|| invalid("missing port"))?)
            }
            None => addr.rsplit_once(':').ok_or_else(|| invalid("missing port"))?,
        };
        if host.is_empty() {
            return Err(invalid("empty host"));
        }
        let port = port.parse::<u16>().map_err(|_| invalid("invalid port"))?;

        let raw = hex::decode(id).map_err(|_| invalid("node id is not hex"))?;
        if raw.len() != NodeId::len_bytes() {
            return Err(invalid("node id must be 64 bytes"));
        }
        let id = NodeId::from_slice(&raw);
        id2pk(&id).map_err(|_| invalid("node id is not a valid public key"))?;

        Ok(Self { id, host: host.to_string(), port })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}@{}", hex::encode(self.id), self.addr())
    }
}
