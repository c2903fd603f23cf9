//! Capability negotiation: build our HELLO, validate the remote one and compute
//! the shared subprotocols with their message-code offsets.

use std::collections::BTreeMap;

use crate::crypto::NodeId;
use crate::network::eth::{ETH_MESSAGE_COUNT, ETH_PROTOCOL_NAME};
use crate::network::message::{Capability, Hello, BASE_PROTOCOL_LENGTH, BASE_PROTOCOL_VERSION};
use crate::utils::ProbeError;

/// Which handler serves a negotiated capability. Closed set: only `eth` today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubprotocolKind {
    Eth,
}

/// A subprotocol this engine supports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalCapability {
    pub name: String,
    pub version: u64,
    /// Number of message codes the subprotocol occupies.
    pub length: u64,
    pub kind: SubprotocolKind,
}

impl LocalCapability {
    pub fn eth(version: u64) -> Self {
        Self {
            name: ETH_PROTOCOL_NAME.to_string(),
            version,
            length: ETH_MESSAGE_COUNT,
            kind: SubprotocolKind::Eth,
        }
    }

    pub fn capability(&self) -> Capability {
        Capability::new(self.name.clone(), self.version)
    }
}

/// A negotiated subprotocol and the code range `[offset, offset + length)` it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedProtocol {
    pub name: String,
    pub version: u64,
    pub offset: u64,
    pub length: u64,
    pub kind: SubprotocolKind,
}

impl SharedProtocol {
    pub fn contains(&self, code: u64) -> bool {
        code >= self.offset && code < self.offset + self.length
    }
}

pub fn build_hello(local_id: NodeId, client_id: &str, local: &[LocalCapability]) -> Hello {
    Hello {
        protocol_version: BASE_PROTOCOL_VERSION,
        client_id: client_id.to_string(),
        capabilities: local.iter().map(LocalCapability::capability).collect(),
        listen_port: 0,
        node_id: local_id,
    }
}

/// Intersect by exact `(name, version)`, keep the highest version per name and lay the
/// survivors out by name so offsets don't depend on either side's list order.
pub fn negotiate(local: &[LocalCapability], remote: &[Capability]) -> Vec<SharedProtocol> {
    let mut shared: BTreeMap<&str, &LocalCapability> = BTreeMap::new();
    for cap in remote {
        for ours in local {
            if ours.name != cap.name || ours.version != cap.version {
                continue;
            }
            let higher = shared
                .get(ours.name.as_str())
                .map_or(true, |existing| existing.version < ours.version);
            if higher {
                shared.insert(ours.name.as_str(), ours);
            }
        }
    }

    let mut offset = BASE_PROTOCOL_LENGTH;
    shared
        .into_values()
        .map(|cap| {
            let protocol = SharedProtocol {
                name: cap.name.clone(),
                version: cap.version,
                offset,
                length: cap.length,
                kind: cap.kind,
            };
            offset += cap.length;
            protocol
        })
        .collect()
}

/// Validate a remote HELLO: identity first, then capability overlap.
pub fn accept_hello(
    hello: &Hello,
    expected: Option<&NodeId>,
    local: &[LocalCapability],
) -> Result<Vec<SharedProtocol>, ProbeError> {
    if let Some(expected) = expected {
        if *expected != hello.node_id {
            return Err(ProbeError::InvalidIdentity {
                expected: *expected,
                received: hello.node_id,
            });
        }
    }
    let protocols = negotiate(local, &hello.capabilities);
    if protocols.is_empty() {
        return Err(ProbeError::UselessPeer);
    }
    Ok(protocols)
}
