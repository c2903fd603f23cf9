//! One-shot RLPx peer prober: authenticate with an Ethereum execution-layer node,
//! negotiate `eth`, read its Status and disconnect.

pub mod crypto;
pub mod network;
pub mod node;
pub mod utils;

pub use network::{probe, probe_stream, ProbeOutcome, Target};
pub use node::ProbeConfig;
pub use utils::{ProbeError, Result};

#[cfg(test)]
mod tests;
