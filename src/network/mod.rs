//! Network module - RLPx session, frame transport, capability negotiation, dispatch.
//! Exposes Connection, probe/probe_stream and the enode Target.

pub mod rlp;
pub mod message;
pub mod handshake;
pub mod codec;
pub mod capability;
pub mod dispatch;
pub mod eth;
pub mod connection;
pub mod enode;
pub mod discovery;
pub mod transport;

pub use codec::RlpxCodec;
pub use connection::{probe, probe_stream, Connection, ProbeOutcome};
pub use enode::Target;
pub use message::DisconnectReason;
