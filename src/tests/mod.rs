//! Test module for the prober.
//!
//! - Integration tests (full probes over in-memory streams against a mock responder)
//! - Fuzz tests (decoders and the frame transport fed random bytes)

pub mod integration;
pub mod fuzz;
