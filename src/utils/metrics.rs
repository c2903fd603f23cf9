use std::collections::HashMap;
use std::sync::Arc;
use lazy_static::lazy_static;
use parking_lot::Mutex;

pub const PROBE_SUCCESS: &str = "probe.success";
pub const PROBE_FAILURE: &str = "probe.failure";
pub const FRAMES_RECEIVED: &str = "frames.received";
pub const FRAMES_SENT: &str = "frames.sent";

/// Process-wide probe counters.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    counters: Arc<Mutex<HashMap<String, u64>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_counter(&self, name: &str) {
        let mut counters = self.counters.lock();
        *counters.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }
}

lazy_static! {
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}
