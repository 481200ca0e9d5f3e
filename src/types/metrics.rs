use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

/// Tags attached to every metric emitted for a record.
pub type Dimensions = BTreeMap<String, String>;

/// Metrics backend. Calls are fire-and-forget and must never block the
/// evaluator for long.
pub trait MetricSender: Send + Sync {
    fn send_counter(&self, name: &str, delta: i64, dimensions: &Dimensions);
    fn send_gauge(&self, name: &str, value: f64, dimensions: &Dimensions);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricSender for NoopMetrics {
    fn send_counter(&self, _name: &str, _delta: i64, _dimensions: &Dimensions) {}
    fn send_gauge(&self, _name: &str, _value: f64, _dimensions: &Dimensions) {}
}

/// Emits every metric as a `tracing` debug event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMetrics;

impl MetricSender for LogMetrics {
    fn send_counter(&self, name: &str, delta: i64, dimensions: &Dimensions) {
        debug!(metric = name, delta, ?dimensions, "counter");
    }

    fn send_gauge(&self, name: &str, value: f64, dimensions: &Dimensions) {
        debug!(metric = name, value, ?dimensions, "gauge");
    }
}

/// A recorded gauge sample.
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeSample {
    pub value: f64,
    pub dimensions: Dimensions,
}

/// Thread-safe in-process metrics store.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: Mutex<HashMap<String, i64>>,
    gauges: Mutex<HashMap<String, Vec<GaugeSample>>>,
}

impl InMemoryMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of all deltas sent for `name`, across all dimensions.
    #[must_use]
    pub fn counter(&self, name: &str) -> i64 {
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters.get(name).copied().unwrap_or(0)
    }

    /// Every gauge sample sent for `name`, oldest first.
    #[must_use]
    pub fn gauges(&self, name: &str) -> Vec<GaugeSample> {
        let gauges = self.gauges.lock().unwrap_or_else(PoisonError::into_inner);
        gauges.get(name).cloned().unwrap_or_default()
    }
}

impl MetricSender for InMemoryMetrics {
    fn send_counter(&self, name: &str, delta: i64, _dimensions: &Dimensions) {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        *counters.entry(name.to_owned()).or_insert(0) += delta;
    }

    fn send_gauge(&self, name: &str, value: f64, dimensions: &Dimensions) {
        let mut gauges = self.gauges.lock().unwrap_or_else(PoisonError::into_inner);
        gauges.entry(name.to_owned()).or_default().push(GaugeSample {
            value,
            dimensions: dimensions.clone(),
        });
    }
}
