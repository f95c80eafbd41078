//! Metrics primitives (spec §10 ambient).
//!
//! Grounded on the teacher's dashboard `Counter`/`Gauge`/`HistogramData`
//! shape (`mofa-monitoring::dashboard::metrics`): atomics under a name and
//! label set, collected into snapshots rather than pushed eagerly. The web
//! dashboard/REST/WebSocket surface those metrics fed isn't carried over —
//! spec §6 puts the HTTP surface out of scope — only the collection types
//! survive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub struct Counter {
    name: String,
    labels: HashMap<String, String>,
    value: AtomicU64,
}

impl Counter {
    pub fn new(name: impl Into<String>, labels: HashMap<String, String>) -> Self {
        Self { name: name.into(), labels, value: AtomicU64::new(0) }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

pub struct Gauge {
    name: String,
    labels: HashMap<String, String>,
    value: AtomicI64,
}

impl Gauge {
    pub fn new(name: impl Into<String>, labels: HashMap<String, String>) -> Self {
        Self { name: name.into(), labels, value: AtomicI64::new(0) }
    }

    pub fn set(&self, v: i64) {
        self.value.store(v, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

pub struct Histogram {
    name: String,
    labels: HashMap<String, String>,
    inner: Mutex<HistogramSnapshot>,
}

impl Histogram {
    pub fn new(name: impl Into<String>, labels: HashMap<String, String>) -> Self {
        Self { name: name.into(), labels, inner: Mutex::new(HistogramSnapshot::default()) }
    }

    pub fn observe(&self, value: f64) {
        let mut snap = self.inner.lock();
        snap.count += 1;
        snap.sum += value;
        snap.min = if snap.count == 1 { value } else { snap.min.min(value) };
        snap.max = snap.max.max(value);
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        self.inner.lock().clone()
    }

    pub fn mean(&self) -> f64 {
        let snap = self.inner.lock();
        if snap.count == 0 {
            0.0
        } else {
            snap.sum / snap.count as f64
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub counters: HashMap<String, u64>,
    pub gauges: HashMap<String, i64>,
    pub histograms: HashMap<String, HistogramSnapshot>,
}

/// Process-wide registry of named metrics. One instance lives on
/// `AppState`, constructed once by the composition root and shared by
/// `Arc` the way the teacher's `MetricsRegistry` is.
#[derive(Default)]
pub struct MetricsRegistry {
    counters: dashmap::DashMap<String, std::sync::Arc<Counter>>,
    gauges: dashmap::DashMap<String, std::sync::Arc<Gauge>>,
    histograms: dashmap::DashMap<String, std::sync::Arc<Histogram>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> std::sync::Arc<Counter> {
        self.counters
            .entry(name.to_string())
            .or_insert_with(|| std::sync::Arc::new(Counter::new(name, HashMap::new())))
            .clone()
    }

    pub fn gauge(&self, name: &str) -> std::sync::Arc<Gauge> {
        self.gauges
            .entry(name.to_string())
            .or_insert_with(|| std::sync::Arc::new(Gauge::new(name, HashMap::new())))
            .clone()
    }

    pub fn histogram(&self, name: &str) -> std::sync::Arc<Histogram> {
        self.histograms
            .entry(name.to_string())
            .or_insert_with(|| std::sync::Arc::new(Histogram::new(name, HashMap::new())))
            .clone()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self.counters.iter().map(|e| (e.key().clone(), e.value().get())).collect(),
            gauges: self.gauges.iter().map(|e| (e.key().clone(), e.value().get())).collect(),
            histograms: self.histograms.iter().map(|e| (e.key().clone(), e.value().snapshot())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates() {
        let registry = MetricsRegistry::new();
        registry.counter("requests_total").inc_by(3);
        registry.counter("requests_total").inc();
        assert_eq!(registry.snapshot().counters["requests_total"], 4);
    }

    #[test]
    fn histogram_tracks_min_max_mean() {
        let registry = MetricsRegistry::new();
        let h = registry.histogram("latency_ms");
        h.observe(10.0);
        h.observe(30.0);
        h.observe(20.0);
        assert_eq!(h.mean(), 20.0);
        let snap = h.snapshot();
        assert_eq!(snap.min, 10.0);
        assert_eq!(snap.max, 30.0);
    }

    #[test]
    fn gauge_overwrites() {
        let registry = MetricsRegistry::new();
        registry.gauge("in_flight").set(5);
        registry.gauge("in_flight").set(2);
        assert_eq!(registry.snapshot().gauges["in_flight"], 2);
    }
}
