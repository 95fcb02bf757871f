//! Observability (C11) — structured metrics registry.
//!
//! Counters (published, delivered, acked, nacked, dlq), histograms (handler
//! latency, publish latency, retrieval latency, decision latency), and
//! gauges (WAL bytes, in-flight per group) as enumerated in spec §4.11.
//! Deliberately dependency-light: no external exporter, since scraping and
//! export are out of scope (§1 Non-goals / HTTP API surface).

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use parking_lot::Mutex;

/// A single labeled counter/gauge/histogram series.
#[derive(Debug, Default)]
struct Histogram {
    count: AtomicU64,
    sum_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl Histogram {
    fn record(&self, ms: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_ms.fetch_add(ms, Ordering::Relaxed);
        self.max_ms.fetch_max(ms, Ordering::Relaxed);
    }

    fn snapshot(&self) -> HistogramSnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let sum = self.sum_ms.load(Ordering::Relaxed);
        HistogramSnapshot {
            count,
            mean_ms: if count == 0 { 0.0 } else { sum as f64 / count as f64 },
            max_ms: self.max_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub mean_ms: f64,
    pub max_ms: u64,
}

/// Process-lifetime metrics registry. One instance is owned by
/// [`crate::CoreContext`] and shared (read-only handles) across subsystems.
#[derive(Debug, Default)]
pub struct Metrics {
    counters: Mutex<HashMap<&'static str, u64>>,
    gauges: Mutex<HashMap<&'static str, i64>>,
    histograms: Mutex<HashMap<&'static str, std::sync::Arc<Histogram>>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&self, name: &'static str) {
        self.incr_by(name, 1);
    }

    pub fn incr_by(&self, name: &'static str, n: u64) {
        *self.counters.lock().entry(name).or_insert(0) += n;
    }

    pub fn set_gauge(&self, name: &'static str, value: i64) {
        self.gauges.lock().insert(name, value);
    }

    pub fn add_gauge(&self, name: &'static str, delta: i64) {
        let mut gauges = self.gauges.lock();
        let entry = gauges.entry(name).or_insert(0);
        *entry += delta;
    }

    pub fn observe(&self, name: &'static str, duration: std::time::Duration) {
        let ms = duration.as_millis() as u64;
        let hist = self
            .histograms
            .lock()
            .entry(name)
            .or_insert_with(|| std::sync::Arc::new(Histogram::default()))
            .clone();
        hist.record(ms);
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    pub fn gauge(&self, name: &str) -> i64 {
        self.gauges.lock().get(name).copied().unwrap_or(0)
    }

    pub fn histogram(&self, name: &str) -> HistogramSnapshot {
        self.histograms
            .lock()
            .get(name)
            .map(|h| h.snapshot())
            .unwrap_or(HistogramSnapshot {
                count: 0,
                mean_ms: 0.0,
                max_ms: 0,
            })
    }

    /// A point-in-time snapshot of every recorded series, consumed by
    /// `familycore space verify` and by tests.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self.counters.lock().clone(),
            gauges: self.gauges.lock().clone(),
        }
    }
}

/// The atomic counter used for per-record timings on the bus
/// (`accepted_ts`, `delivered_ts`, `acked_ts` deltas).
#[derive(Debug, Default)]
pub struct RecordTimings {
    pub accepted_ms_since_epoch: AtomicI64,
    pub delivered_ms_since_epoch: AtomicI64,
    pub acked_ms_since_epoch: AtomicI64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub counters: HashMap<&'static str, u64>,
    pub gauges: HashMap<&'static str, i64>,
}
