//! Latency trends backed by HDR Histogram.
//!
//! Every latency metric (`food_autocomplete_duration_ms`, ...) is a trend:
//! an append-only histogram from which percentiles are read at run end.
//! All latencies are stored in microseconds.

use hdrhistogram::Histogram;
use lru::LruCache;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Highest trackable latency (60 s) in microseconds.
const MAX_LATENCY_US: u64 = 60_000_000;

/// Percentile statistics for a set of latency measurements.
#[derive(Debug, Clone, PartialEq)]
pub struct PercentileStats {
    /// Number of samples
    pub count: u64,

    /// Minimum value (microseconds)
    pub min: u64,

    /// Maximum value (microseconds)
    pub max: u64,

    /// Mean value (microseconds)
    pub mean: f64,

    pub p50: u64,
    pub p90: u64,
    pub p95: u64,
    pub p99: u64,
}

impl PercentileStats {
    pub fn p95_ms(&self) -> f64 {
        self.p95 as f64 / 1000.0
    }

    /// Format as a compact table row.
    pub fn format_table_row(&self, label: &str) -> String {
        format!(
            "{:<36} {:>8} {:>9.2} {:>9.2} {:>9.2} {:>9.2} {:>9.2} {:>9.2}",
            label,
            self.count,
            self.p50 as f64 / 1000.0,
            self.p90 as f64 / 1000.0,
            self.p95 as f64 / 1000.0,
            self.p99 as f64 / 1000.0,
            self.mean / 1000.0,
            self.max as f64 / 1000.0,
        )
    }
}

/// Thread-safe latency histogram.
///
/// Tracks latencies from 1 µs to 60 s with 3 significant digits.
pub struct PercentileTracker {
    histogram: Mutex<Histogram<u64>>,
}

impl PercentileTracker {
    pub fn new() -> Self {
        // Constant bounds, always valid.
        let histogram =
            Histogram::new_with_bounds(1, MAX_LATENCY_US, 3).expect("Failed to create histogram");
        Self {
            histogram: Mutex::new(histogram),
        }
    }

    /// Record one latency. Values are clamped into the trackable range.
    pub fn record(&self, latency: Duration) {
        let latency_us = u64::try_from(latency.as_micros()).unwrap_or(MAX_LATENCY_US);
        let clamped = latency_us.clamp(1, MAX_LATENCY_US);

        let mut hist = self.histogram.lock().unwrap();
        if let Err(e) = hist.record(clamped) {
            warn!(latency_us, error = %e, "Failed to record latency in histogram");
        }
    }

    /// Current statistics, or `None` when nothing was recorded.
    pub fn stats(&self) -> Option<PercentileStats> {
        let hist = self.histogram.lock().unwrap();

        if hist.is_empty() {
            return None;
        }

        Some(PercentileStats {
            count: hist.len(),
            min: hist.min(),
            max: hist.max(),
            mean: hist.mean(),
            p50: hist.value_at_quantile(0.50),
            p90: hist.value_at_quantile(0.90),
            p95: hist.value_at_quantile(0.95),
            p99: hist.value_at_quantile(0.99),
        })
    }
}

impl Default for PercentileTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Histograms keyed by label, bounded by LRU eviction.
pub struct MultiLabelPercentileTracker {
    trackers: Mutex<LruCache<String, PercentileTracker>>,
    max_labels: usize,
}

impl MultiLabelPercentileTracker {
    /// When the limit is reached the least recently used label is evicted.
    pub fn new_with_limit(max_labels: usize) -> Self {
        let capacity = NonZeroUsize::new(max_labels).unwrap_or(NonZeroUsize::MIN);
        Self {
            trackers: Mutex::new(LruCache::new(capacity)),
            max_labels: capacity.get(),
        }
    }

    pub fn new() -> Self {
        Self::new_with_limit(100)
    }

    /// Record a latency for `label`, creating the histogram on first use.
    pub fn record(&self, label: &str, latency: Duration) {
        let mut trackers = self.trackers.lock().unwrap();

        if !trackers.contains(label) {
            if trackers.len() >= self.max_labels {
                debug!(
                    label = label,
                    max_labels = self.max_labels,
                    "Histogram label limit reached, evicting least recently used label"
                );
                crate::metrics::HISTOGRAM_LABELS_EVICTED_TOTAL.inc();
            }
            trackers.put(label.to_string(), PercentileTracker::new());
        }

        if let Some(tracker) = trackers.get(label) {
            tracker.record(latency);
        }
    }

    /// Statistics for one label.
    pub fn stats(&self, label: &str) -> Option<PercentileStats> {
        let trackers = self.trackers.lock().unwrap();
        // peek() doesn't update LRU order
        trackers.peek(label).and_then(|t| t.stats())
    }

    /// Statistics for every label with samples, sorted by label.
    pub fn all_stats(&self) -> BTreeMap<String, PercentileStats> {
        let trackers = self.trackers.lock().unwrap();
        trackers
            .iter()
            .filter_map(|(label, tracker)| tracker.stats().map(|s| (label.clone(), s)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.trackers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.lock().unwrap().is_empty()
    }
}

impl Default for MultiLabelPercentileTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Format percentile statistics as a table.
pub fn format_percentile_table(title: &str, stats_map: &BTreeMap<String, PercentileStats>) -> String {
    if stats_map.is_empty() {
        return format!("## {}\n\nNo data available.\n", title);
    }

    let mut output = String::new();
    output.push_str(&format!("\n## {}\n\n", title));
    output.push_str(&format!(
        "{:<36} {:>8} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9}\n",
        "Metric", "Count", "P50(ms)", "P90(ms)", "P95(ms)", "P99(ms)", "Mean(ms)", "Max(ms)"
    ));
    output.push_str(&"-".repeat(108));
    output.push('\n');

    for (label, stats) in stats_map {
        output.push_str(&stats.format_table_row(label));
        output.push('\n');
    }

    output
}
