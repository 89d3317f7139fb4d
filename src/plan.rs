//! Execution plan: which scenarios run, how hard, and what they must meet.
//!
//! Built once from [`Config`] before any worker starts and never mutated.

use std::time::Duration;

use crate::config::Config;
use crate::scenario::ScenarioKind;

/// Shortest interval a single worker may be paced at.
pub const MIN_WORKER_INTERVAL: Duration = Duration::from_micros(1);

/// `slots / rate` seconds, or `None` when that is not a representable duration.
fn slot_time(slots: f64, rate: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(slots / rate).ok()
}

/// Interval between two invocations of one worker in a pool of `pool_size`
/// sharing `rate` invocations per second.
///
/// `None` for rates that are not finite and positive, or whose interval falls
/// outside `[MIN_WORKER_INTERVAL, Duration::MAX]`.
pub fn pacing_interval(rate: f64, pool_size: usize) -> Option<Duration> {
    if !(rate.is_finite() && rate > 0.0) || pool_size == 0 {
        return None;
    }
    slot_time(pool_size as f64, rate).filter(|interval| *interval >= MIN_WORKER_INTERVAL)
}

/// Arrival-rate policy and latency bound of one scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanEntry {
    pub kind: ScenarioKind,

    /// Invocations started per second
    pub rate: f64,

    pub duration: Duration,

    /// Upper bound on simultaneous in-flight invocations
    pub pool_size: usize,

    /// Latency trend the threshold applies to
    pub metric: &'static str,

    pub p95_threshold_ms: f64,
}

impl PlanEntry {
    /// Interval between two invocations started by the same worker.
    pub fn worker_interval(&self) -> Option<Duration> {
        pacing_interval(self.rate, self.pool_size)
    }

    /// Start offset of worker `index` so the pool fires evenly.
    pub fn worker_offset(&self, index: usize) -> Option<Duration> {
        self.worker_interval()?;
        slot_time(index as f64, self.rate)
    }

    /// Invocations a perfectly paced run would start.
    pub fn expected_invocations(&self) -> u64 {
        (self.rate * self.duration.as_secs_f64()).floor() as u64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    pub entries: Vec<PlanEntry>,

    /// Upper bound (exclusive) on the run-wide failed request rate
    pub failure_rate_max: f64,
}

impl ExecutionPlan {
    pub fn from_config(config: &Config) -> Self {
        let entries = config
            .enabled
            .iter()
            .map(|&kind| {
                let knobs = config.knobs(kind);
                PlanEntry {
                    kind,
                    rate: knobs.rate,
                    duration: knobs.duration,
                    pool_size: knobs.pool_size,
                    metric: kind.metric_name(),
                    p95_threshold_ms: knobs.p95_ms,
                }
            })
            .collect();

        Self {
            entries,
            failure_rate_max: config.failure_rate_max,
        }
    }

    /// The longest scenario duration.
    pub fn total_duration(&self) -> Duration {
        self.entries
            .iter()
            .map(|e| e.duration)
            .max()
            .unwrap_or(Duration::ZERO)
    }

    pub fn entry(&self, kind: ScenarioKind) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| e.kind == kind)
    }
}
