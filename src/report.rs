//! Threshold evaluation and the end-of-run summary.

use std::fmt::Write as _;

use crate::metrics::MetricsSink;
use crate::percentiles::format_percentile_table;
use crate::plan::ExecutionPlan;

/// Exit status of a run that violated a threshold.
pub const THRESHOLD_FAILED_EXIT_CODE: i32 = 99;

/// Verdict on one threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdOutcome {
    /// e.g. `food_autocomplete_duration_ms p(95)<250`
    pub name: String,

    /// Observed value; `None` when nothing was sampled
    pub observed: Option<f64>,
    pub passed: bool,
}

/// All threshold verdicts of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunVerdict {
    pub thresholds: Vec<ThresholdOutcome>,
    pub config_errors: u64,

    /// Worker tasks that died without finishing their schedule
    pub failed_workers: u64,
}

impl RunVerdict {
    /// Healthy only if every threshold held, no invocation was refused
    /// for a configuration error and every worker finished.
    pub fn healthy(&self) -> bool {
        self.config_errors == 0
            && self.failed_workers == 0
            && self.thresholds.iter().all(|t| t.passed)
    }

    pub fn exit_code(&self) -> i32 {
        if self.healthy() {
            0
        } else {
            THRESHOLD_FAILED_EXIT_CODE
        }
    }
}

/// Judges the run recorded in `sink` against `plan`.
///
/// The failure rate must stay strictly below its bound. Each scenario's p95
/// must stay strictly below its bound; a scenario without samples passes.
pub fn evaluate(plan: &ExecutionPlan, sink: &MetricsSink) -> RunVerdict {
    let mut thresholds = Vec::with_capacity(plan.entries.len() + 1);

    let failure_rate = sink.failure_rate();
    thresholds.push(ThresholdOutcome {
        name: format!("http_req_failed rate<{}", plan.failure_rate_max),
        observed: Some(failure_rate),
        passed: failure_rate < plan.failure_rate_max,
    });

    for entry in &plan.entries {
        let observed = sink.trend_stats(entry.metric).map(|s| s.p95_ms());
        thresholds.push(ThresholdOutcome {
            name: format!("{} p(95)<{}", entry.metric, entry.p95_threshold_ms),
            observed,
            passed: observed.map_or(true, |p95| p95 < entry.p95_threshold_ms),
        });
    }

    RunVerdict {
        thresholds,
        config_errors: sink.total_config_errors(),
        failed_workers: sink.worker_failures(),
    }
}

/// Plain-text summary: latency tables, checks, counters and thresholds.
pub fn render_summary(plan: &ExecutionPlan, sink: &MetricsSink, verdict: &RunVerdict) -> String {
    let mut out = String::new();

    out.push_str(&format_percentile_table(
        "Scenario Latency",
        &sink.all_trend_stats(),
    ));
    out.push_str(&format_percentile_table("Step Latency", &sink.all_step_stats()));

    out.push_str("\n## Checks\n\n");
    let checks = sink.checks();
    if checks.is_empty() {
        out.push_str("No checks recorded.\n");
    }
    for (name, count) in &checks {
        let mark = if count.failed == 0 { '✓' } else { '✗' };
        let _ = writeln!(
            out,
            "{} {:<40} {:>6.2}% ({} passed, {} failed)",
            mark,
            name,
            count.pass_rate(),
            count.passed,
            count.failed
        );
    }

    out.push_str("\n## Scenarios\n\n");
    for entry in &plan.entries {
        let counters = sink.counters(entry.kind);
        let _ = writeln!(
            out,
            "{:<24} invocations={}/{} skipped_steps={} dropped={} config_errors={}",
            entry.kind.name(),
            counters.invocations,
            entry.expected_invocations(),
            counters.skipped_steps,
            counters.dropped_iterations,
            counters.config_errors
        );
    }

    let (total, failed) = sink.http_totals();
    let _ = writeln!(out, "\nhttp_reqs={} http_req_failed={}", total, failed);

    out.push_str("\n## Thresholds\n\n");
    for threshold in &verdict.thresholds {
        let mark = if threshold.passed { '✓' } else { '✗' };
        let observed = match threshold.observed {
            Some(value) => format!("{:.4}", value),
            None => "no samples".to_string(),
        };
        let _ = writeln!(out, "{} {} (observed: {})", mark, threshold.name, observed);
    }

    if verdict.config_errors > 0 {
        let _ = writeln!(
            out,
            "\n✗ {} invocation(s) refused for configuration errors",
            verdict.config_errors
        );
    }

    if verdict.failed_workers > 0 {
        let _ = writeln!(
            out,
            "\n✗ {} worker(s) failed before finishing their schedule",
            verdict.failed_workers
        );
    }

    let _ = writeln!(
        out,
        "\nResult: {}",
        if verdict.healthy() { "PASSED" } else { "FAILED" }
    );
    out
}
