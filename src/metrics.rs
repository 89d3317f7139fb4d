use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use prometheus::{
    Encoder, Gauge, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{error, info};

use crate::executor::StepResult;
use crate::percentiles::{MultiLabelPercentileTracker, PercentileStats};
use crate::scenario::ScenarioKind;

lazy_static::lazy_static! {
    pub static ref METRIC_NAMESPACE: String = crate::config::metric_namespace_from_env();

    // === Request Metrics ===

    pub static ref REQUESTS_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("requests_total", "Total number of HTTP requests by status code")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["scenario", "step", "status_code"]
        ).unwrap();

    pub static ref REQUESTS_FAILED_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("requests_failed_total", "HTTP requests whose status was not accepted, by error category")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["scenario", "step", "category"]
        ).unwrap();

    pub static ref REQUEST_DURATION_SECONDS: HistogramVec =
        HistogramVec::new(
            HistogramOpts::new(
                "request_duration_seconds",
                "HTTP request latencies in seconds"
            ).namespace(METRIC_NAMESPACE.as_str()),
            &["scenario", "step"]
        ).unwrap();

    pub static ref CHECKS_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("checks_total", "Status checks by outcome")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["check", "result"]  // result: passed, failed
        ).unwrap();

    // === Scenario Metrics ===

    pub static ref SCENARIO_INVOCATIONS_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("scenario_invocations_total", "Total number of scenario invocations")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["scenario"]
        ).unwrap();

    pub static ref SCENARIO_STEPS_SKIPPED_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("scenario_steps_skipped_total", "Chain steps skipped because an earlier step produced nothing to act on")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["scenario", "step"]
        ).unwrap();

    pub static ref DROPPED_ITERATIONS_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("dropped_iterations_total", "Scheduled invocations not started because the worker was busy")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["scenario"]
        ).unwrap();

    pub static ref CONFIG_ERRORS_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("config_errors_total", "Invocations refused because of a configuration error")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["scenario"]
        ).unwrap();

    pub static ref CONCURRENT_INVOCATIONS: Gauge =
        Gauge::with_opts(
            Opts::new("concurrent_invocations", "Number of scenario invocations currently in flight")
                .namespace(METRIC_NAMESPACE.as_str())
        ).unwrap();

    pub static ref WORKER_FAILURES_TOTAL: IntCounter =
        IntCounter::with_opts(
            Opts::new("worker_failures_total", "Scenario worker tasks that ended in a panic")
                .namespace(METRIC_NAMESPACE.as_str())
        ).unwrap();

    pub static ref HISTOGRAM_LABELS_EVICTED_TOTAL: IntCounter =
        IntCounter::with_opts(
            Opts::new("histogram_labels_evicted_total", "Latency histograms evicted by the label limit")
                .namespace(METRIC_NAMESPACE.as_str())
        ).unwrap();
}

/// Registers all metrics with the default Prometheus registry.
pub fn register_metrics() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let registry = prometheus::default_registry();

    // Request metrics
    registry.register(Box::new(REQUESTS_TOTAL.clone()))?;
    registry.register(Box::new(REQUESTS_FAILED_TOTAL.clone()))?;
    registry.register(Box::new(REQUEST_DURATION_SECONDS.clone()))?;
    registry.register(Box::new(CHECKS_TOTAL.clone()))?;

    // Scenario metrics
    registry.register(Box::new(SCENARIO_INVOCATIONS_TOTAL.clone()))?;
    registry.register(Box::new(SCENARIO_STEPS_SKIPPED_TOTAL.clone()))?;
    registry.register(Box::new(DROPPED_ITERATIONS_TOTAL.clone()))?;
    registry.register(Box::new(CONFIG_ERRORS_TOTAL.clone()))?;
    registry.register(Box::new(CONCURRENT_INVOCATIONS.clone()))?;
    registry.register(Box::new(WORKER_FAILURES_TOTAL.clone()))?;
    registry.register(Box::new(HISTOGRAM_LABELS_EVICTED_TOTAL.clone()))?;

    Ok(())
}

fn encode_registry(registry: &Mutex<Registry>) -> Result<Vec<u8>, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = registry.lock().unwrap().gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(buffer)
}

/// HTTP handler for the Prometheus metrics endpoint.
pub async fn metrics_handler(
    _req: Request<Body>,
    registry: Arc<Mutex<Registry>>,
) -> Result<Response<Body>, hyper::Error> {
    let response = match encode_registry(&registry) {
        Ok(buffer) => {
            let mut response = Response::new(Body::from(buffer));
            response.headers_mut().insert(
                hyper::header::CONTENT_TYPE,
                hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            let mut response = Response::new(Body::from("failed to encode metrics"));
            *response.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    };

    Ok(response)
}

/// Starts the Prometheus metrics HTTP server.
pub async fn start_metrics_server(port: u16, registry: Arc<Mutex<Registry>>) {
    let addr = ([0, 0, 0, 0], port).into();

    let make_svc = make_service_fn(move |_conn| {
        let registry_clone = registry.clone();
        async move {
            Ok::<_, hyper::Error>(service_fn(move |req| {
                let registry_clone_inner = registry_clone.clone();
                async move { metrics_handler(req, registry_clone_inner).await }
            }))
        }
    });

    let server = match Server::try_bind(&addr) {
        Ok(builder) => builder.serve(make_svc),
        Err(e) => {
            error!(port = port, error = %e, "Failed to bind metrics server");
            return;
        }
    };
    info!(
        port = port,
        addr = %addr,
        "Metrics server listening"
    );

    if let Err(e) = server.await {
        error!(error = %e, "Metrics server error");
    }
}

/// Gathers and encodes metrics as a string for final output.
pub fn gather_metrics_string(registry: &Arc<Mutex<Registry>>) -> String {
    match encode_registry(registry) {
        Ok(buffer) => String::from_utf8(buffer).unwrap_or_else(|e| {
            error!(error = %e, "Error encoding metrics to UTF-8");
            String::from("# ERROR ENCODING METRICS TO UTF-8")
        }),
        Err(e) => {
            error!(error = %e, "Error encoding metrics");
            String::from("# ERROR ENCODING METRICS")
        }
    }
}

/// Returns a static label for common status codes.
///
/// Uncommon codes fall back to "other" rather than allocating a unique label.
fn status_code_label(code: Option<u16>) -> &'static str {
    match code {
        None => "error",
        Some(200) => "200",
        Some(201) => "201",
        Some(204) => "204",
        Some(400) => "400",
        Some(401) => "401",
        Some(403) => "403",
        Some(404) => "404",
        Some(409) => "409",
        Some(422) => "422",
        Some(429) => "429",
        Some(500) => "500",
        Some(502) => "502",
        Some(503) => "503",
        Some(504) => "504",
        Some(_) => "other",
    }
}

/// Pass/fail tally of one named check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckCount {
    pub passed: u64,
    pub failed: u64,
}

impl CheckCount {
    pub fn total(&self) -> u64 {
        self.passed + self.failed
    }

    /// Percentage of passed checks, 100 when nothing was checked.
    pub fn pass_rate(&self) -> f64 {
        if self.total() == 0 {
            100.0
        } else {
            self.passed as f64 * 100.0 / self.total() as f64
        }
    }
}

/// Per-scenario counters that are not latencies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScenarioCounters {
    pub invocations: u64,
    pub skipped_steps: u64,
    pub dropped_iterations: u64,
    pub config_errors: u64,
}

/// Run-wide aggregation point for everything the scenarios measure.
///
/// One instance is shared by `Arc` between all workers. Every write is also
/// mirrored into the Prometheus collectors above.
pub struct MetricsSink {
    trends: MultiLabelPercentileTracker,
    steps: MultiLabelPercentileTracker,
    checks: Mutex<BTreeMap<String, CheckCount>>,
    counters: Mutex<BTreeMap<ScenarioKind, ScenarioCounters>>,
    http_requests: AtomicU64,
    http_failed: AtomicU64,
    worker_failures: AtomicU64,
}

impl MetricsSink {
    pub fn new() -> Self {
        Self {
            trends: MultiLabelPercentileTracker::new(),
            steps: MultiLabelPercentileTracker::new(),
            checks: Mutex::new(BTreeMap::new()),
            counters: Mutex::new(BTreeMap::new()),
            http_requests: AtomicU64::new(0),
            http_failed: AtomicU64::new(0),
            worker_failures: AtomicU64::new(0),
        }
    }

    /// Records one HTTP step: its latency trend, its check and the request counters.
    pub fn record_step(&self, scenario: ScenarioKind, result: &StepResult) {
        let scenario_name = scenario.name();

        self.trends.record(scenario.metric_name(), result.latency);
        self.steps
            .record(&format!("{}:{}", scenario_name, result.step_name), result.latency);

        REQUEST_DURATION_SECONDS
            .with_label_values(&[scenario_name, &result.step_name])
            .observe(result.latency.as_secs_f64());
        REQUESTS_TOTAL
            .with_label_values(&[
                scenario_name,
                &result.step_name,
                status_code_label(result.status_code),
            ])
            .inc();
        self.http_requests.fetch_add(1, Ordering::Relaxed);

        if let Some(category) = result.error_category {
            self.http_failed.fetch_add(1, Ordering::Relaxed);
            REQUESTS_FAILED_TOTAL
                .with_label_values(&[scenario_name, &result.step_name, category.label()])
                .inc();
        }

        self.record_check(&result.check, result.success);
    }

    /// Records a named check outcome.
    pub fn record_check(&self, check: &str, passed: bool) {
        {
            let mut checks = self.checks.lock().unwrap();
            let count = checks.entry(check.to_string()).or_default();
            if passed {
                count.passed += 1;
            } else {
                count.failed += 1;
            }
        }

        let result_label = if passed { "passed" } else { "failed" };
        CHECKS_TOTAL.with_label_values(&[check, result_label]).inc();
    }

    pub fn record_invocation(&self, scenario: ScenarioKind) {
        self.update_counters(scenario, |c| c.invocations += 1);
        SCENARIO_INVOCATIONS_TOTAL
            .with_label_values(&[scenario.name()])
            .inc();
    }

    pub fn record_skipped(&self, scenario: ScenarioKind, step: &str) {
        self.update_counters(scenario, |c| c.skipped_steps += 1);
        SCENARIO_STEPS_SKIPPED_TOTAL
            .with_label_values(&[scenario.name(), step])
            .inc();
    }

    pub fn record_dropped(&self, scenario: ScenarioKind, count: u64) {
        if count == 0 {
            return;
        }
        self.update_counters(scenario, |c| c.dropped_iterations += count);
        DROPPED_ITERATIONS_TOTAL
            .with_label_values(&[scenario.name()])
            .inc_by(count);
    }

    pub fn record_config_error(&self, scenario: ScenarioKind) {
        self.update_counters(scenario, |c| c.config_errors += 1);
        CONFIG_ERRORS_TOTAL
            .with_label_values(&[scenario.name()])
            .inc();
    }

    /// A worker task died before reporting its summary.
    pub fn record_worker_failure(&self) {
        self.worker_failures.fetch_add(1, Ordering::Relaxed);
        WORKER_FAILURES_TOTAL.inc();
    }

    fn update_counters(&self, scenario: ScenarioKind, update: impl FnOnce(&mut ScenarioCounters)) {
        let mut counters = self.counters.lock().unwrap();
        update(counters.entry(scenario).or_default());
    }

    /// Latency statistics of one trend metric.
    pub fn trend_stats(&self, metric: &str) -> Option<PercentileStats> {
        self.trends.stats(metric)
    }

    pub fn all_trend_stats(&self) -> BTreeMap<String, PercentileStats> {
        self.trends.all_stats()
    }

    /// Latency statistics keyed by `scenario:step`.
    pub fn all_step_stats(&self) -> BTreeMap<String, PercentileStats> {
        self.steps.all_stats()
    }

    pub fn checks(&self) -> BTreeMap<String, CheckCount> {
        self.checks.lock().unwrap().clone()
    }

    pub fn counters(&self, scenario: ScenarioKind) -> ScenarioCounters {
        self.counters
            .lock()
            .unwrap()
            .get(&scenario)
            .copied()
            .unwrap_or_default()
    }

    pub fn total_config_errors(&self) -> u64 {
        self.counters
            .lock()
            .unwrap()
            .values()
            .map(|c| c.config_errors)
            .sum()
    }

    pub fn worker_failures(&self) -> u64 {
        self.worker_failures.load(Ordering::Relaxed)
    }

    /// `(total, failed)` HTTP requests.
    pub fn http_totals(&self) -> (u64, u64) {
        (
            self.http_requests.load(Ordering::Relaxed),
            self.http_failed.load(Ordering::Relaxed),
        )
    }

    /// Fraction of requests whose status was not accepted; 0 with no requests.
    pub fn failure_rate(&self) -> f64 {
        let (total, failed) = self.http_totals();
        if total == 0 {
            0.0
        } else {
            failed as f64 / total as f64
        }
    }
}

impl Default for MetricsSink {
    fn default() -> Self {
        Self::new()
    }
}
