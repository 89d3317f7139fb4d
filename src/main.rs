use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use finance_loadtest::client::build_client;
use finance_loadtest::config::{Config, LogFormat};
use finance_loadtest::executor::ScenarioExecutor;
use finance_loadtest::metrics::{
    gather_metrics_string, register_metrics, start_metrics_server, MetricsSink,
};
use finance_loadtest::plan::ExecutionPlan;
use finance_loadtest::report::{evaluate, render_summary};
use finance_loadtest::scenario::ScenarioKind;
use finance_loadtest::worker::run_plan;

/// Prints helpful configuration documentation.
fn print_config_help() {
    eprintln!("Target:");
    eprintln!("  BASE_URL                - API base URL (default: http://localhost:8080)");
    eprintln!("  JWT_TOKEN               - Bearer token, required by every scenario except food_autocomplete");
    eprintln!();
    eprintln!("Query parameters:");
    eprintln!("  START_DATE, END_DATE    - Query window, YYYY-MM-DD (default: 2025-01-01 .. 2025-03-31)");
    eprintln!("  DAILY_DATE              - Daily budget date (default: 2025-02-15)");
    eprintln!("  BUDGET_YEAR, BUDGET_MONTH - Monthly budget month (default: 2025, 02)");
    eprintln!("  FOOD_KEYWORDS           - Autocomplete keywords (default: PERF,BURGER,NOODLE)");
    eprintln!("  AUTOCOMPLETE_LIMIT      - Autocomplete limit (default: 10)");
    eprintln!("  EXP_PAGE_SIZE           - Expenditure list page size (default: 50)");
    eprintln!();
    eprintln!("Payloads:");
    eprintln!("  EXP_AMOUNT_MIN/MAX, EXP_CATEGORY_MIN/MAX, EXP_DATE_START/END, EXP_ITEM_COUNT");
    eprintln!("  MEAL_TYPES, STORE_NAMES");
    eprintln!("  RECO_LATITUDE, RECO_LONGITUDE, RECO_COORD_JITTER, RECO_RADIUS, RECO_LIMIT");
    eprintln!("  RECO_SORT_OPTIONS, RECO_KEYWORDS, RECO_INCLUDE_DISLIKED, RECO_OPEN_NOW");
    eprintln!("  BUDGET_MONTHLY_MIN/MAX, BUDGET_DAILY_MIN/MAX, BUDGET_APPLY_FORWARD");
    eprintln!();
    eprintln!("Load shape:");
    eprintln!("  SCENARIOS               - Comma-separated scenarios to run (default: all)");
    eprintln!("  TEST_DURATION           - Default scenario duration: 30s, 5m, 1h (default: 60s)");
    eprintln!("  HTTP_FAILURE_RATE_MAX   - Failed request rate bound (default: 0.01)");
    for kind in ScenarioKind::all() {
        let defaults = kind.default_policy();
        eprintln!(
            "  {:<22}  - {}: _RPS ({}), _VUS ({}), _DURATION, _P95_MS ({})",
            kind.env_prefix(),
            kind.name(),
            defaults.rate,
            defaults.pool_size,
            defaults.p95_ms
        );
    }
    eprintln!();
    eprintln!("HTTP client:");
    eprintln!("  REQUEST_TIMEOUT         - Request timeout (default: 30s)");
    eprintln!("  POOL_MAX_IDLE_PER_HOST  - Idle connections kept per host (default: 32)");
    eprintln!("  POOL_IDLE_TIMEOUT       - Idle connection lifetime (default: 30s)");
    eprintln!("  SKIP_TLS_VERIFY         - Skip TLS certificate verification (default: false)");
    eprintln!("  RESOLVE_TARGET_ADDR     - DNS override: hostname:ip:port");
    eprintln!("  CUSTOM_HEADERS          - Comma-separated headers (use \\, for literal commas)");
    eprintln!();
    eprintln!("Observability:");
    eprintln!("  METRICS_PORT            - Serve Prometheus metrics on this port (default: off)");
    eprintln!("  METRIC_NAMESPACE        - Prometheus metric namespace (default: finance_loadtest)");
    eprintln!("  LOG_FORMAT              - pretty or json (default: pretty)");
    eprintln!("  RUST_LOG                - Log filter (default: info)");
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load configuration from environment variables
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}\n", e);
            print_config_help();
            std::process::exit(1);
        }
    };

    init_tracing(config.log_format);

    // Register Prometheus metrics under the validated namespace
    register_metrics()?;

    let client_result = build_client(&config.to_client_config())?;
    config.print_summary(&client_result.parsed_headers);

    let registry_arc = Arc::new(Mutex::new(prometheus::default_registry().clone()));
    if let Some(port) = config.metrics_port {
        let registry = registry_arc.clone();
        tokio::spawn(async move {
            start_metrics_server(port, registry).await;
        });
    }

    let plan = ExecutionPlan::from_config(&config);
    let sink = Arc::new(MetricsSink::new());
    let executor = ScenarioExecutor::new(client_result.client, Arc::new(config), sink.clone());

    info!(
        scenarios = plan.entries.len(),
        duration_secs = plan.total_duration().as_secs_f64(),
        "Load test starting"
    );
    let workers = run_plan(&plan, executor).await;
    info!(workers = workers.len(), "Load test finished, evaluating thresholds");

    let verdict = evaluate(&plan, &sink);

    println!("\n--- FINAL METRICS ---\n{}", gather_metrics_string(&registry_arc));
    println!("--- END OF FINAL METRICS ---\n");
    println!("{}", render_summary(&plan, &sink, &verdict));

    std::process::exit(verdict.exit_code());
}
