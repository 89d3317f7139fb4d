use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;
use thiserror::Error;
use tokio::time::Duration;

use crate::client::ClientConfig;
use crate::plan::pacing_interval;
use crate::scenario::ScenarioKind;
use crate::utils::{parse_duration_string, parse_list};

pub const DEFAULT_METRIC_NAMESPACE: &str = "finance_loadtest";

/// Upper bound on `EXP_ITEM_COUNT`.
pub const MAX_ITEM_COUNT: usize = 100;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Errors raised while resolving configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("JWT_TOKEN environment variable is required for secured scenarios.")]
    MissingToken,

    #[error("{var} must be a valid {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        value: String,
        expected: &'static str,
    },

    #[error("Invalid {var} '{value}': {message}")]
    InvalidDuration {
        var: String,
        value: String,
        message: String,
    },

    #[error("{name} range is empty: min {min} is greater than max {max}")]
    InvalidRange { name: String, min: i64, max: i64 },

    #[error("{var} must be greater than zero, got '{value}'")]
    NotPositive { var: String, value: String },

    #[error("BASE_URL must start with http:// or https://, got '{0}'")]
    InvalidBaseUrl(String),

    #[error("{0}")]
    UnknownScenario(String),
}

/// Inclusive integer range `[min, max]`. Never empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntRange {
    min: i64,
    max: i64,
}

impl IntRange {
    pub fn new(name: &str, min: i64, max: i64) -> Result<Self, ConfigError> {
        if min > max {
            return Err(ConfigError::InvalidRange {
                name: name.to_string(),
                min,
                max,
            });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    pub fn contains(&self, value: i64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Inclusive calendar range. `end <= start` is allowed and means "always `start`".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Query window and fixed dates used by the read scenarios.
#[derive(Debug, Clone)]
pub struct DateWindow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub daily_date: NaiveDate,
    pub budget_year: i32,
    pub budget_month: u32,
}

#[derive(Debug, Clone)]
pub struct FoodSearchConfig {
    pub keywords: Vec<String>,
    pub limit: u32,
}

#[derive(Debug, Clone)]
pub struct ExpenditureConfig {
    pub page_size: u32,
    pub amount: IntRange,
    pub dates: DateRange,
    pub category_id: IntRange,
    pub item_count: usize,
    pub meal_types: Vec<String>,
    pub store_names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RecommendationConfig {
    pub latitude: f64,
    pub longitude: f64,
    /// Jitter in micro-degrees, applied independently to each coordinate.
    pub coord_jitter: IntRange,
    pub radius_km: f64,
    pub limit: u32,
    pub sort_options: Vec<String>,
    pub keywords: Vec<String>,
    pub include_disliked: Option<bool>,
    pub open_now: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct BudgetConfig {
    pub monthly: IntRange,
    pub daily: IntRange,
    pub apply_forward: bool,
}

/// Per-scenario execution knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenarioKnobs {
    pub rate: f64,
    pub pool_size: usize,
    pub duration: Duration,
    pub p95_ms: f64,
}

/// HTTP client settings.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub request_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    pub skip_tls_verify: bool,
    pub resolve_target_addr: Option<String>,
    pub custom_headers: Option<String>,
}

/// Immutable configuration for one load test run.
///
/// Resolved once at startup and shared read-only (usually behind an `Arc`)
/// by every scenario invocation.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    token: Option<String>,
    pub window: DateWindow,
    pub food: FoodSearchConfig,
    pub expenditure: ExpenditureConfig,
    pub recommendation: RecommendationConfig,
    pub budget: BudgetConfig,
    pub scenarios: BTreeMap<ScenarioKind, ScenarioKnobs>,
    pub enabled: Vec<ScenarioKind>,
    pub test_duration: Duration,
    pub failure_rate_max: f64,
    pub client: ClientSettings,
    pub metrics_port: Option<u16>,
    pub metric_namespace: String,
    pub log_format: LogFormat,
}

/// Reads variables through a lookup function so tests can resolve
/// configuration without touching the process environment.
struct Resolver<F> {
    lookup: F,
}

impl<F> Resolver<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Unset and empty variables are the same thing.
    fn raw(&self, var: &str) -> Option<String> {
        (self.lookup)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, var: &str, default: &str) -> String {
        self.raw(var).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(
        &self,
        var: &str,
        default: T,
        expected: &'static str,
    ) -> Result<T, ConfigError> {
        match self.raw(var) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                var: var.to_string(),
                value,
                expected,
            }),
        }
    }

    fn positive<T>(&self, var: &str, default: T, expected: &'static str) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + Default + ToString,
    {
        let value = self.parse(var, default, expected)?;
        if value <= T::default() {
            return Err(ConfigError::NotPositive {
                var: var.to_string(),
                value: value.to_string(),
            });
        }
        Ok(value)
    }

    /// Floats parse `NaN` and `inf`; neither is a usable setting.
    fn finite(&self, var: &str, default: f64, expected: &'static str) -> Result<f64, ConfigError> {
        let value: f64 = self.parse(var, default, expected)?;
        if !value.is_finite() {
            return Err(ConfigError::InvalidValue {
                var: var.to_string(),
                value: value.to_string(),
                expected,
            });
        }
        Ok(value)
    }

    fn positive_f64(
        &self,
        var: &str,
        default: f64,
        expected: &'static str,
    ) -> Result<f64, ConfigError> {
        let value = self.finite(var, default, expected)?;
        if value <= 0.0 {
            return Err(ConfigError::NotPositive {
                var: var.to_string(),
                value: value.to_string(),
            });
        }
        Ok(value)
    }

    fn log_format(&self) -> Result<LogFormat, ConfigError> {
        match self.raw("LOG_FORMAT") {
            None => Ok(LogFormat::Pretty),
            Some(value) => match value.to_lowercase().as_str() {
                "pretty" => Ok(LogFormat::Pretty),
                "json" => Ok(LogFormat::Json),
                _ => Err(ConfigError::InvalidValue {
                    var: "LOG_FORMAT".to_string(),
                    value,
                    expected: "log format (pretty or json)",
                }),
            },
        }
    }

    /// Prometheus metric names allow `[a-zA-Z_:][a-zA-Z0-9_:]*`.
    fn metric_namespace(&self) -> Result<String, ConfigError> {
        let namespace = self.string("METRIC_NAMESPACE", DEFAULT_METRIC_NAMESPACE);
        let valid = namespace.chars().enumerate().all(|(i, c)| {
            c == '_' || c == ':' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit())
        });
        if !valid {
            return Err(ConfigError::InvalidValue {
                var: "METRIC_NAMESPACE".to_string(),
                value: namespace,
                expected: "Prometheus metric name prefix",
            });
        }
        Ok(namespace)
    }

    fn optional_bool(&self, var: &str) -> Result<Option<bool>, ConfigError> {
        match self.raw(var) {
            None => Ok(None),
            Some(value) => match value.to_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Some(true)),
                "false" | "0" | "no" => Ok(Some(false)),
                _ => Err(ConfigError::InvalidValue {
                    var: var.to_string(),
                    value,
                    expected: "boolean",
                }),
            },
        }
    }

    fn bool(&self, var: &str, default: bool) -> Result<bool, ConfigError> {
        Ok(self.optional_bool(var)?.unwrap_or(default))
    }

    fn date(&self, var: &str, default: NaiveDate) -> Result<NaiveDate, ConfigError> {
        match self.raw(var) {
            None => Ok(default),
            Some(value) => {
                NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(|_| {
                    ConfigError::InvalidValue {
                        var: var.to_string(),
                        value,
                        expected: "date (YYYY-MM-DD)",
                    }
                })
            }
        }
    }

    fn list(&self, var: &str, default: &str) -> Vec<String> {
        parse_list(&self.string(var, default))
    }

    fn duration(&self, var: &str, default: Duration) -> Result<Duration, ConfigError> {
        match self.raw(var) {
            None => Ok(default),
            Some(value) => {
                parse_duration_string(&value).map_err(|message| ConfigError::InvalidDuration {
                    var: var.to_string(),
                    value,
                    message,
                })
            }
        }
    }

    fn range(
        &self,
        name: &str,
        min_var: &str,
        max_var: &str,
        default: (i64, i64),
    ) -> Result<IntRange, ConfigError> {
        let min = self.parse(min_var, default.0, "integer")?;
        let max = self.parse(max_var, default.1, "integer")?;
        IntRange::new(name, min, max)
    }
}

/// Namespace of the Prometheus collectors, resolved from the process
/// environment like [`Config::from_env`] does. An invalid value falls back to
/// the default here; `from_env` reports it as an error at startup.
pub fn metric_namespace_from_env() -> String {
    let r = Resolver {
        lookup: |var: &str| env::var(var).ok(),
    };
    r.metric_namespace()
        .unwrap_or_else(|_| DEFAULT_METRIC_NAMESPACE.to_string())
}

fn fixed_date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Loads configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let r = Resolver { lookup };

        let base_url = r
            .string("BASE_URL", "http://localhost:8080")
            .trim_end_matches('/')
            .to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::InvalidBaseUrl(base_url));
        }

        let token = r.raw("JWT_TOKEN");

        let start_date = r.date("START_DATE", fixed_date(2025, 1, 1))?;
        let end_date = r.date("END_DATE", fixed_date(2025, 3, 31))?;
        let budget_month: u32 = r.parse("BUDGET_MONTH", 2, "month number")?;
        if !(1..=12).contains(&budget_month) {
            return Err(ConfigError::InvalidValue {
                var: "BUDGET_MONTH".to_string(),
                value: budget_month.to_string(),
                expected: "month number (1-12)",
            });
        }
        let window = DateWindow {
            start_date,
            end_date,
            daily_date: r.date("DAILY_DATE", fixed_date(2025, 2, 15))?,
            budget_year: r.parse("BUDGET_YEAR", 2025, "year")?,
            budget_month,
        };

        let food = FoodSearchConfig {
            keywords: r.list("FOOD_KEYWORDS", "PERF,BURGER,NOODLE"),
            limit: r.positive("AUTOCOMPLETE_LIMIT", 10, "positive integer")?,
        };

        let expenditure = ExpenditureConfig {
            page_size: r.positive("EXP_PAGE_SIZE", 50, "positive integer")?,
            amount: r.range("expenditure amount", "EXP_AMOUNT_MIN", "EXP_AMOUNT_MAX", (5_000, 45_000))?,
            dates: DateRange {
                start: r.date("EXP_DATE_START", start_date)?,
                end: r.date("EXP_DATE_END", end_date)?,
            },
            category_id: r.range("category id", "EXP_CATEGORY_MIN", "EXP_CATEGORY_MAX", (1, 10))?,
            item_count: r.positive("EXP_ITEM_COUNT", 1, "positive integer")?,
            meal_types: r.list("MEAL_TYPES", "BREAKFAST,LUNCH,DINNER,OTHER"),
            store_names: r.list("STORE_NAMES", "PERF Kimbap,PERF Burger,PERF Noodle"),
        };

        // Every item must carry a positive price even for the smallest amount.
        let item_limit = usize::try_from(expenditure.amount.min())
            .unwrap_or(0)
            .min(MAX_ITEM_COUNT);
        if expenditure.item_count > item_limit {
            return Err(ConfigError::InvalidValue {
                var: "EXP_ITEM_COUNT".to_string(),
                value: expenditure.item_count.to_string(),
                expected: "item count no larger than EXP_AMOUNT_MIN or 100",
            });
        }

        let jitter: i64 = r.parse("RECO_COORD_JITTER", 5_000, "integer")?;
        let jitter = jitter.checked_abs().ok_or_else(|| ConfigError::InvalidValue {
            var: "RECO_COORD_JITTER".to_string(),
            value: jitter.to_string(),
            expected: "integer in micro-degrees",
        })?;
        let recommendation = RecommendationConfig {
            latitude: r.finite("RECO_LATITUDE", 37.5665, "latitude")?,
            longitude: r.finite("RECO_LONGITUDE", 126.9780, "longitude")?,
            coord_jitter: IntRange::new("coordinate jitter", -jitter, jitter)?,
            radius_km: r.positive_f64("RECO_RADIUS", 1.0, "radius in km")?,
            limit: r.positive("RECO_LIMIT", 20, "positive integer")?,
            sort_options: r.list("RECO_SORT_OPTIONS", "SCORE,DISTANCE,REVIEW,PRICE_LOW"),
            keywords: r.list("RECO_KEYWORDS", ""),
            include_disliked: r.optional_bool("RECO_INCLUDE_DISLIKED")?,
            open_now: r.optional_bool("RECO_OPEN_NOW")?,
        };

        let budget = BudgetConfig {
            monthly: r.range("monthly budget", "BUDGET_MONTHLY_MIN", "BUDGET_MONTHLY_MAX", (200_000, 600_000))?,
            daily: r.range("daily budget", "BUDGET_DAILY_MIN", "BUDGET_DAILY_MAX", (8_000, 25_000))?,
            apply_forward: r.bool("BUDGET_APPLY_FORWARD", false)?,
        };

        let test_duration = r.duration("TEST_DURATION", Duration::from_secs(60))?;

        let mut scenarios = BTreeMap::new();
        for kind in ScenarioKind::all() {
            let defaults = kind.default_policy();
            let prefix = kind.env_prefix();
            let rate_var = format!("{}_RPS", prefix);
            let knobs = ScenarioKnobs {
                rate: r.positive_f64(&rate_var, defaults.rate, "rate per second")?,
                pool_size: r.positive(&format!("{}_VUS", prefix), defaults.pool_size, "pool size")?,
                duration: r.duration(&format!("{}_DURATION", prefix), test_duration)?,
                p95_ms: r.positive_f64(&format!("{}_P95_MS", prefix), defaults.p95_ms, "milliseconds")?,
            };
            if pacing_interval(knobs.rate, knobs.pool_size).is_none() {
                return Err(ConfigError::InvalidValue {
                    var: rate_var,
                    value: knobs.rate.to_string(),
                    expected: "rate whose per-worker interval is at least 1µs",
                });
            }
            scenarios.insert(kind, knobs);
        }

        let enabled = match r.raw("SCENARIOS") {
            None => ScenarioKind::all(),
            Some(value) => {
                let mut kinds = Vec::new();
                for name in parse_list(&value) {
                    let kind = name
                        .parse::<ScenarioKind>()
                        .map_err(ConfigError::UnknownScenario)?;
                    if !kinds.contains(&kind) {
                        kinds.push(kind);
                    }
                }
                kinds
            }
        };

        let failure_rate_max: f64 = r.parse("HTTP_FAILURE_RATE_MAX", 0.01, "rate between 0 and 1")?;
        if !(0.0..=1.0).contains(&failure_rate_max) {
            return Err(ConfigError::InvalidValue {
                var: "HTTP_FAILURE_RATE_MAX".to_string(),
                value: failure_rate_max.to_string(),
                expected: "rate between 0 and 1",
            });
        }

        let client = ClientSettings {
            request_timeout: r.duration("REQUEST_TIMEOUT", Duration::from_secs(30))?,
            pool_max_idle_per_host: r.parse("POOL_MAX_IDLE_PER_HOST", 32, "integer")?,
            pool_idle_timeout: r.duration("POOL_IDLE_TIMEOUT", Duration::from_secs(30))?,
            skip_tls_verify: r.bool("SKIP_TLS_VERIFY", false)?,
            resolve_target_addr: r.raw("RESOLVE_TARGET_ADDR"),
            custom_headers: r.raw("CUSTOM_HEADERS"),
        };

        let metrics_port = match r.raw("METRICS_PORT") {
            None => None,
            Some(_) => Some(r.parse("METRICS_PORT", 0u16, "port number")?),
        };

        let metric_namespace = r.metric_namespace()?;
        let log_format = r.log_format()?;

        Ok(Config {
            base_url,
            token,
            window,
            food,
            expenditure,
            recommendation,
            budget,
            scenarios,
            enabled,
            test_duration,
            failure_rate_max,
            client,
            metrics_port,
            metric_namespace,
            log_format,
        })
    }

    /// Returns the bearer token, or [`ConfigError::MissingToken`] if none was configured.
    ///
    /// Authenticated scenarios call this before building a request, so a
    /// missing token never turns into an unauthenticated call.
    pub fn bearer_token(&self) -> Result<&str, ConfigError> {
        self.token.as_deref().ok_or(ConfigError::MissingToken)
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Returns a copy of this configuration using `token`.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Returns a copy of this configuration targeting `base_url`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Knobs for `kind`, falling back to the catalogue defaults.
    pub fn knobs(&self, kind: ScenarioKind) -> ScenarioKnobs {
        self.scenarios.get(&kind).copied().unwrap_or_else(|| {
            let defaults = kind.default_policy();
            ScenarioKnobs {
                rate: defaults.rate,
                pool_size: defaults.pool_size,
                duration: self.test_duration,
                p95_ms: defaults.p95_ms,
            }
        })
    }

    /// Creates a ClientConfig from this Config.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            request_timeout: self.client.request_timeout,
            pool_max_idle_per_host: self.client.pool_max_idle_per_host,
            pool_idle_timeout: self.client.pool_idle_timeout,
            skip_tls_verify: self.client.skip_tls_verify,
            resolve_target_addr: self.client.resolve_target_addr.clone(),
            custom_headers: self.client.custom_headers.clone(),
        }
    }

    /// Prints the configuration summary.
    pub fn print_summary(&self, parsed_headers: &reqwest::header::HeaderMap) {
        println!("Starting load test:");
        println!("  Base URL: {}", self.base_url);
        println!(
            "  Bearer token: {}",
            if self.has_token() { "set" } else { "NOT SET (secured scenarios will fail)" }
        );
        println!(
            "  Query window: {} .. {}",
            self.window.start_date, self.window.end_date
        );
        println!("  Default duration: {:?}", self.test_duration);
        println!("  Request timeout: {:?}", self.client.request_timeout);
        println!("  Skip TLS Verify: {}", self.client.skip_tls_verify);
        println!("  Failure rate bound: {}", self.failure_rate_max);
        match self.metrics_port {
            Some(port) => println!("  Metrics: :{} (namespace {})", port, self.metric_namespace),
            None => println!("  Metrics: not served (namespace {})", self.metric_namespace),
        }
        println!("  Log format: {:?}", self.log_format);
        println!("  Scenarios:");
        for kind in &self.enabled {
            let knobs = self.knobs(*kind);
            println!(
                "    {:<24} rate={}/s pool={} duration={:?} p95<{}ms{}",
                kind.name(),
                knobs.rate,
                knobs.pool_size,
                knobs.duration,
                knobs.p95_ms,
                if kind.is_write() { " (writes data)" } else { "" }
            );
        }

        if parsed_headers.is_empty() {
            println!("  Custom Headers Enabled: No");
        } else {
            println!("  Custom Headers Enabled: Yes");
            for (name, value) in parsed_headers.iter() {
                println!(
                    "    {}: {}",
                    name,
                    value.to_str().unwrap_or("<non-ASCII or sensitive value>")
                );
            }
        }
    }
}
