//! Scenario execution engine.
//!
//! One async function per traffic pattern. Each builds its request from the
//! shared [`Config`], sends it, times it, checks the status and feeds the
//! outcome into the [`MetricsSink`]. A failed check never aborts anything;
//! only a [`ConfigError`] ends an invocation early.

use reqwest::{Method, RequestBuilder};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::assertions::{check_name, check_status, CheckError, ExpectedStatus};
use crate::config::{Config, ConfigError};
use crate::errors::ErrorCategory;
use crate::extractor::{extract_identifier, EXPENDITURE_ID_PATHS};
use crate::metrics::{MetricsSink, CONCURRENT_INVOCATIONS};
use crate::payloads;
use crate::scenario::ScenarioKind;

const AUTOCOMPLETE_PATH: &str = "/api/v1/foods/autocomplete";
const RECOMMENDATIONS_PATH: &str = "/api/v1/recommendations";
const EXPENDITURES_PATH: &str = "/api/v1/expenditures";
const STATISTICS_PATH: &str = "/api/v1/expenditures/statistics";
const BUDGETS_PATH: &str = "/api/v1/budgets";
const MONTHLY_BUDGET_PATH: &str = "/api/v1/budgets/monthly";
const DAILY_BUDGET_PATH: &str = "/api/v1/budgets/daily";

pub const STEP_EXPENDITURE_CREATE: &str = "expenditure_create";
pub const STEP_EXPENDITURE_UPDATE: &str = "expenditure_update";
pub const STEP_EXPENDITURE_DELETE: &str = "expenditure_delete";

/// Result of executing a single HTTP step.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Name of the step that was executed
    pub step_name: String,

    /// Name of the status check, e.g. `"expenditure create 201"`
    pub check: String,

    /// HTTP status code received; `None` on transport errors
    pub status_code: Option<u16>,

    /// Time from sending the request to the end of the response body
    pub latency: Duration,

    /// Whether the status was in the accepted set
    pub success: bool,

    /// Error message if step failed
    pub error: Option<String>,

    pub error_category: Option<ErrorCategory>,
}

/// Result of one scenario invocation.
#[derive(Debug, Clone)]
pub struct InvocationResult {
    pub scenario: ScenarioKind,

    /// Results from each step that was sent
    pub steps: Vec<StepResult>,

    /// Steps not sent because an earlier step produced nothing to act on
    pub skipped_steps: Vec<&'static str>,

    pub total_time: Duration,
}

impl InvocationResult {
    fn new(scenario: ScenarioKind) -> Self {
        Self {
            scenario,
            steps: Vec::new(),
            skipped_steps: Vec::new(),
            total_time: Duration::ZERO,
        }
    }

    /// True when every step ran and passed its check.
    pub fn success(&self) -> bool {
        self.skipped_steps.is_empty() && self.steps.iter().all(|s| s.success)
    }

    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.step_name == name)
    }
}

/// Executor for the finance API scenarios.
///
/// Cheap to clone: the client, configuration and sink are shared.
#[derive(Clone)]
pub struct ScenarioExecutor {
    client: reqwest::Client,
    config: Arc<Config>,
    sink: Arc<MetricsSink>,
}

impl ScenarioExecutor {
    pub fn new(client: reqwest::Client, config: Arc<Config>, sink: Arc<MetricsSink>) -> Self {
        Self {
            client,
            config,
            sink,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sink(&self) -> &Arc<MetricsSink> {
        &self.sink
    }

    /// Runs one invocation of `kind`.
    ///
    /// Returns `Err` only for configuration errors, which are also counted in
    /// the sink. No request is sent in that case.
    pub async fn execute(&self, kind: ScenarioKind) -> Result<InvocationResult, ConfigError> {
        let start = Instant::now();
        CONCURRENT_INVOCATIONS.inc();

        let outcome = match kind {
            ScenarioKind::FoodAutocomplete => Ok(self.food_autocomplete().await),
            ScenarioKind::Recommendations => self.recommendations().await,
            ScenarioKind::ExpenditureList => self.expenditure_list().await,
            ScenarioKind::ExpenditureStats => self.expenditure_stats().await,
            ScenarioKind::ExpenditureLifecycle => self.expenditure_lifecycle().await,
            ScenarioKind::BudgetMonthly => self.budget_monthly().await,
            ScenarioKind::BudgetDaily => self.budget_daily().await,
            ScenarioKind::BudgetMonthlyCreate => self.budget_monthly_create().await,
            ScenarioKind::BudgetUpdate => self.budget_update().await,
            ScenarioKind::BudgetDailyUpdate => self.budget_daily_update().await,
        };

        CONCURRENT_INVOCATIONS.dec();

        match outcome {
            Ok(mut invocation) => {
                invocation.total_time = start.elapsed();
                self.sink.record_invocation(kind);
                debug!(
                    scenario = kind.name(),
                    success = invocation.success(),
                    steps = invocation.steps.len(),
                    skipped = invocation.skipped_steps.len(),
                    total_time_ms = invocation.total_time.as_millis() as u64,
                    "Invocation completed"
                );
                Ok(invocation)
            }
            Err(e) => {
                self.sink.record_config_error(kind);
                error!(scenario = kind.name(), error = %e, "Invocation refused");
                Err(e)
            }
        }
    }

    /// GET /api/v1/foods/autocomplete. Unauthenticated.
    pub async fn food_autocomplete(&self) -> InvocationResult {
        let kind = ScenarioKind::FoodAutocomplete;
        let query = payloads::build_autocomplete_query(&self.config.food, &mut rand::thread_rng());

        let request = self.request(Method::GET, AUTOCOMPLETE_PATH, None).query(&query);
        self.single_step(kind, ExpectedStatus::OK, request).await
    }

    /// GET /api/v1/recommendations with a jittered origin.
    pub async fn recommendations(&self) -> Result<InvocationResult, ConfigError> {
        let kind = ScenarioKind::Recommendations;
        let token = self.config.bearer_token()?;
        let query = payloads::build_recommendation_query(
            &self.config.recommendation,
            &mut rand::thread_rng(),
        );

        let request = self
            .request(Method::GET, RECOMMENDATIONS_PATH, Some(token))
            .query(&query);
        Ok(self.single_step(kind, ExpectedStatus::OK, request).await)
    }

    /// GET /api/v1/expenditures over the configured window.
    pub async fn expenditure_list(&self) -> Result<InvocationResult, ConfigError> {
        let kind = ScenarioKind::ExpenditureList;
        let token = self.config.bearer_token()?;
        let query = payloads::build_expenditure_list_query(
            &self.config.window,
            self.config.expenditure.page_size,
        );

        let request = self
            .request(Method::GET, EXPENDITURES_PATH, Some(token))
            .query(&query);
        Ok(self.single_step(kind, ExpectedStatus::OK, request).await)
    }

    /// GET /api/v1/expenditures/statistics over the configured window.
    pub async fn expenditure_stats(&self) -> Result<InvocationResult, ConfigError> {
        let kind = ScenarioKind::ExpenditureStats;
        let token = self.config.bearer_token()?;
        let query = payloads::build_statistics_query(&self.config.window);

        let request = self
            .request(Method::GET, STATISTICS_PATH, Some(token))
            .query(&query);
        Ok(self.single_step(kind, ExpectedStatus::OK, request).await)
    }

    /// POST, then PUT and DELETE the created expenditure.
    ///
    /// The identifier never leaves this invocation. When creation fails or
    /// yields no identifier, update and delete are skipped.
    pub async fn expenditure_lifecycle(&self) -> Result<InvocationResult, ConfigError> {
        let kind = ScenarioKind::ExpenditureLifecycle;
        let token = self.config.bearer_token()?;
        let (create_payload, update_payload) = {
            let mut rng = rand::thread_rng();
            (
                payloads::build_expenditure_payload(&self.config.expenditure, &mut rng),
                payloads::build_expenditure_payload(&self.config.expenditure, &mut rng),
            )
        };

        let mut invocation = InvocationResult::new(kind);

        let request = self
            .request(Method::POST, EXPENDITURES_PATH, Some(token))
            .json(&create_payload);
        let (created, body) = self
            .send_step(kind, STEP_EXPENDITURE_CREATE, ExpectedStatus::CREATED, request)
            .await;

        let expenditure_id = if created.success {
            body.as_deref()
                .and_then(|body| match extract_identifier(body, EXPENDITURE_ID_PATHS) {
                    Ok(id) => Some(id),
                    Err(e) => {
                        warn!(scenario = kind.name(), error = %e, "Created expenditure has no identifier");
                        None
                    }
                })
        } else {
            None
        };
        invocation.steps.push(created);

        let Some(expenditure_id) = expenditure_id else {
            for step in [STEP_EXPENDITURE_UPDATE, STEP_EXPENDITURE_DELETE] {
                self.sink.record_skipped(kind, step);
                invocation.skipped_steps.push(step);
            }
            debug!(scenario = kind.name(), "Skipping update and delete");
            return Ok(invocation);
        };

        let item_path = format!("{}/{}", EXPENDITURES_PATH, expenditure_id);

        let request = self
            .request(Method::PUT, &item_path, Some(token))
            .json(&update_payload);
        let (updated, _) = self
            .send_step(kind, STEP_EXPENDITURE_UPDATE, ExpectedStatus::OK, request)
            .await;
        invocation.steps.push(updated);

        // Delete even when the update failed so the created row is not left behind.
        let request = self.request(Method::DELETE, &item_path, Some(token));
        let (deleted, _) = self
            .send_step(
                kind,
                STEP_EXPENDITURE_DELETE,
                ExpectedStatus::OK_OR_NO_CONTENT,
                request,
            )
            .await;
        invocation.steps.push(deleted);

        Ok(invocation)
    }

    /// GET /api/v1/budgets/monthly for the configured month.
    pub async fn budget_monthly(&self) -> Result<InvocationResult, ConfigError> {
        let kind = ScenarioKind::BudgetMonthly;
        let token = self.config.bearer_token()?;
        let query = payloads::build_monthly_budget_query(&self.config.window);

        let request = self
            .request(Method::GET, MONTHLY_BUDGET_PATH, Some(token))
            .query(&query);
        Ok(self.single_step(kind, ExpectedStatus::OK, request).await)
    }

    /// GET /api/v1/budgets/daily for the configured date.
    pub async fn budget_daily(&self) -> Result<InvocationResult, ConfigError> {
        let kind = ScenarioKind::BudgetDaily;
        let token = self.config.bearer_token()?;
        let query = payloads::build_daily_budget_query(&self.config.window);

        let request = self
            .request(Method::GET, DAILY_BUDGET_PATH, Some(token))
            .query(&query);
        Ok(self.single_step(kind, ExpectedStatus::OK, request).await)
    }

    /// POST /api/v1/budgets/monthly. A conflict means the budget already exists.
    pub async fn budget_monthly_create(&self) -> Result<InvocationResult, ConfigError> {
        let kind = ScenarioKind::BudgetMonthlyCreate;
        let token = self.config.bearer_token()?;
        let payload = payloads::build_monthly_budget_payload(
            &self.config.budget,
            &self.config.window,
            &mut rand::thread_rng(),
        );

        let request = self
            .request(Method::POST, MONTHLY_BUDGET_PATH, Some(token))
            .json(&payload);
        Ok(self
            .single_step(kind, ExpectedStatus::CREATED_OR_CONFLICT, request)
            .await)
    }

    /// PUT /api/v1/budgets.
    pub async fn budget_update(&self) -> Result<InvocationResult, ConfigError> {
        let kind = ScenarioKind::BudgetUpdate;
        let token = self.config.bearer_token()?;
        let payload =
            payloads::build_budget_update_payload(&self.config.budget, &mut rand::thread_rng());

        let request = self
            .request(Method::PUT, BUDGETS_PATH, Some(token))
            .json(&payload);
        Ok(self.single_step(kind, ExpectedStatus::OK, request).await)
    }

    /// PUT /api/v1/budgets/daily/{date} for a day in the expenditure range.
    pub async fn budget_daily_update(&self) -> Result<InvocationResult, ConfigError> {
        let kind = ScenarioKind::BudgetDailyUpdate;
        let token = self.config.bearer_token()?;
        let (date, payload) = {
            let mut rng = rand::thread_rng();
            (
                payloads::pick_budget_day(&self.config.expenditure.dates, &mut rng),
                payloads::build_daily_budget_update_payload(&self.config.budget, &mut rng),
            )
        };

        let path = format!("{}/{}", DAILY_BUDGET_PATH, date);
        let request = self.request(Method::PUT, &path, Some(token)).json(&payload);
        Ok(self.single_step(kind, ExpectedStatus::OK, request).await)
    }

    /// Request with the headers every call carries.
    fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let url = format!("{}{}", self.config.base_url, path);
        let builder = self
            .client
            .request(method, url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn single_step(
        &self,
        kind: ScenarioKind,
        expected: ExpectedStatus,
        request: RequestBuilder,
    ) -> InvocationResult {
        let mut invocation = InvocationResult::new(kind);
        let (step, _) = self.send_step(kind, kind.name(), expected, request).await;
        invocation.steps.push(step);
        invocation
    }

    /// Sends one request, checks it and records it.
    ///
    /// Returns the response body alongside the result when it could be read.
    async fn send_step(
        &self,
        kind: ScenarioKind,
        step_name: &str,
        expected: ExpectedStatus,
        request: RequestBuilder,
    ) -> (StepResult, Option<String>) {
        let step_start = Instant::now();
        let check = check_name(step_name, expected);

        let (result, body) = match request.send().await {
            Ok(response) => {
                let status_code = response.status().as_u16();
                let body = match response.text().await {
                    Ok(body) => Some(body),
                    Err(e) => {
                        warn!(step = step_name, error = %e, "Failed to read response body");
                        None
                    }
                };
                let latency = step_start.elapsed();

                let outcome = check_status(step_name, expected, status_code);
                let result = StepResult {
                    step_name: step_name.to_string(),
                    check,
                    status_code: Some(status_code),
                    latency,
                    success: outcome.is_ok(),
                    error_category: outcome
                        .as_ref()
                        .err()
                        .map(|_| ErrorCategory::from_status_code(status_code)),
                    error: outcome.err().map(|e| e.to_string()),
                };
                (result, body)
            }
            Err(e) => {
                let latency = step_start.elapsed();
                let category = ErrorCategory::from_reqwest_error(&e);
                error!(
                    scenario = kind.name(),
                    step = step_name,
                    error = %e,
                    error_category = category.label(),
                    "Request failed"
                );
                let result = StepResult {
                    step_name: step_name.to_string(),
                    check,
                    status_code: None,
                    latency,
                    success: false,
                    error: Some(CheckError::Transport(e.to_string()).to_string()),
                    error_category: Some(category),
                };
                (result, None)
            }
        };

        debug!(
            scenario = kind.name(),
            step = step_name,
            status_code = ?result.status_code,
            latency_ms = result.latency.as_millis() as u64,
            success = result.success,
            "Step execution complete"
        );

        self.sink.record_step(kind, &result);
        (result, body)
    }
}
