//! Scenario catalogue.
//!
//! Every traffic pattern the load test knows about is a [`ScenarioKind`].
//! The kind carries only static facts (name, env prefix, metric name, auth
//! requirement and default execution policy); the behavior lives in
//! [`crate::executor`] and the per-run policy in [`crate::plan`].

use std::fmt;
use std::str::FromStr;

/// A named, repeatable unit of traffic generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScenarioKind {
    /// GET /api/v1/foods/autocomplete (unauthenticated)
    FoodAutocomplete,

    /// GET /api/v1/recommendations
    Recommendations,

    /// GET /api/v1/expenditures
    ExpenditureList,

    /// GET /api/v1/expenditures/statistics
    ExpenditureStats,

    /// POST, then PUT, then DELETE of one expenditure
    ExpenditureLifecycle,

    /// GET /api/v1/budgets/monthly
    BudgetMonthly,

    /// GET /api/v1/budgets/daily
    BudgetDaily,

    /// POST /api/v1/budgets/monthly, created or already present
    BudgetMonthlyCreate,

    /// PUT /api/v1/budgets
    BudgetUpdate,

    /// PUT /api/v1/budgets/daily/{date}
    BudgetDailyUpdate,
}

/// Default arrival rate, pool size and p95 bound for a scenario.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DefaultPolicy {
    pub rate: f64,
    pub pool_size: usize,
    pub p95_ms: f64,
}

impl ScenarioKind {
    /// All scenarios in catalogue order.
    pub fn all() -> Vec<ScenarioKind> {
        vec![
            ScenarioKind::FoodAutocomplete,
            ScenarioKind::Recommendations,
            ScenarioKind::ExpenditureList,
            ScenarioKind::ExpenditureStats,
            ScenarioKind::ExpenditureLifecycle,
            ScenarioKind::BudgetMonthly,
            ScenarioKind::BudgetDaily,
            ScenarioKind::BudgetMonthlyCreate,
            ScenarioKind::BudgetUpdate,
            ScenarioKind::BudgetDailyUpdate,
        ]
    }

    /// Scenario name used in logs, metrics labels and the `SCENARIOS` variable.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioKind::FoodAutocomplete => "food_autocomplete",
            ScenarioKind::Recommendations => "recommendations",
            ScenarioKind::ExpenditureList => "expenditure_list",
            ScenarioKind::ExpenditureStats => "expenditure_stats",
            ScenarioKind::ExpenditureLifecycle => "expenditure_lifecycle",
            ScenarioKind::BudgetMonthly => "budget_monthly",
            ScenarioKind::BudgetDaily => "budget_daily",
            ScenarioKind::BudgetMonthlyCreate => "budget_monthly_create",
            ScenarioKind::BudgetUpdate => "budget_update",
            ScenarioKind::BudgetDailyUpdate => "budget_daily_update",
        }
    }

    /// Prefix of the `<PREFIX>_RPS`, `<PREFIX>_VUS`, `<PREFIX>_DURATION`
    /// and `<PREFIX>_P95_MS` variables.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            ScenarioKind::FoodAutocomplete => "AUTOCOMPLETE",
            ScenarioKind::Recommendations => "RECOMMENDATION",
            ScenarioKind::ExpenditureList => "EXPENDITURE",
            ScenarioKind::ExpenditureStats => "EXP_STATS",
            ScenarioKind::ExpenditureLifecycle => "EXP_WRITE",
            ScenarioKind::BudgetMonthly => "BUDGET_MONTHLY",
            ScenarioKind::BudgetDaily => "BUDGET_DAILY",
            ScenarioKind::BudgetMonthlyCreate => "BUDGET_CREATE",
            ScenarioKind::BudgetUpdate => "BUDGET_UPDATE",
            ScenarioKind::BudgetDailyUpdate => "BUDGET_DAILY_UPDATE",
        }
    }

    /// Latency trend the scenario records into.
    pub fn metric_name(&self) -> &'static str {
        match self {
            ScenarioKind::FoodAutocomplete => "food_autocomplete_duration_ms",
            ScenarioKind::Recommendations => "recommendation_duration_ms",
            ScenarioKind::ExpenditureList => "expenditure_list_duration_ms",
            ScenarioKind::ExpenditureStats => "expenditure_stats_duration_ms",
            ScenarioKind::ExpenditureLifecycle => "expenditure_write_duration_ms",
            ScenarioKind::BudgetMonthly => "budget_monthly_duration_ms",
            ScenarioKind::BudgetDaily => "budget_daily_duration_ms",
            ScenarioKind::BudgetMonthlyCreate => "budget_monthly_create_duration_ms",
            ScenarioKind::BudgetUpdate => "budget_update_duration_ms",
            ScenarioKind::BudgetDailyUpdate => "budget_daily_update_duration_ms",
        }
    }

    /// Whether the scenario's calls need a bearer token.
    pub fn requires_auth(&self) -> bool {
        !matches!(self, ScenarioKind::FoodAutocomplete)
    }

    /// Whether the scenario changes server-side data.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            ScenarioKind::ExpenditureLifecycle
                | ScenarioKind::BudgetMonthlyCreate
                | ScenarioKind::BudgetUpdate
                | ScenarioKind::BudgetDailyUpdate
        )
    }

    pub fn default_policy(&self) -> DefaultPolicy {
        let (rate, pool_size, p95_ms) = match self {
            ScenarioKind::FoodAutocomplete => (75.0, 20, 250.0),
            ScenarioKind::Recommendations => (20.0, 10, 500.0),
            ScenarioKind::ExpenditureList => (40.0, 15, 400.0),
            ScenarioKind::ExpenditureStats => (20.0, 10, 400.0),
            ScenarioKind::ExpenditureLifecycle => (5.0, 10, 500.0),
            ScenarioKind::BudgetMonthly => (20.0, 10, 350.0),
            ScenarioKind::BudgetDaily => (20.0, 10, 350.0),
            ScenarioKind::BudgetMonthlyCreate => (2.0, 5, 400.0),
            ScenarioKind::BudgetUpdate => (5.0, 5, 400.0),
            ScenarioKind::BudgetDailyUpdate => (5.0, 5, 400.0),
        };
        DefaultPolicy {
            rate,
            pool_size,
            p95_ms,
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScenarioKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ScenarioKind::all()
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                let known: Vec<&str> = ScenarioKind::all().iter().map(|k| k.name()).collect();
                format!("Unknown scenario '{}'. Known: {}", wanted, known.join(", "))
            })
    }
}
