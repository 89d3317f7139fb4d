//! Randomized request payloads.
//!
//! Every builder is a pure function of the resolved configuration and a
//! caller-supplied random number generator: nothing here reads shared state
//! or remembers earlier calls, so each invocation gets a fresh payload.

use chrono::{NaiveDate, NaiveTime};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::config::{
    BudgetConfig, DateRange, DateWindow, ExpenditureConfig, FoodSearchConfig, IntRange,
    RecommendationConfig,
};

pub const FALLBACK_KEYWORD: &str = "PERF";
pub const FALLBACK_MEAL_TYPE: &str = "LUNCH";
pub const FALLBACK_SORT_BY: &str = "SCORE";
pub const FALLBACK_STORE_NAME: &str = "PERF Store";

/// Query string as ordered key/value pairs; encoded by the HTTP client.
pub type Query = Vec<(&'static str, String)>;

/// Uniform integer in the inclusive range.
pub fn random_in_range<R: Rng + ?Sized>(rng: &mut R, range: &IntRange) -> i64 {
    rng.gen_range(range.min()..=range.max())
}

/// Uniform pick from `candidates`, or `fallback` when the list is empty.
pub fn pick_or<'a, R: Rng + ?Sized>(rng: &mut R, candidates: &'a [String], fallback: &'a str) -> &'a str {
    candidates
        .choose(rng)
        .map(String::as_str)
        .unwrap_or(fallback)
}

/// Uniform day in `[start, end]`. A degenerate range (`end <= start`) yields `start`.
pub fn random_date<R: Rng + ?Sized>(rng: &mut R, range: &DateRange) -> NaiveDate {
    if range.end <= range.start {
        return range.start;
    }
    let span = (range.end - range.start).num_days();
    range.start + chrono::Duration::days(rng.gen_range(0..=span))
}

/// Uniform minute of the day between 06:00 and 22:59.
pub fn random_meal_time<R: Rng + ?Sized>(rng: &mut R) -> NaiveTime {
    let hour = rng.gen_range(6..=22);
    let minute = rng.gen_range(0..60);
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenditureItem {
    pub food_name: String,
    pub quantity: u32,
    pub price: i64,
}

/// Body of POST /api/v1/expenditures and PUT /api/v1/expenditures/{id}.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenditurePayload {
    pub store_name: String,
    pub amount: i64,
    pub expended_date: NaiveDate,
    pub expended_time: NaiveTime,
    pub category_id: i64,
    pub meal_type: String,
    pub memo: String,
    pub items: Vec<ExpenditureItem>,
}

impl ExpenditurePayload {
    /// Sum of `price * quantity` over all items.
    pub fn items_total(&self) -> i64 {
        self.items
            .iter()
            .map(|item| item.price * i64::from(item.quantity))
            .sum()
    }
}

/// Splits `amount` into `count` prices that add up to it exactly.
///
/// The first item absorbs the remainder, so a single item always carries the
/// whole amount.
fn split_amount(amount: i64, count: usize) -> Vec<i64> {
    let count = count.max(1);
    let share = amount / count as i64;
    let mut prices = vec![share; count];
    prices[0] += amount - share * count as i64;
    prices
}

pub fn build_expenditure_payload<R: Rng + ?Sized>(
    config: &ExpenditureConfig,
    rng: &mut R,
) -> ExpenditurePayload {
    let amount = random_in_range(rng, &config.amount);
    let store_name = pick_or(rng, &config.store_names, FALLBACK_STORE_NAME).to_string();
    let meal_type = pick_or(rng, &config.meal_types, FALLBACK_MEAL_TYPE).to_string();

    let items = split_amount(amount, config.item_count)
        .into_iter()
        .enumerate()
        .map(|(idx, price)| ExpenditureItem {
            food_name: format!("{} item {}", store_name, idx + 1),
            quantity: 1,
            price,
        })
        .collect();

    let run_tag: u32 = rng.gen();
    ExpenditurePayload {
        memo: format!("perf-{:08x} {}", run_tag, meal_type.to_lowercase()),
        store_name,
        amount,
        expended_date: random_date(rng, &config.dates),
        expended_time: random_meal_time(rng),
        category_id: random_in_range(rng, &config.category_id),
        meal_type,
        items,
    }
}

/// Body of POST /api/v1/budgets/monthly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyBudgetPayload {
    pub monthly_food_budget: i64,
    /// `YYYY-MM`
    pub budget_month: String,
}

pub fn build_monthly_budget_payload<R: Rng + ?Sized>(
    budget: &BudgetConfig,
    window: &DateWindow,
    rng: &mut R,
) -> MonthlyBudgetPayload {
    MonthlyBudgetPayload {
        monthly_food_budget: random_in_range(rng, &budget.monthly),
        budget_month: format!("{:04}-{:02}", window.budget_year, window.budget_month),
    }
}

/// Body of PUT /api/v1/budgets.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetUpdatePayload {
    pub monthly_food_budget: i64,
    pub daily_food_budget: i64,
}

pub fn build_budget_update_payload<R: Rng + ?Sized>(
    budget: &BudgetConfig,
    rng: &mut R,
) -> BudgetUpdatePayload {
    BudgetUpdatePayload {
        monthly_food_budget: random_in_range(rng, &budget.monthly),
        daily_food_budget: random_in_range(rng, &budget.daily),
    }
}

/// Body of PUT /api/v1/budgets/daily/{date}.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyBudgetUpdatePayload {
    pub daily_budget: i64,
    pub apply_forward: bool,
}

pub fn build_daily_budget_update_payload<R: Rng + ?Sized>(
    budget: &BudgetConfig,
    rng: &mut R,
) -> DailyBudgetUpdatePayload {
    DailyBudgetUpdatePayload {
        daily_budget: random_in_range(rng, &budget.daily),
        apply_forward: budget.apply_forward,
    }
}

pub fn build_autocomplete_query<R: Rng + ?Sized>(food: &FoodSearchConfig, rng: &mut R) -> Query {
    vec![
        ("keyword", pick_or(rng, &food.keywords, FALLBACK_KEYWORD).to_string()),
        ("limit", food.limit.to_string()),
    ]
}

/// Offsets a coordinate by a jitter expressed in micro-degrees.
fn jittered<R: Rng + ?Sized>(rng: &mut R, base: f64, jitter: &IntRange) -> String {
    let offset = random_in_range(rng, jitter) as f64 / 1_000_000.0;
    format!("{:.6}", base + offset)
}

/// Query for GET /api/v1/recommendations. `keyword`, `includeDisliked`
/// and `openNow` are only present when configured.
pub fn build_recommendation_query<R: Rng + ?Sized>(
    config: &RecommendationConfig,
    rng: &mut R,
) -> Query {
    let mut query = vec![
        ("latitude", jittered(rng, config.latitude, &config.coord_jitter)),
        ("longitude", jittered(rng, config.longitude, &config.coord_jitter)),
        ("radius", config.radius_km.to_string()),
        ("limit", config.limit.to_string()),
        (
            "sortBy",
            pick_or(rng, &config.sort_options, FALLBACK_SORT_BY).to_string(),
        ),
    ];
    if let Some(keyword) = config.keywords.choose(rng) {
        query.push(("keyword", keyword.clone()));
    }
    if let Some(include_disliked) = config.include_disliked {
        query.push(("includeDisliked", include_disliked.to_string()));
    }
    if let Some(open_now) = config.open_now {
        query.push(("openNow", open_now.to_string()));
    }
    query
}

pub fn build_expenditure_list_query(window: &DateWindow, page_size: u32) -> Query {
    vec![
        ("startDate", window.start_date.to_string()),
        ("endDate", window.end_date.to_string()),
        ("page", "0".to_string()),
        ("size", page_size.to_string()),
    ]
}

pub fn build_statistics_query(window: &DateWindow) -> Query {
    vec![
        ("startDate", window.start_date.to_string()),
        ("endDate", window.end_date.to_string()),
    ]
}

pub fn build_monthly_budget_query(window: &DateWindow) -> Query {
    vec![
        ("year", window.budget_year.to_string()),
        ("month", format!("{:02}", window.budget_month)),
    ]
}

pub fn build_daily_budget_query(window: &DateWindow) -> Query {
    vec![("date", window.daily_date.to_string())]
}

/// Day of the daily budget update, drawn from the expenditure date range.
pub fn pick_budget_day<R: Rng + ?Sized>(dates: &DateRange, rng: &mut R) -> NaiveDate {
    random_date(rng, dates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config() -> Config {
        Config::from_lookup(|_| None).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn random_in_range_stays_inside_inclusive_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let range = IntRange::new("amount", 5_000, 5_003).unwrap();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1_000 {
            let value = random_in_range(&mut rng, &range);
            assert!(range.contains(value), "{} outside range", value);
            seen.insert(value);
        }
        // Both ends are reachable.
        assert!(seen.contains(&5_000) && seen.contains(&5_003));
    }

    #[test]
    fn single_value_range_is_constant() {
        let mut rng = StdRng::seed_from_u64(1);
        let range = IntRange::new("fixed", 42, 42).unwrap();
        assert_eq!(random_in_range(&mut rng, &range), 42);
    }

    #[test]
    fn pick_or_returns_fallback_for_empty_list() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(pick_or(&mut rng, &[], FALLBACK_MEAL_TYPE), "LUNCH");
    }

    #[test]
    fn pick_or_only_returns_candidates() {
        let mut rng = StdRng::seed_from_u64(3);
        let candidates = vec!["A".to_string(), "B".to_string()];
        for _ in 0..100 {
            let picked = pick_or(&mut rng, &candidates, "Z");
            assert!(picked == "A" || picked == "B");
        }
    }

    #[test]
    fn random_date_stays_inside_range() {
        let mut rng = StdRng::seed_from_u64(11);
        let range = DateRange {
            start: date(2025, 1, 30),
            end: date(2025, 2, 2),
        };
        for _ in 0..500 {
            let picked = random_date(&mut rng, &range);
            assert!(picked >= range.start && picked <= range.end, "{}", picked);
        }
    }

    #[test]
    fn degenerate_date_range_returns_start() {
        let mut rng = StdRng::seed_from_u64(5);
        let same = DateRange {
            start: date(2025, 2, 15),
            end: date(2025, 2, 15),
        };
        let inverted = DateRange {
            start: date(2025, 3, 1),
            end: date(2025, 1, 1),
        };
        assert_eq!(random_date(&mut rng, &same), date(2025, 2, 15));
        assert_eq!(random_date(&mut rng, &inverted), date(2025, 3, 1));
    }

    #[test]
    fn lunch_only_expenditure_has_single_item_matching_amount() {
        let mut config = config();
        config.expenditure.meal_types = vec!["LUNCH".to_string()];
        let mut rng = StdRng::seed_from_u64(99);

        for _ in 0..200 {
            let payload = build_expenditure_payload(&config.expenditure, &mut rng);
            assert_eq!(payload.meal_type, "LUNCH");
            assert!((5_000..=45_000).contains(&payload.amount));
            assert_eq!(payload.items.len(), 1);
            assert_eq!(payload.items[0].price, payload.amount);
        }
    }

    #[test]
    fn multi_item_expenditure_keeps_total_consistent() {
        let mut config = config();
        config.expenditure.item_count = 3;
        let mut rng = StdRng::seed_from_u64(21);

        for _ in 0..200 {
            let payload = build_expenditure_payload(&config.expenditure, &mut rng);
            assert_eq!(payload.items.len(), 3);
            assert_eq!(payload.items_total(), payload.amount);
        }
    }

    #[test]
    fn empty_candidate_lists_use_fallbacks() {
        let mut config = config();
        config.expenditure.meal_types.clear();
        config.expenditure.store_names.clear();
        let mut rng = StdRng::seed_from_u64(2);

        let payload = build_expenditure_payload(&config.expenditure, &mut rng);
        assert_eq!(payload.meal_type, FALLBACK_MEAL_TYPE);
        assert_eq!(payload.store_name, FALLBACK_STORE_NAME);
    }

    #[test]
    fn expenditure_serializes_with_api_field_names() {
        let payload = ExpenditurePayload {
            store_name: "PERF Kimbap".to_string(),
            amount: 13_500,
            expended_date: date(2025, 10, 8),
            expended_time: NaiveTime::from_hms_opt(12, 30, 0).unwrap(),
            category_id: 3,
            meal_type: "LUNCH".to_string(),
            memo: "perf".to_string(),
            items: vec![ExpenditureItem {
                food_name: "PERF Kimbap item 1".to_string(),
                quantity: 1,
                price: 13_500,
            }],
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["storeName"], "PERF Kimbap");
        assert_eq!(json["expendedDate"], "2025-10-08");
        assert_eq!(json["expendedTime"], "12:30:00");
        assert_eq!(json["categoryId"], 3);
        assert_eq!(json["mealType"], "LUNCH");
        assert_eq!(json["items"][0]["price"], 13_500);
    }

    #[test]
    fn autocomplete_falls_back_to_constant_keyword() {
        let mut config = config();
        config.food.keywords.clear();
        let mut rng = StdRng::seed_from_u64(4);

        let query = build_autocomplete_query(&config.food, &mut rng);
        assert_eq!(
            query,
            vec![("keyword", "PERF".to_string()), ("limit", "10".to_string())]
        );
    }

    #[test]
    fn recommendation_query_omits_unconfigured_optionals() {
        let config = config();
        let mut rng = StdRng::seed_from_u64(8);

        let query = build_recommendation_query(&config.recommendation, &mut rng);
        let keys: Vec<_> = query.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["latitude", "longitude", "radius", "limit", "sortBy"]);
    }

    #[test]
    fn recommendation_query_includes_configured_optionals() {
        let mut config = config();
        config.recommendation.keywords = vec!["bibimbap".to_string()];
        config.recommendation.include_disliked = Some(false);
        config.recommendation.open_now = Some(true);
        let mut rng = StdRng::seed_from_u64(8);

        let query = build_recommendation_query(&config.recommendation, &mut rng);
        assert!(query.contains(&("keyword", "bibimbap".to_string())));
        assert!(query.contains(&("includeDisliked", "false".to_string())));
        assert!(query.contains(&("openNow", "true".to_string())));
    }

    #[test]
    fn recommendation_coordinates_stay_within_jitter() {
        let config = config();
        let mut rng = StdRng::seed_from_u64(13);

        for _ in 0..100 {
            let query = build_recommendation_query(&config.recommendation, &mut rng);
            let latitude: f64 = query[0].1.parse().unwrap();
            assert!((latitude - 37.5665).abs() <= 0.005 + 1e-9, "{}", latitude);
        }
    }

    #[test]
    fn monthly_budget_payload_uses_configured_month() {
        let config = config();
        let mut rng = StdRng::seed_from_u64(6);

        let payload = build_monthly_budget_payload(&config.budget, &config.window, &mut rng);
        assert_eq!(payload.budget_month, "2025-02");
        assert!(config.budget.monthly.contains(payload.monthly_food_budget));
    }

    #[test]
    fn budget_update_payloads_stay_in_range() {
        let config = config();
        let mut rng = StdRng::seed_from_u64(10);

        for _ in 0..100 {
            let update = build_budget_update_payload(&config.budget, &mut rng);
            assert!(config.budget.monthly.contains(update.monthly_food_budget));
            assert!(config.budget.daily.contains(update.daily_food_budget));

            let daily = build_daily_budget_update_payload(&config.budget, &mut rng);
            assert!(config.budget.daily.contains(daily.daily_budget));
            assert!(!daily.apply_forward);
        }
    }

    #[test]
    fn read_queries_reflect_the_window() {
        let config = config();
        assert_eq!(
            build_expenditure_list_query(&config.window, 50),
            vec![
                ("startDate", "2025-01-01".to_string()),
                ("endDate", "2025-03-31".to_string()),
                ("page", "0".to_string()),
                ("size", "50".to_string()),
            ]
        );
        assert_eq!(
            build_monthly_budget_query(&config.window),
            vec![("year", "2025".to_string()), ("month", "02".to_string())]
        );
        assert_eq!(
            build_daily_budget_query(&config.window),
            vec![("date", "2025-02-15".to_string())]
        );
    }
}
