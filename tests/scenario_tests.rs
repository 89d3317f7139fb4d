//! Request shape and check semantics of every scenario, against a mock API.

use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{header, header_exists, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use finance_loadtest::config::{Config, ConfigError};
use finance_loadtest::executor::{
    ScenarioExecutor, STEP_EXPENDITURE_CREATE, STEP_EXPENDITURE_DELETE, STEP_EXPENDITURE_UPDATE,
};
use finance_loadtest::metrics::MetricsSink;
use finance_loadtest::scenario::ScenarioKind;

const TOKEN: &str = "perf-token";

fn executor_for(server: &MockServer, token: Option<&str>) -> (ScenarioExecutor, Arc<MetricsSink>) {
    let mut config = Config::from_lookup(|_| None)
        .expect("defaults are valid")
        .with_base_url(server.uri());
    if let Some(token) = token {
        config = config.with_token(token);
    }
    let sink = Arc::new(MetricsSink::new());
    let executor = ScenarioExecutor::new(reqwest::Client::new(), Arc::new(config), sink.clone());
    (executor, sink)
}

fn json_body(request: &Request) -> Value {
    serde_json::from_slice(&request.body).expect("request body should be JSON")
}

#[tokio::test]
async fn food_autocomplete_is_unauthenticated() {
    let server = MockServer::start().await;

    // Mounted first so it wins if an Authorization header ever shows up.
    Mock::given(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(401))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/foods/autocomplete"))
        .and(query_param("limit", "10"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "SUCCESS"})))
        .expect(1)
        .mount(&server)
        .await;

    let (executor, sink) = executor_for(&server, None);
    let invocation = executor
        .execute(ScenarioKind::FoodAutocomplete)
        .await
        .expect("autocomplete needs no token");

    assert!(invocation.success());
    assert_eq!(invocation.steps[0].status_code, Some(200));
    assert_eq!(
        sink.trend_stats("food_autocomplete_duration_ms").unwrap().count,
        1
    );

    let requests = server.received_requests().await.unwrap();
    let keyword = requests[0]
        .url
        .query_pairs()
        .find(|(k, _)| k == "keyword")
        .map(|(_, v)| v.to_string())
        .unwrap();
    assert!(["PERF", "BURGER", "NOODLE"].contains(&keyword.as_str()));
}

#[tokio::test]
async fn secured_reads_send_bearer_token_and_window() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/expenditures"))
        .and(header("authorization", "Bearer perf-token"))
        .and(header("content-type", "application/json"))
        .and(query_param("startDate", "2025-01-01"))
        .and(query_param("endDate", "2025-03-31"))
        .and(query_param("page", "0"))
        .and(query_param("size", "50"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/expenditures/statistics"))
        .and(header("authorization", "Bearer perf-token"))
        .and(query_param("startDate", "2025-01-01"))
        .and(query_param("endDate", "2025-03-31"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/budgets/monthly"))
        .and(header("authorization", "Bearer perf-token"))
        .and(query_param("year", "2025"))
        .and(query_param("month", "02"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/budgets/daily"))
        .and(header("authorization", "Bearer perf-token"))
        .and(query_param("date", "2025-02-15"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (executor, sink) = executor_for(&server, Some(TOKEN));
    for kind in [
        ScenarioKind::ExpenditureList,
        ScenarioKind::ExpenditureStats,
        ScenarioKind::BudgetMonthly,
        ScenarioKind::BudgetDaily,
    ] {
        let invocation = executor.execute(kind).await.unwrap();
        assert!(invocation.success(), "{} should pass: {:?}", kind, invocation);
    }
    assert_eq!(sink.http_totals(), (4, 0));
}

#[tokio::test]
async fn recommendations_send_jittered_origin() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/recommendations"))
        .and(header("authorization", "Bearer perf-token"))
        .and(query_param("radius", "1"))
        .and(query_param("limit", "20"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (executor, _) = executor_for(&server, Some(TOKEN));
    assert!(executor
        .execute(ScenarioKind::Recommendations)
        .await
        .unwrap()
        .success());

    let requests = server.received_requests().await.unwrap();
    let param = |name: &str| -> String {
        requests[0]
            .url
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.to_string())
            .unwrap_or_else(|| panic!("missing {}", name))
    };
    let latitude: f64 = param("latitude").parse().unwrap();
    let longitude: f64 = param("longitude").parse().unwrap();
    assert!((latitude - 37.5665).abs() <= 0.005 + 1e-9);
    assert!((longitude - 126.9780).abs() <= 0.005 + 1e-9);
    assert!(["SCORE", "DISTANCE", "REVIEW", "PRICE_LOW"].contains(&param("sortBy").as_str()));
}

#[tokio::test]
async fn missing_token_sends_no_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let (executor, sink) = executor_for(&server, None);
    for kind in ScenarioKind::all() {
        if !kind.requires_auth() {
            continue;
        }
        let err = executor.execute(kind).await.unwrap_err();
        assert_eq!(err, ConfigError::MissingToken);
        assert_eq!(
            err.to_string(),
            "JWT_TOKEN environment variable is required for secured scenarios."
        );
    }

    assert_eq!(sink.http_totals(), (0, 0));
    assert_eq!(sink.total_config_errors(), 9);
}

#[tokio::test]
async fn monthly_budget_create_accepts_conflict() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/budgets/monthly"))
        .respond_with(ResponseTemplate::new(409))
        .expect(1)
        .mount(&server)
        .await;

    let (executor, sink) = executor_for(&server, Some(TOKEN));
    let invocation = executor
        .execute(ScenarioKind::BudgetMonthlyCreate)
        .await
        .unwrap();

    assert!(invocation.success());
    assert_eq!(invocation.steps[0].status_code, Some(409));
    assert_eq!(sink.failure_rate(), 0.0);
    assert_eq!(
        sink.checks().get("budget monthly create 201|409").unwrap().passed,
        1
    );

    let body = json_body(&server.received_requests().await.unwrap()[0]);
    assert_eq!(body["budgetMonth"], "2025-02");
    let budget = body["monthlyFoodBudget"].as_i64().unwrap();
    assert!((200_000..=600_000).contains(&budget));
}

#[tokio::test]
async fn budget_updates_send_expected_bodies() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/v1/budgets"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/api/v1/budgets/daily/\d{4}-\d{2}-\d{2}$"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (executor, _) = executor_for(&server, Some(TOKEN));
    assert!(executor.execute(ScenarioKind::BudgetUpdate).await.unwrap().success());
    assert!(executor
        .execute(ScenarioKind::BudgetDailyUpdate)
        .await
        .unwrap()
        .success());

    let requests = server.received_requests().await.unwrap();
    let update = json_body(&requests[0]);
    assert!((200_000..=600_000).contains(&update["monthlyFoodBudget"].as_i64().unwrap()));
    assert!((8_000..=25_000).contains(&update["dailyFoodBudget"].as_i64().unwrap()));

    let daily = json_body(&requests[1]);
    assert!((8_000..=25_000).contains(&daily["dailyBudget"].as_i64().unwrap()));
    assert_eq!(daily["applyForward"], false);
    let day = requests[1].url.path().rsplit('/').next().unwrap().to_string();
    assert!(day.as_str() >= "2025-01-01" && day.as_str() <= "2025-03-31");
}

#[tokio::test]
async fn server_errors_fail_checks_without_aborting() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/budgets/daily"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let (executor, sink) = executor_for(&server, Some(TOKEN));
    for _ in 0..3 {
        let invocation = executor.execute(ScenarioKind::BudgetDaily).await.unwrap();
        assert!(!invocation.success());
        assert_eq!(invocation.steps[0].status_code, Some(500));
    }

    assert_eq!(sink.http_totals(), (3, 3));
    assert_eq!(sink.checks().get("budget daily 200").unwrap().failed, 3);
    assert_eq!(sink.counters(ScenarioKind::BudgetDaily).invocations, 3);
}

#[tokio::test]
async fn lifecycle_updates_and_deletes_the_created_expenditure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/expenditures"))
        .and(header("authorization", "Bearer perf-token"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "result": "SUCCESS",
            "data": {"expenditureId": 4242},
            "error": null
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/expenditures/4242"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/expenditures/4242"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let (executor, sink) = executor_for(&server, Some(TOKEN));
    let invocation = executor
        .execute(ScenarioKind::ExpenditureLifecycle)
        .await
        .unwrap();

    assert!(invocation.success());
    assert_eq!(invocation.steps.len(), 3);
    assert_eq!(invocation.step(STEP_EXPENDITURE_DELETE).unwrap().status_code, Some(204));
    assert_eq!(
        sink.trend_stats("expenditure_write_duration_ms").unwrap().count,
        3
    );

    let requests = server.received_requests().await.unwrap();
    let created = json_body(&requests[0]);
    let amount = created["amount"].as_i64().unwrap();
    let items_total: i64 = created["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["price"].as_i64().unwrap() * i["quantity"].as_i64().unwrap())
        .sum();
    assert_eq!(items_total, amount);
}

#[tokio::test]
async fn lifecycle_skips_dependent_steps_without_identifier() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/expenditures"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "result": "SUCCESS",
            "data": {"amount": 13500}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path_regex(r"^/api/v1/expenditures/.+$"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (executor, sink) = executor_for(&server, Some(TOKEN));
    let invocation = executor
        .execute(ScenarioKind::ExpenditureLifecycle)
        .await
        .expect("a missing identifier is not an error");

    assert_eq!(invocation.steps.len(), 1);
    assert!(invocation.step(STEP_EXPENDITURE_CREATE).unwrap().success);
    assert_eq!(
        invocation.skipped_steps,
        vec![STEP_EXPENDITURE_UPDATE, STEP_EXPENDITURE_DELETE]
    );
    assert_eq!(sink.counters(ScenarioKind::ExpenditureLifecycle).skipped_steps, 2);
    assert_eq!(sink.http_totals(), (1, 0));
}

#[tokio::test]
async fn lifecycle_skips_dependent_steps_when_create_fails() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/expenditures"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "result": "ERROR",
            "data": {"expenditureId": 1}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path_regex(r"^/api/v1/expenditures/.+$"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (executor, sink) = executor_for(&server, Some(TOKEN));
    let invocation = executor
        .execute(ScenarioKind::ExpenditureLifecycle)
        .await
        .unwrap();

    assert!(!invocation.success());
    assert_eq!(invocation.skipped_steps.len(), 2);
    assert_eq!(sink.http_totals(), (1, 1));
}

#[tokio::test]
async fn lifecycle_skips_on_unparseable_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/expenditures"))
        .respond_with(ResponseTemplate::new(201).set_body_string("<html>created</html>"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path_regex(r"^/api/v1/expenditures/.+$"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (executor, _) = executor_for(&server, Some(TOKEN));
    let invocation = executor
        .execute(ScenarioKind::ExpenditureLifecycle)
        .await
        .unwrap();
    assert_eq!(invocation.skipped_steps.len(), 2);
}
