//! Concurrent lifecycle invocations must each act on their own expenditure.

use serde_json::json;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use finance_loadtest::config::Config;
use finance_loadtest::executor::ScenarioExecutor;
use finance_loadtest::metrics::MetricsSink;
use finance_loadtest::scenario::ScenarioKind;

/// Hands out a fresh expenditure id per create.
struct IdIssuer {
    next: AtomicU64,
}

impl Respond for IdIssuer {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let id = self.next.fetch_add(1, Ordering::SeqCst);
        ResponseTemplate::new(201).set_body_json(json!({
            "result": "SUCCESS",
            "data": {"expenditureId": id},
            "error": null
        }))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_chains_never_share_identifiers() {
    const INVOCATIONS: u64 = 50;

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/expenditures"))
        .respond_with(IdIssuer {
            next: AtomicU64::new(1000),
        })
        .expect(INVOCATIONS)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/api/v1/expenditures/\d+$"))
        .respond_with(ResponseTemplate::new(200))
        .expect(INVOCATIONS)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path_regex(r"^/api/v1/expenditures/\d+$"))
        .respond_with(ResponseTemplate::new(204))
        .expect(INVOCATIONS)
        .mount(&server)
        .await;

    let config = Config::from_lookup(|_| None)
        .unwrap()
        .with_base_url(server.uri())
        .with_token("perf-token");
    let sink = Arc::new(MetricsSink::new());
    let executor = ScenarioExecutor::new(reqwest::Client::new(), Arc::new(config), sink.clone());

    let handles: Vec<_> = (0..INVOCATIONS)
        .map(|_| {
            let executor = executor.clone();
            tokio::spawn(async move { executor.execute(ScenarioKind::ExpenditureLifecycle).await })
        })
        .collect();
    for handle in handles {
        let invocation = handle.await.unwrap().unwrap();
        assert!(invocation.success(), "{:?}", invocation);
    }

    let requests = server.received_requests().await.unwrap();

    let mut create_memos = HashSet::new();
    let mut update_memos = HashSet::new();
    for request in &requests {
        let memos = match request.method.to_string().as_str() {
            "POST" => &mut create_memos,
            "PUT" => &mut update_memos,
            _ => continue,
        };
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        let items_total: i64 = body["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["price"].as_i64().unwrap() * item["quantity"].as_i64().unwrap())
            .sum();
        assert_eq!(items_total, body["amount"].as_i64().unwrap(), "{}", body);
        assert!(
            memos.insert(body["memo"].as_str().unwrap().to_string()),
            "memo reused across invocations: {}",
            body
        );
    }
    assert_eq!(create_memos.len() as u64, INVOCATIONS);
    assert_eq!(update_memos.len() as u64, INVOCATIONS);
    assert!(
        create_memos.is_disjoint(&update_memos),
        "an update body repeated a create body"
    );

    let mut per_id: HashMap<String, Vec<String>> = HashMap::new();
    for request in &requests {
        if let Some(id) = request.url.path().strip_prefix("/api/v1/expenditures/") {
            per_id
                .entry(id.to_string())
                .or_default()
                .push(request.method.to_string());
        }
    }

    assert_eq!(per_id.len() as u64, INVOCATIONS, "every created id is acted on");
    for (id, mut methods) in per_id {
        methods.sort();
        assert_eq!(methods, vec!["DELETE", "PUT"], "id {} got {:?}", id, methods);
        let id: u64 = id.parse().unwrap();
        assert!((1000..1000 + INVOCATIONS).contains(&id));
    }

    assert_eq!(
        sink.counters(ScenarioKind::ExpenditureLifecycle).invocations,
        INVOCATIONS
    );
    assert_eq!(sink.counters(ScenarioKind::ExpenditureLifecycle).skipped_steps, 0);
}
