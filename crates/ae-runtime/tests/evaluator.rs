//! End-to-end tests of the evaluator against in-process query backends.
//!
//! Covers the full path: condition validation → request building → backend
//! call under a deadline → per-instance state evaluation → metrics.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use ae_config::{AlertEvalConfig, EvaluationConfig};
use ae_core::{
    AlertQuery, Condition, DataResponse, ExecutionRequest, Field, Frame, Labels, QueryBackend,
    QueryDataResponse, RelativeTimeRange, State,
};
use ae_runtime::Evaluator;
use ae_runtime::tracing_init::DomainFormat;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_test_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .event_format(DomainFormat::new())
                .with_test_writer()
                .with_filter(EnvFilter::try_new("debug").unwrap()),
        )
        .try_init();
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

const CONDITION_JSON: &str = r#"{
  "condition": "B",
  "orgId": 1,
  "data": [
    {
      "refId": "A",
      "relativeTimeRange": { "from": 600, "to": 0 },
      "datasourceUid": "prom",
      "model": { "expr": "avg by (host) (cpu)", "intervalMs": 15000 }
    },
    {
      "refId": "B",
      "datasourceUid": "-100",
      "model": { "type": "math", "expression": "$A > 50" }
    }
  ]
}"#;

const RESPONSE_JSON: &str = r#"{
  "A": {
    "frames": [
      { "refId": "A", "fields": [ { "name": "A", "type": "number", "labels": { "host": "a" }, "values": [75.0] } ] },
      { "refId": "A", "fields": [ { "name": "A", "type": "number", "labels": { "host": "b" }, "values": [20.0] } ] }
    ]
  },
  "B": {
    "frames": [
      { "refId": "B", "fields": [ { "name": "B", "type": "number", "labels": { "host": "a" }, "values": [1.0] } ] },
      { "refId": "B", "fields": [ { "name": "B", "type": "number", "labels": { "host": "b" }, "values": [0.0] } ] }
    ]
  }
}"#;

/// Replays a fixed response and records the requests it received.
struct Replay {
    response: QueryDataResponse,
    calls: AtomicUsize,
    last_request: std::sync::Mutex<Option<ExecutionRequest>>,
}

impl Replay {
    fn new(response: QueryDataResponse) -> Self {
        Self {
            response,
            calls: AtomicUsize::new(0),
            last_request: std::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl QueryBackend for Replay {
    async fn query_data(&self, request: ExecutionRequest) -> anyhow::Result<QueryDataResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);
        Ok(self.response.clone())
    }
}

struct Slow;

#[async_trait]
impl QueryBackend for Slow {
    async fn query_data(&self, _request: ExecutionRequest) -> anyhow::Result<QueryDataResponse> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(QueryDataResponse::default())
    }
}

struct Panicking;

#[async_trait]
impl QueryBackend for Panicking {
    async fn query_data(&self, _request: ExecutionRequest) -> anyhow::Result<QueryDataResponse> {
        panic!("index out of range in expression engine");
    }
}

struct Failing;

#[async_trait]
impl QueryBackend for Failing {
    async fn query_data(&self, _request: ExecutionRequest) -> anyhow::Result<QueryDataResponse> {
        anyhow::bail!("connection refused")
    }
}

fn evaluator(backend: impl QueryBackend + 'static, timeout: Duration) -> Evaluator {
    Evaluator::from_evaluation_config(&EvaluationConfig::new(timeout, true), Arc::new(backend))
}

fn condition() -> Condition {
    Condition::from_json(CONDITION_JSON).unwrap()
}

// ---------------------------------------------------------------------------
// condition_eval
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fixture_condition_yields_one_state_per_host() {
    init_test_tracing();
    let response = QueryDataResponse::from_json(RESPONSE_JSON).unwrap();
    let backend = Arc::new(Replay::new(response));
    let eval = Evaluator::from_evaluation_config(
        &EvaluationConfig::new(Duration::from_secs(30), true),
        backend.clone(),
    );

    let results = eval.condition_eval(&condition(), now()).await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].instance, Labels::from_pairs([("host", "a")]));
    assert_eq!(results[0].state, State::Alerting);
    assert_eq!(results[1].instance, Labels::from_pairs([("host", "b")]));
    assert_eq!(results[1].state, State::Normal);
    for r in results.iter() {
        assert_eq!(r.evaluated_at, now());
        assert!(r.error.is_none());
    }

    let values = results[0].values.as_ref().unwrap();
    assert_eq!(values["A"].value, Some(75.0));
    assert_eq!(values["B"].value, Some(1.0));
    assert!(
        results[0]
            .evaluation_string
            .contains("[ var='A' labels={host=a} value=75 ]")
    );

    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    let request = backend.last_request.lock().unwrap().take().unwrap();
    assert_eq!(request.org_id, 1);
    assert_eq!(request.queries.len(), 2);
    assert_eq!(request.queries[1].datasource_uid, "-100");
    let a = &request.queries[0];
    assert_eq!(a.ref_id, "A");
    assert_eq!(a.interval, Duration::from_secs(15));
    assert_eq!(a.max_data_points, 43200);
    assert_eq!(a.time_range.to, now());
    assert_eq!(a.time_range.from, now() - chrono::Duration::seconds(600));
}

#[tokio::test(start_paused = true)]
async fn slow_backend_times_out_into_single_error() {
    init_test_tracing();
    let eval = evaluator(Slow, Duration::from_secs(30));

    let results = eval.condition_eval(&condition(), now()).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].state, State::Error);
    assert!(results[0].instance.is_empty());
    let msg = results[0].error.as_ref().unwrap().to_string();
    assert!(msg.contains("deadline exceeded"), "{msg}");
}

#[tokio::test]
async fn unbounded_timeout_still_evaluates() {
    let response = QueryDataResponse::from_json(RESPONSE_JSON).unwrap();
    let eval = evaluator(Replay::new(response), Duration::MAX);

    let results = eval.condition_eval(&condition(), now()).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].state, State::Alerting);

    let queries = vec![AlertQuery::new("A", "prom", serde_json::json!({}))];
    assert!(
        eval.queries_and_expressions_eval(1, &queries, now())
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn panicking_backend_becomes_error_result() {
    init_test_tracing();
    let eval = evaluator(Panicking, Duration::from_secs(5));

    let results = eval.condition_eval(&condition(), now()).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].state, State::Error);
    assert!(results[0].info().contains("alert rule panic"));
}

#[tokio::test]
async fn backend_failure_becomes_error_result() {
    let eval = evaluator(Failing, Duration::from_secs(5));

    let results = eval.condition_eval(&condition(), now()).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].state, State::Error);
    assert!(results[0].info().contains("connection refused"));
}

#[tokio::test]
async fn condition_ref_error_is_reported() {
    let response = QueryDataResponse::default()
        .with_response("A", DataResponse::ok(vec![]))
        .with_response("B", DataResponse::failed("math: division by zero"));
    let eval = evaluator(Replay::new(response), Duration::from_secs(5));

    let results = eval.condition_eval(&condition(), now()).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].state, State::Error);
    assert_eq!(results[0].info(), "query B failed: math: division by zero");
}

#[tokio::test]
async fn invalid_condition_is_rejected_before_backend_call() {
    let backend = Arc::new(Replay::new(QueryDataResponse::default()));
    let eval = Evaluator::from_evaluation_config(
        &EvaluationConfig::new(Duration::from_secs(5), true),
        backend.clone(),
    );
    let mut cond = condition();
    cond.condition = "C".into();

    assert!(eval.condition_eval(&cond, now()).await.is_err());
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn non_object_model_is_rejected() {
    let eval = evaluator(Replay::new(QueryDataResponse::default()), Duration::from_secs(5));
    let cond = Condition {
        condition: "A".into(),
        org_id: 1,
        data: vec![AlertQuery::new("A", "prom", serde_json::json!("up"))],
    };

    assert!(eval.condition_eval(&cond, now()).await.is_err());
}

#[tokio::test]
async fn disabled_expressions_yield_error_result() {
    let eval = Evaluator::from_evaluation_config(
        &EvaluationConfig::new(Duration::from_secs(5), false),
        Arc::new(Replay::new(QueryDataResponse::default())),
    );

    let results = eval.condition_eval(&condition(), now()).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].state, State::Error);
    assert_eq!(results[0].info(), "server-side expressions are disabled");
}

// ---------------------------------------------------------------------------
// queries_and_expressions_eval
// ---------------------------------------------------------------------------

#[tokio::test]
async fn raw_queries_return_backend_response() {
    let response = QueryDataResponse::default().with_response(
        "A",
        DataResponse::ok(vec![Frame::new("A").with_field(Field::number("A", [Some(3.0)]))]),
    );
    let eval = evaluator(Replay::new(response), Duration::from_secs(5));
    let queries = vec![
        AlertQuery::new("A", "prom", serde_json::json!({ "expr": "up" })).with_time_range(
            RelativeTimeRange::new(Duration::from_secs(300), Duration::ZERO),
        ),
    ];

    let resp = eval
        .queries_and_expressions_eval(1, &queries, now())
        .await
        .unwrap();

    assert_eq!(resp.get("A").unwrap().frames.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn raw_queries_surface_timeout_as_err() {
    let eval = evaluator(Slow, Duration::from_secs(1));
    let queries = vec![AlertQuery::new("A", "prom", serde_json::json!({}))];

    assert!(
        eval.queries_and_expressions_eval(1, &queries, now())
            .await
            .is_err()
    );
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn metrics_count_evaluations_and_states() {
    let config: AlertEvalConfig = r#"
[evaluation]
timeout = "5s"

[metrics]
enabled = true
"#
    .parse()
    .unwrap();
    let response = QueryDataResponse::from_json(RESPONSE_JSON).unwrap();
    let eval = Evaluator::new(&config, Arc::new(Replay::new(response)));

    eval.condition_eval(&condition(), now()).await.unwrap();
    eval.condition_eval(&condition(), now()).await.unwrap();

    let metrics = eval.metrics().unwrap();
    assert_eq!(metrics.evaluations(), 2);
    assert_eq!(metrics.failures(), 0);
    assert_eq!(metrics.results(State::Alerting), 2);
    assert_eq!(metrics.results(State::Normal), 2);
    assert!(metrics.summary_line().contains("evaluations=2"));
}

#[tokio::test]
async fn metrics_absent_when_disabled() {
    let config = AlertEvalConfig::default();
    let eval = Evaluator::new(&config, Arc::new(Replay::new(QueryDataResponse::default())));
    assert!(eval.metrics().is_none());
    assert_eq!(eval.timeout(), Duration::from_secs(30));
}
