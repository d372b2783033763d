//! Integration tests for the read-only API.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use events::RawEnvelope;
use indexer::{AppState, create_app};
use ingestion::{IngestionPipeline, PipelineConfig, VecFeed};
use metrics_exporter_prometheus::PrometheusHandle;
use record_store::InMemoryRecordStore;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn raw(kind: &str, block: u64, transfer_id: &str, payload: serde_json::Value) -> RawEnvelope {
    serde_json::from_value(serde_json::json!({
        "event_kind": kind,
        "source_block": block,
        "source_tx_index": 0,
        "source_event_index": 0,
        "transfer_id": transfer_id,
        "payload": payload,
    }))
    .unwrap()
}

/// Two launches, liquidity for one, a buy, liquidity for an unknown token,
/// and one envelope of an unknown kind.
fn envelopes() -> Vec<RawEnvelope> {
    vec![
        raw(
            "LaunchCreated",
            10,
            "t-1",
            serde_json::json!({
                "transaction_hash": "0xt1",
                "memecoin_address": "0xa",
                "owner_address": "0xowner",
                "total_supply": "1000"
            }),
        ),
        raw(
            "LaunchCreated",
            11,
            "t-2",
            serde_json::json!({
                "transaction_hash": "0xt2",
                "memecoin_address": "0xb",
                "owner_address": "0xother",
                "total_supply": "500"
            }),
        ),
        raw(
            "LiquidityAdded",
            12,
            "t-3",
            serde_json::json!({ "memecoin_address": "0xa", "amount": "10" }),
        ),
        raw(
            "Transfer",
            13,
            "t-4",
            serde_json::json!({
                "memecoin_address": "0xa",
                "owner_address": "0xbuyer",
                "side": "buy",
                "amount": "5"
            }),
        ),
        raw(
            "LiquidityAdded",
            14,
            "t-5",
            serde_json::json!({ "memecoin_address": "0xzz" }),
        ),
        raw("Burn", 15, "t-6", serde_json::json!({})),
    ]
}

async fn setup() -> axum::Router {
    let store = InMemoryRecordStore::new();
    IngestionPipeline::new(
        store.clone(),
        VecFeed::new("launchpad", envelopes()),
        PipelineConfig::default(),
    )
    .run()
    .await
    .unwrap();

    let state = AppState::new(Arc::new(store));
    create_app(Arc::new(state), get_metrics_handle())
}

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_health_check() {
    let (status, json) = get_json(setup().await, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json.get("pipeline").is_none());
}

#[tokio::test]
async fn test_health_reports_pipeline_state() {
    let store = InMemoryRecordStore::new();
    let pipeline = IngestionPipeline::new(
        store.clone(),
        VecFeed::new("launchpad", Vec::new()),
        PipelineConfig::default(),
    );
    let state = AppState::new(Arc::new(store)).with_pipeline(pipeline.handle());
    let app = create_app(Arc::new(state), get_metrics_handle());

    let (_, json) = get_json(app.clone(), "/health").await;
    assert_eq!(json["pipeline"], "Idle");

    pipeline.run().await.unwrap();
    let (_, json) = get_json(app, "/health").await;
    assert_eq!(json["pipeline"], "Stopped");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_get_launch_by_address() {
    let (status, json) = get_json(setup().await, "/launches/0xa").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["transaction_hash"], "0xt1");
    assert_eq!(json["is_liquidity_added"], true);
    assert_eq!(json["liquidity_added_at_block"], 12);
    assert_eq!(json["created_at_block"], 10);
}

#[tokio::test]
async fn test_get_launch_by_tx_hash() {
    let (status, json) = get_json(setup().await, "/launches/by-tx/0xt2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["memecoin_address"], "0xb");
    assert_eq!(json["is_liquidity_added"], false);
}

#[tokio::test]
async fn test_unknown_records_are_404() {
    let app = setup().await;
    for uri in [
        "/launches/0xnope",
        "/launches/by-tx/0xnope",
        "/transactions/t-404",
        "/cursors/unknown-source",
    ] {
        let (status, json) = get_json(app.clone(), uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert!(json["error"].as_str().is_some(), "{uri}");
    }
}

#[tokio::test]
async fn test_list_launches_with_filters() {
    let app = setup().await;

    let (status, json) = get_json(app.clone(), "/launches").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 2);

    let (_, json) = get_json(app.clone(), "/launches?liquidity_added=true").await;
    let launches = json.as_array().unwrap();
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0]["memecoin_address"], "0xa");

    let (_, json) = get_json(app.clone(), "/launches?owner=0xother").await;
    assert_eq!(json[0]["memecoin_address"], "0xb");

    let (_, json) = get_json(app.clone(), "/launches?limit=1&offset=1").await;
    let launches = json.as_array().unwrap();
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0]["memecoin_address"], "0xb");

    let (status, _) = get_json(app, "/launches?limit=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_transactions_for_launch() {
    let (status, json) = get_json(setup().await, "/launches/0xa/transactions").await;
    assert_eq!(status, StatusCode::OK);
    let kinds: Vec<_> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|tx| tx["kind"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(kinds, vec!["launch", "liquidity_added", "buy"]);
}

#[tokio::test]
async fn test_get_transaction() {
    let (status, json) = get_json(setup().await, "/transactions/t-4").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["kind"], "buy");
    assert_eq!(json["owner_address"], "0xbuyer");
    assert_eq!(json["block"], 13);
}

#[tokio::test]
async fn test_dead_letters_list_both_reasons() {
    let (status, json) = get_json(setup().await, "/dead-letters").await;
    assert_eq!(status, StatusCode::OK);
    let mut reasons: Vec<_> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["reason"].as_str().unwrap().to_string())
        .collect();
    reasons.sort();
    assert_eq!(reasons, vec!["malformed", "missing_launch"]);
}

#[tokio::test]
async fn test_cursor_for_source() {
    let (status, json) = get_json(setup().await, "/cursors/launchpad").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["source_id"], "launchpad");
    assert_eq!(json["last_applied_block"], 15);
}
