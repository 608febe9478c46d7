//! Integration tests for the resolver API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use fleet_lib::{
    catalog::CatalogSources,
    health::{components, HealthRegistry},
    FleetResolver, FleetResolverConfig, ManualClock, StructuredLogger, ZoneTable,
};
use fleet_resolver::{
    api::{create_router, AppState},
    sources::SnapshotInventory,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

fn quota_response(records: Value) -> String {
    json!({
        "Response": {
            "RequestId": "req-1",
            "InstanceTypeQuotaSet": records.to_string(),
        }
    })
    .to_string()
}

fn write_snapshot(dir: &Path) {
    std::fs::write(
        dir.join("cluster.json"),
        json!({"serverVersion": "v1.30.2-tke.1", "network": {"networkType": "VPC-CNI"}}).to_string(),
    )
    .unwrap();
    std::fs::write(
        dir.join("quota-on-demand.json"),
        quota_response(json!([
            {"Zone": "ap-guangzhou-3", "InstanceFamily": "S5", "InstanceType": "S5.LARGE8",
             "Cpu": 4, "Memory": 8, "Status": "SELL", "Inventory": 10, "Price": {"UnitPrice": 0.50}},
            {"Zone": "ap-guangzhou-3", "InstanceFamily": "S5", "InstanceType": "S5.MEDIUM4",
             "Cpu": 2, "Memory": 4, "Status": "SELL", "Inventory": 10, "Price": {"UnitPrice": 0.25}}
        ])),
    )
    .unwrap();
    std::fs::write(
        dir.join("quota-spot.json"),
        quota_response(json!([
            {"Zone": "ap-guangzhou-3", "InstanceFamily": "S5", "InstanceType": "S5.LARGE8",
             "Cpu": 4, "Memory": 8, "Status": "SELL", "Inventory": 10, "Price": {"UnitPrice": 0.30}},
            {"Zone": "ap-guangzhou-3", "InstanceFamily": "SA2", "InstanceType": "SA2.LARGE8",
             "Cpu": 4, "Memory": 8, "Status": "SELL", "Inventory": 10, "Price": {"UnitPrice": 0.80}}
        ])),
    )
    .unwrap();
}

fn node_class() -> Value {
    json!({
        "name": "default",
        "subnets": [{"id": "subnet-3", "zone": "ap-guangzhou-3"}]
    })
}

async fn setup_test_app() -> (Router, Arc<AppState>, TempDir) {
    let (router, state, dir, _clock) = setup_test_app_with_clock().await;
    (router, state, dir)
}

async fn setup_test_app_with_clock() -> (Router, Arc<AppState>, TempDir, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let dir = tempfile::tempdir().unwrap();
    write_snapshot(dir.path());

    let inventory = Arc::new(SnapshotInventory::new(dir.path()));
    let sources = CatalogSources {
        quotas: inventory.clone(),
        pod_limits: inventory.clone(),
        cluster: inventory,
        zones: Arc::new(ZoneTable::default()),
    };
    let resolver = FleetResolver::new(
        sources,
        FleetResolverConfig::default(),
        clock.clone(),
        StructuredLogger::new("test"),
    )
    .unwrap();

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let state = Arc::new(AppState::new(Arc::new(resolver), health_registry));
    let router = create_router(state.clone());

    (router, state, dir, clock)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state, _dir) = setup_test_app().await;
    let (status, health) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state, _dir) = setup_test_app().await;
    state
        .health_registry
        .set_unhealthy(components::BLOCKLIST, "poisoned")
        .await;

    let (status, health) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_follows_startup() {
    let (app, state, _dir) = setup_test_app().await;
    let (status, readiness) = get(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);

    state.health_registry.set_ready(true).await;
    let (status, readiness) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_list_instance_types() {
    let (app, _state, _dir) = setup_test_app().await;
    let (status, body) = post(
        app,
        "/v1/instance-types",
        json!({"node_class": node_class(), "refresh": true}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let names: Vec<_> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|it| it["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["S5.LARGE8", "S5.MEDIUM4", "SA2.LARGE8"]);
    assert_eq!(body[0]["offerings"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_launch_drops_spot_pricier_than_on_demand() {
    let (app, _state, _dir) = setup_test_app().await;
    let request = json!({
        "requirements": [{
            "key": "karpenter.sh/capacity-type",
            "operator": "In",
            "values": ["spot", "on-demand"]
        }],
        "resources": {"cpu": "3"}
    });
    let (status, selection) = post(
        app,
        "/v1/launch",
        json!({"node_class": node_class(), "request": request}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(selection["instance_type"]["name"], "S5.LARGE8");
    assert_eq!(selection["capacity_type"], "spot");
    assert_eq!(selection["subnet_id"], "subnet-3");
    assert_eq!(selection["zone_id"], "100003");
}

#[tokio::test]
async fn test_launch_without_subnets_is_422() {
    let (app, _state, _dir) = setup_test_app().await;
    let (status, body) = post(
        app,
        "/v1/launch",
        json!({"node_class": {"name": "bare"}, "request": {}}),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "configuration");
}

#[tokio::test]
async fn test_select_with_no_candidates_is_409() {
    let (app, _state, _dir) = setup_test_app().await;
    let (status, body) = post(
        app,
        "/v1/select",
        json!({"node_class": node_class(), "candidates": []}),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "no_candidates");
}

#[tokio::test]
async fn test_select_restores_catalog_health() {
    let (app, state, _dir) = setup_test_app().await;
    let (_, candidates) = post(
        app.clone(),
        "/v1/instance-types",
        json!({"node_class": node_class()}),
    )
    .await;
    state
        .health_registry
        .set_degraded(components::CATALOG, "stale overrides")
        .await;

    let (status, selection) = post(
        app,
        "/v1/select",
        json!({"node_class": node_class(), "candidates": candidates}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(selection["instance_type"]["name"], "S5.MEDIUM4");
    assert_eq!(
        state.health_registry.status(components::CATALOG).await,
        Some(fleet_lib::ComponentStatus::Healthy)
    );
}

#[tokio::test]
async fn test_purge_reports_live_blocks_on_blocklist_health() {
    let (app, state, _dir, clock) = setup_test_app_with_clock().await;
    post(
        app.clone(),
        "/v1/blocks",
        json!({"instance_type": "S5.LARGE8", "reason": "maintenance"}),
    )
    .await;

    state.purge_expired().await;
    let (status, health) = get(app.clone(), "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["components"]["blocklist"]["status"], "degraded");
    assert_eq!(
        health["components"]["blocklist"]["message"],
        "1 offering patterns blocked"
    );

    clock.advance(Duration::from_secs(601));
    assert_eq!(state.purge_expired().await, 1);
    let (_, health) = get(app, "/healthz").await;
    assert_eq!(health["components"]["blocklist"]["status"], "healthy");
}

#[tokio::test]
async fn test_vendor_failure_is_502_and_degrades_health() {
    let (app, state, dir) = setup_test_app().await;
    std::fs::remove_file(dir.path().join("quota-spot.json")).unwrap();

    let (status, body) = post(
        app.clone(),
        "/v1/instance-types",
        json!({"node_class": node_class()}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "vendor_fetch");

    let (status, health) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
    assert_eq!(
        state.health_registry.status(components::VENDOR).await,
        Some(fleet_lib::ComponentStatus::Degraded)
    );
}

#[tokio::test]
async fn test_block_round_trip() {
    let (app, _state, _dir) = setup_test_app().await;
    let (status, body) = post(
        app.clone(),
        "/v1/blocks",
        json!({"capacity_type": "spot", "zone": "ap-guangzhou-3", "reason": "maintenance"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["blocked"], true);

    let (_, body) = get(
        app.clone(),
        "/v1/blocks/check?instance_type=S5.LARGE8&capacity_type=spot&zone=ap-guangzhou-3",
    )
    .await;
    assert_eq!(body["blocked"], true);

    let (_, body) = get(
        app.clone(),
        "/v1/blocks/check?instance_type=S5.LARGE8&capacity_type=on-demand&zone=ap-guangzhou-3",
    )
    .await;
    assert_eq!(body["blocked"], false);

    let (_, entries) = get(app, "/v1/blocks").await;
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["reason"], "maintenance");
    assert_eq!(entries[0]["key"]["instance_type"], "any");
}

#[tokio::test]
async fn test_failure_reports_are_counted() {
    let (app, _state, _dir) = setup_test_app().await;
    let report = json!({
        "instance_type": "S5.LARGE8",
        "capacity_type": "spot",
        "zone": "ap-guangzhou-3",
        "reason": "InvalidConfiguration",
        "message": "Code=ResourceInsufficient.SpecifiedInstanceType"
    });

    let (status, outcome) = post(app.clone(), "/v1/failures", report).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["outcome"], "recorded");
    assert_eq!(outcome["refresh"], true);

    let (_, body) = get(
        app.clone(),
        "/v1/failures/count?instance_type=S5.LARGE8&capacity_type=spot&zone=ap-guangzhou-3",
    )
    .await;
    assert_eq!(body["count"], 1);

    let (_, body) = get(app, "/v1/failures/count?capacity_type=spot&zone=ap-guangzhou-3").await;
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _state, _dir) = setup_test_app().await;
    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("fleet_resolver_catalog_instance_types"));
}
