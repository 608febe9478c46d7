//! HTTP API for the resolver, health checks and Prometheus metrics

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use fleet_lib::{
    health::{components, ComponentStatus, HealthRegistry},
    BlockEntry, CapacityType, FailureKey, FailureOutcome, FailureReport, FleetError,
    FleetResolver, InstanceType, NodeClass, SchedulingRequest, Scope, Selection,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<FleetResolver>,
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(resolver: Arc<FleetResolver>, health_registry: HealthRegistry) -> Self {
        Self {
            resolver,
            health_registry,
        }
    }

    /// Drop expired failure state and report live blocks on the blocklist component
    pub async fn purge_expired(&self) -> usize {
        let removed = self.resolver.purge_expired();
        let blocked = self.resolver.failures().blocked_entries().len();
        if blocked == 0 {
            self.health_registry.set_healthy(components::BLOCKLIST).await;
        } else {
            self.health_registry
                .set_degraded(
                    components::BLOCKLIST,
                    format!("{blocked} offering patterns blocked"),
                )
                .await;
        }
        removed
    }

    /// Reflect the result of an engine call that reached the vendor
    async fn track<T>(&self, result: &Result<T, FleetError>) {
        match result {
            Ok(_) => self.health_registry.set_healthy(components::VENDOR).await,
            Err(FleetError::Fetch(e)) => {
                self.health_registry
                    .set_degraded(components::VENDOR, e.to_string())
                    .await;
            }
            Err(_) => {}
        }
        self.track_catalog(result).await;
    }

    /// Reflect an engine result in catalog health
    async fn track_catalog<T>(&self, result: &Result<T, FleetError>) {
        match result {
            Ok(_) => self.health_registry.set_healthy(components::CATALOG).await,
            Err(FleetError::Config(e)) => {
                self.health_registry
                    .set_degraded(components::CATALOG, e.to_string())
                    .await;
            }
            Err(_) => {}
        }
    }
}

/// Engine error rendered as `{error, code}`
pub struct ApiError(FleetError);

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

impl From<FleetError> for ApiError {
    fn from(err: FleetError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            FleetError::Config(_) => StatusCode::UNPROCESSABLE_ENTITY,
            FleetError::Fetch(_) => StatusCode::BAD_GATEWAY,
            FleetError::InsufficientCapacity(_) => StatusCode::CONFLICT,
        };
        if status != StatusCode::CONFLICT {
            warn!(error = %self.0, "Request failed");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            code: self.0.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListRequest {
    pub node_class: NodeClass,
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SelectRequest {
    pub node_class: NodeClass,
    #[serde(default)]
    pub request: SchedulingRequest,
    pub candidates: Vec<InstanceType>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LaunchRequest {
    pub node_class: NodeClass,
    #[serde(default)]
    pub request: SchedulingRequest,
}

/// A failure pattern; absent fields are wildcards
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PatternQuery {
    pub instance_type: Option<String>,
    pub capacity_type: Option<CapacityType>,
    pub zone: Option<String>,
}

impl PatternQuery {
    fn key(self) -> FailureKey {
        FailureKey::new(
            Scope::from(self.instance_type),
            Scope::from(self.capacity_type),
            Scope::from(self.zone),
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlockRequest {
    #[serde(flatten)]
    pub pattern: PatternQuery,
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OfferingQuery {
    pub instance_type: String,
    pub capacity_type: CapacityType,
    pub zone: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlockedResponse {
    pub blocked: bool,
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            e.to_string().into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

async fn list_instance_types(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ListRequest>,
) -> Result<Json<Vec<InstanceType>>, ApiError> {
    let result = state
        .resolver
        .list_instance_types(&body.node_class, body.refresh)
        .await;
    state.track(&result).await;
    Ok(Json(result?))
}

async fn select(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SelectRequest>,
) -> Result<Json<Selection>, ApiError> {
    let result = state
        .resolver
        .select_instance_type(&body.node_class, body.candidates, &body.request);
    state.track_catalog(&result).await;
    Ok(Json(result?))
}

async fn launch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LaunchRequest>,
) -> Result<Json<Selection>, ApiError> {
    let result = state.resolver.launch(&body.node_class, &body.request).await;
    state.track(&result).await;
    Ok(Json(result?))
}

async fn report_failure(
    State(state): State<Arc<AppState>>,
    Json(report): Json<FailureReport>,
) -> Json<FailureOutcome> {
    Json(state.resolver.report_failure(&report))
}

async fn failure_count(
    State(state): State<Arc<AppState>>,
    Query(pattern): Query<PatternQuery>,
) -> Json<CountResponse> {
    let count = state.resolver.failures().failure_count(&pattern.key());
    Json(CountResponse { count })
}

async fn add_block(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BlockRequest>,
) -> Json<BlockedResponse> {
    state
        .resolver
        .failures()
        .block(body.pattern.key(), body.reason);
    Json(BlockedResponse { blocked: true })
}

async fn list_blocks(State(state): State<Arc<AppState>>) -> Json<Vec<BlockEntry>> {
    Json(state.resolver.failures().blocked_entries())
}

async fn check_block(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OfferingQuery>,
) -> Json<BlockedResponse> {
    let blocked =
        state
            .resolver
            .failures()
            .is_blocked(&query.instance_type, query.capacity_type, &query.zone);
    Json(BlockedResponse { blocked })
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/v1/instance-types", post(list_instance_types))
        .route("/v1/select", post(select))
        .route("/v1/launch", post(launch))
        .route("/v1/failures", post(report_failure))
        .route("/v1/failures/count", get(failure_count))
        .route("/v1/blocks", get(list_blocks).post(add_block))
        .route("/v1/blocks/check", get(check_block))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
