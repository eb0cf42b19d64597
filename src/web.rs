//! Axum-based HTTP API for entries, sensors and the setup wizard
//!
//! With the `openapi` feature the router also serves `/docs` (Swagger UI) and
//! the config JSON schema.

use crate::coordinator::{RateSource, RefreshStatus};
use crate::error::UtilityCostsError;
use crate::integration::Integration;
use crate::logging::get_logger;
use crate::sensor::{SensorState, sensors_for};
use crate::setup::{ABORT_ALREADY_CONFIGURED, FlowResult, SetupFlow};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Wizards idle longer than this are dropped
pub const FLOW_TTL: Duration = Duration::from_secs(60 * 60);

/// Setup wizard waiting for its next submission
pub struct PendingFlow {
    flow: SetupFlow,
    touched: Instant,
}

impl PendingFlow {
    fn new(flow: SetupFlow) -> Self {
        Self {
            flow,
            touched: Instant::now(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub integration: Integration,
    pub flows: Arc<Mutex<HashMap<String, PendingFlow>>>,
}

impl AppState {
    pub fn new(integration: Integration) -> Self {
        Self {
            integration,
            flows: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

fn prune_flows(flows: &mut HashMap<String, PendingFlow>) {
    let before = flows.len();
    flows.retain(|_, pending| pending.touched.elapsed() < FLOW_TTL);
    let dropped = before - flows.len();
    if dropped > 0 {
        get_logger("web").debug(&format!("Dropped {} abandoned setup flows", dropped));
    }
}

/// Error body `{"error": "..."}` with a status derived from the error kind
pub struct ApiError(UtilityCostsError);

impl From<UtilityCostsError> for ApiError {
    fn from(err: UtilityCostsError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            UtilityCostsError::NotFound { .. } => StatusCode::NOT_FOUND,
            UtilityCostsError::AlreadyConfigured { .. } | UtilityCostsError::Validation { .. } => {
                StatusCode::CONFLICT
            }
            e if e.is_fetch_error() => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct FlowResponse {
    pub flow_id: String,
    pub result: Value,
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/health", responses(
    (status = 200, description = "Service is healthy")
)))]
async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/version", responses((status = 200))))]
async fn version() -> impl IntoResponse {
    Json(json!({"name": env!("CARGO_PKG_NAME"), "version": env!("APP_VERSION")}))
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/entries", responses((status = 200))))]
async fn list_entries(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.integration.entry_states().await)
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/entries/{id}", responses(
    (status = 200), (status = 404, description = "Unknown entry")
)))]
async fn get_entry(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Response> {
    Ok(Json(state.integration.entry(&id).await?).into_response())
}

#[cfg_attr(feature = "openapi", utoipa::path(delete, path = "/api/entries/{id}", responses(
    (status = 200), (status = 404, description = "Unknown entry")
)))]
async fn delete_entry(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Response> {
    let removed = state.integration.remove_entry(&id).await?;
    Ok(Json(json!({"ok": true, "entry_id": removed.entry_id})).into_response())
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/entries/{id}/reload", responses((status = 200))))]
async fn reload_entry(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Response> {
    let outcome = state.integration.reload_entry(&id).await;
    let view = state.integration.entry(&id).await?;
    let body = match outcome {
        Ok(()) => json!({"ok": true, "entry": view}),
        Err(e) => json!({"ok": false, "error": e.to_string(), "entry": view}),
    };
    Ok(Json(body).into_response())
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/entries/{id}/refresh", responses(
    (status = 200), (status = 409, description = "Entry is not loaded")
)))]
async fn refresh_entry(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Response> {
    let body = match state.integration.refresh_entry(&id).await? {
        Some(success) => json!({"refreshed": true, "success": success}),
        None => json!({"refreshed": false, "reason": "refresh already in progress"}),
    };
    Ok(Json(body).into_response())
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/entries/{id}/sensors", responses((status = 200))))]
async fn entry_sensors(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Response> {
    Ok(Json(state.integration.sensor_states(&id).await?).into_response())
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/sensors", responses((status = 200))))]
async fn all_sensors(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.integration.all_sensor_states().await)
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/entries/{id}/events", responses((status = 200))))]
async fn entry_events(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Response> {
    let rx = state.integration.subscribe(&id).await?;
    let coordinator = state
        .integration
        .coordinator(&id)
        .await
        .ok_or_else(|| UtilityCostsError::not_found(format!("Config entry '{}' is not loaded", id)))?;
    let sensors = sensors_for(&id, coordinator.provider());

    let stream = WatchStream::new(rx).map(move |refresh| {
        let now = Utc::now();
        let states: Vec<SensorState> = sensors
            .iter()
            .map(|s| s.state(&*coordinator, now))
            .collect();
        Event::default().event("state").json_data(json!({
            "refresh": RefreshStatus::from(&*refresh),
            "sensors": states,
        }))
    });
    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response())
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/flows", responses((status = 200, body = FlowResponse))))]
async fn start_flow(State(state): State<AppState>) -> impl IntoResponse {
    let mut flow = SetupFlow::new(
        state.integration.fetcher(),
        state.integration.config().setup.default_api_url.clone(),
    );
    let result = flow.start();
    let flow_id = flow.flow_id().to_string();
    let mut flows = state.flows.lock().await;
    prune_flows(&mut flows);
    flows.insert(flow_id.clone(), PendingFlow::new(flow));
    drop(flows);
    Json(FlowResponse {
        flow_id,
        result: serde_json::to_value(&result).unwrap_or(Value::Null),
    })
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/flows/{flow_id}", responses(
    (status = 200, body = FlowResponse), (status = 404, description = "Unknown flow")
)))]
async fn submit_flow(
    State(state): State<AppState>,
    Path(flow_id): Path<String>,
    Json(input): Json<Value>,
) -> ApiResult<Response> {
    let pending = {
        let mut flows = state.flows.lock().await;
        prune_flows(&mut flows);
        flows.remove(&flow_id)
    };
    let Some(PendingFlow { mut flow, .. }) = pending else {
        return Err(UtilityCostsError::not_found(format!("Setup flow '{}' does not exist", flow_id)).into());
    };

    let configured = state.integration.configured_unique_ids().await;
    let result = flow.submit(input, &configured).await;
    if !result.is_terminal() {
        state
            .flows
            .lock()
            .await
            .insert(flow_id.clone(), PendingFlow::new(flow));
    }

    let result = match result {
        FlowResult::CreateEntry { title, data } => {
            match state.integration.create_entry(&title, data).await {
                Ok(created) => json!({
                    "type": "create_entry",
                    "title": created.entry.title,
                    "entry_id": created.entry.entry_id,
                    "data": created.entry.data.redacted(),
                    "setup_error": created.setup_error,
                }),
                Err(UtilityCostsError::AlreadyConfigured { .. }) => {
                    serde_json::to_value(FlowResult::Abort {
                        reason: ABORT_ALREADY_CONFIGURED.to_string(),
                    })
                    .map_err(UtilityCostsError::from)?
                }
                Err(e) => return Err(e.into()),
            }
        }
        other => serde_json::to_value(&other).map_err(UtilityCostsError::from)?,
    };

    Ok(Json(FlowResponse { flow_id, result }).into_response())
}

#[cfg_attr(feature = "openapi", utoipa::path(delete, path = "/api/flows/{flow_id}", responses((status = 200))))]
async fn abort_flow(State(state): State<AppState>, Path(flow_id): Path<String>) -> ApiResult<Response> {
    match state.flows.lock().await.remove(&flow_id) {
        Some(_) => Ok(Json(json!({"ok": true})).into_response()),
        None => Err(UtilityCostsError::not_found(format!("Setup flow '{}' does not exist", flow_id)).into()),
    }
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/config", responses((status = 200))))]
async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::to_value(state.integration.config()).unwrap_or(json!({"error":"serialization"})))
}

#[cfg(feature = "openapi")]
#[utoipa::path(get, path = "/api/config/schema", responses((status = 200)))]
async fn get_config_schema() -> impl IntoResponse {
    let schema = schemars::schema_for!(crate::config::Config);
    Json(serde_json::to_value(&schema).unwrap_or(json!({"error":"schema"})))
}

#[cfg(feature = "openapi")]
#[derive(utoipa::OpenApi)]
#[openapi(
    paths(
        health, version, list_entries, get_entry, delete_entry, reload_entry,
        refresh_entry, entry_sensors, all_sensors, entry_events,
        start_flow, submit_flow, abort_flow, get_config, get_config_schema,
    ),
    components(schemas(
        FlowResponse,
        crate::setup::FlowResult,
        crate::setup::FlowStep,
        crate::integration::EntryView,
        crate::integration::EntryState,
        crate::coordinator::RefreshStatus,
        crate::entries::ConfigEntry,
        crate::rates::ProviderConfig,
        crate::rates::ProviderType,
    )),
    tags((name = "utility-costs", description = "Utility Costs rate sensors API"))
)]
pub struct ApiDoc;

pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/api/health", get(health))
        .route("/api/version", get(version))
        .route("/api/entries", get(list_entries))
        .route("/api/entries/{id}", get(get_entry).delete(delete_entry))
        .route("/api/entries/{id}/reload", post(reload_entry))
        .route("/api/entries/{id}/refresh", post(refresh_entry))
        .route("/api/entries/{id}/sensors", get(entry_sensors))
        .route("/api/entries/{id}/events", get(entry_events))
        .route("/api/sensors", get(all_sensors))
        .route("/api/flows", post(start_flow))
        .route("/api/flows/{flow_id}", post(submit_flow).delete(abort_flow))
        .route("/api/config", get(get_config));

    #[cfg(feature = "openapi")]
    let router = {
        use utoipa::OpenApi;
        router
            .route("/api/config/schema", get(get_config_schema))
            .merge(utoipa_swagger_ui::SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
    };

    router
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until `shutdown` resolves
pub async fn serve<F>(integration: Integration, host: &str, port: u16, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = build_router(AppState::new(integration));
    let logger = get_logger("web");
    logger.info(&format!(
        "Starting web server; requested host={}, port={}",
        host, port
    ));

    let addr = match host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port),
        Err(_) => {
            logger.warn(&format!("Invalid host '{}'; falling back to 127.0.0.1", host));
            ([127, 0, 0, 1], port).into()
        }
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    logger.info(&format!(
        "Web server listening at http://{}:{} (API /api)",
        local_addr.ip(),
        local_addr.port()
    ));

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    logger.info("Web server stopped");
    Ok(())
}
