// SPDX-FileCopyrightText: © 2025 RouteKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

use routekit_core::loopback::LoopbackSdk;
use routekit_core::router::{Router as MatrixRouter, RouterConfig};
use routekit_core::sdk::SdkSession;
use routekit_core::{PreviewMonitor, RouterError, RouterHandle};

use crate::config::Config;
use crate::state::AppState;

/// Error envelope for the control surface: every failure is `{"error": …}`
/// with a status matching the error class.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }
}

impl From<RouterError> for ApiError {
    fn from(err: RouterError) -> Self {
        let status = match &err {
            RouterError::NotFound(_) => StatusCode::NOT_FOUND,
            RouterError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RouterError::ResourceCreate(_) | RouterError::Init(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
            RouterError::ChannelClosed => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self { status, message: err.to_string() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Success envelope: `{"success": true, "message": …}`.
fn success(message: impl Into<String>) -> Json<serde_json::Value> {
    Json(json!({ "success": true, "message": message.into() }))
}

/// Unwraps a JSON body, turning axum's rejection into the error envelope.
fn require_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(rejection) => Err(ApiError::bad_request(format!("Invalid request body: {rejection}"))),
    }
}

async fn health_handler() -> impl IntoResponse {
    let timestamp = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    Json(json!({ "status": "ok", "timestamp": timestamp }))
}

async fn list_sources_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.router.discover_sources().await?))
}

async fn list_studio_monitors_handler(
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.router.discover_studio_monitors().await?))
}

async fn reset_studio_monitors_handler(
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    let monitors = state.router.discover_studio_monitors().await?;
    let names: Vec<String> = monitors.into_iter().map(|m| m.name).collect();
    Ok(Json(json!({
        "success": true,
        "message": "Studio monitors reset to None",
        "monitors": names,
        "count": names.len(),
    })))
}

async fn get_source_slots_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.router.source_slots().await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignSlotRequest {
    slot_number: u32,
    ndi_source_name: String,
    #[serde(default)]
    display_name: Option<String>,
}

async fn assign_source_slot_handler(
    State(state): State<AppState>,
    payload: Result<Json<AssignSlotRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let req = require_body(payload)?;
    if req.ndi_source_name.is_empty() {
        return Err(ApiError::bad_request("ndiSourceName must not be empty"));
    }
    state
        .router
        .assign_slot(req.slot_number, req.ndi_source_name, req.display_name.unwrap_or_default())
        .await?;
    Ok(success("Source assigned to slot successfully"))
}

async fn unassign_source_slot_handler(
    State(state): State<AppState>,
    Path(slot): Path<u32>,
) -> ApiResult<impl IntoResponse> {
    state.router.unassign_slot(slot).await?;
    Ok(success("Source slot unassigned successfully"))
}

async fn get_destinations_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.router.destinations().await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateDestinationRequest {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

async fn create_destination_handler(
    State(state): State<AppState>,
    payload: Result<Json<CreateDestinationRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let req = require_body(payload)?;
    state.router.create_destination(req.name, req.description.unwrap_or_default()).await?;
    Ok(success("Matrix destination created successfully"))
}

async fn remove_destination_handler(
    State(state): State<AppState>,
    Path(slot): Path<u32>,
) -> ApiResult<impl IntoResponse> {
    state.router.remove_destination(slot).await?;
    Ok(success("Matrix destination removed successfully"))
}

async fn unassign_destination_handler(
    State(state): State<AppState>,
    Path(slot): Path<u32>,
) -> ApiResult<impl IntoResponse> {
    state.router.unassign_destination(slot).await?;
    Ok(success("Destination unassigned successfully"))
}

async fn get_routes_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.router.routes().await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouteRequest {
    source_slot: u32,
    destination_slot: u32,
}

async fn create_route_handler(
    State(state): State<AppState>,
    payload: Result<Json<RouteRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let req = require_body(payload)?;
    state.router.create_route(req.source_slot, req.destination_slot).await?;
    Ok(success("Matrix route created successfully"))
}

async fn remove_route_handler(
    State(state): State<AppState>,
    payload: Result<Json<RouteRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let req = require_body(payload)?;
    state.router.remove_route(req.source_slot, req.destination_slot).await?;
    Ok(success("Matrix route removed successfully"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MultipleRoutesRequest {
    source_slot: u32,
    destination_slots: Vec<u32>,
}

async fn create_multiple_routes_handler(
    State(state): State<AppState>,
    payload: Result<Json<MultipleRoutesRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let req = require_body(payload)?;
    state.router.create_routes(req.source_slot, req.destination_slots).await?;
    Ok(success("Matrix routes created successfully"))
}

async fn remove_routes_from_source_handler(
    State(state): State<AppState>,
    Path(slot): Path<u32>,
) -> ApiResult<impl IntoResponse> {
    state.router.remove_routes_from_source(slot).await?;
    Ok(success("Routes removed from source successfully"))
}

async fn get_destinations_for_source_handler(
    State(state): State<AppState>,
    Path(slot): Path<u32>,
) -> ApiResult<impl IntoResponse> {
    let destinations = state.router.destinations_for_source(slot).await?;
    Ok(Json(json!({ "sourceSlot": slot, "destinations": destinations })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetPreviewSourceRequest {
    source_name: String,
}

async fn set_preview_source_handler(
    State(state): State<AppState>,
    payload: Result<Json<SetPreviewSourceRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let req = require_body(payload)?;
    if req.source_name.is_empty() {
        return Err(ApiError::bad_request("sourceName must not be empty"));
    }
    // Snapshot before locking the preview; see AppState's lock discipline.
    let sources = state.router.discover_sources().await?;
    state.preview.lock().await.set_source(&req.source_name, &sources).await?;
    Ok(success(format!("Preview source set to {}", req.source_name)))
}

async fn get_preview_source_handler(State(state): State<AppState>) -> impl IntoResponse {
    let source = state.preview.lock().await.source();
    Json(json!({ "source": source }))
}

async fn get_preview_image_handler(State(state): State<AppState>) -> impl IntoResponse {
    let buffer = state.preview.lock().await.capture_frame();
    if buffer.is_empty() {
        Json(json!({ "image": serde_json::Value::Null }))
    } else {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&buffer);
        Json(json!({ "image": encoded }))
    }
}

async fn clear_preview_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.preview.lock().await.clear().await;
    success("Preview cleared")
}

async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}

fn create_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
}

/// Builds the control-surface router around a running matrix router.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/sources", get(list_sources_handler))
        .route("/api/studio-monitors", get(list_studio_monitors_handler))
        .route("/api/studio-monitors/reset", post(reset_studio_monitors_handler))
        .route("/api/matrix/source-slots", get(get_source_slots_handler))
        .route("/api/matrix/source-slots/assign", post(assign_source_slot_handler))
        .route("/api/matrix/source-slots/{slot}", delete(unassign_source_slot_handler))
        .route(
            "/api/matrix/destinations",
            get(get_destinations_handler).post(create_destination_handler),
        )
        .route("/api/matrix/destinations/{slot}", delete(remove_destination_handler))
        .route("/api/matrix/destinations/{slot}/unassign", post(unassign_destination_handler))
        .route(
            "/api/matrix/routes",
            get(get_routes_handler).post(create_route_handler).delete(remove_route_handler),
        )
        .route("/api/matrix/routes/multiple", post(create_multiple_routes_handler))
        .route(
            "/api/matrix/routes/source/{slot}",
            get(get_destinations_for_source_handler).delete(remove_routes_from_source_handler),
        )
        .route("/api/preview/set-source", post(set_preview_source_handler))
        .route("/api/preview/current-source", get(get_preview_source_handler))
        .route("/api/preview/image", get(get_preview_image_handler))
        .route("/api/preview/clear", post(clear_preview_handler))
        .fallback(not_found_handler)
        .layer(create_cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => error!(error = %e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received");
}

/// Brings up the full runtime (SDK session, router actor, preview monitor,
/// HTTP listener) and serves until SIGINT/SIGTERM. Teardown order: HTTP
/// first, then the router actor (which releases pooled receivers and
/// senders), then the preview receiver, with SDK shutdown last when the
/// final session reference drops.
///
/// # Errors
///
/// Returns an error when SDK init, router startup, or the TCP bind fails.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let sdk = LoopbackSdk::with_sources(config.sdk.sources.iter().cloned());
    let session = Arc::new(
        SdkSession::open(Arc::new(sdk))
            .ok_or_else(|| anyhow::anyhow!("Failed to initialize media SDK"))?,
    );
    let preview = Arc::new(Mutex::new(PreviewMonitor::new(Arc::clone(&session))));

    let router: RouterHandle = MatrixRouter::spawn(
        Arc::clone(&session),
        RouterConfig { bandwidth: config.routing.bandwidth },
        Arc::clone(&preview),
    )
    .await?;

    let app = create_app(AppState { router: router.clone(), preview: Arc::clone(&preview) });

    let bind_addr = format!("{}:{}", config.server.address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(address = %bind_addr, "RouteKit control API listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    router.shutdown_and_wait().await;
    preview.lock().await.clear().await;
    info!("RouteKit shut down");
    Ok(())
}
