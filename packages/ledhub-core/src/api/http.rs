//! HTTP route handlers.
//!
//! All handlers are thin - they validate shape, delegate to the domain state
//! or plan cache, and map errors through [`HubError`].

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::broadcaster;
use crate::error::{HubError, HubResult};
use crate::plans::PlanRequest;
use crate::state::{DeviceMode, FastModeType, RoomControlMode};

/// Emits a gated `state` broadcast after a device/room mutation.
fn push_state(state: &AppState) {
    broadcaster::broadcast_if_changed(&state.state, state.event_bridge.as_ref());
}

/// Emits a `rooms_control` broadcast after a room-level mutation.
fn push_rooms_control(state: &AppState) {
    broadcaster::broadcast_rooms_control(&state.state, state.event_bridge.as_ref());
}

fn parse_mode(raw: &str) -> HubResult<DeviceMode> {
    match raw {
        "static" => Ok(DeviceMode::Static),
        "planned" => Ok(DeviceMode::Planned),
        "fast" => Ok(DeviceMode::Fast),
        other => Err(HubError::InvalidRequest(format!("unknown mode: {other}"))),
    }
}

fn parse_fast_mode_type(raw: &str) -> HubResult<FastModeType> {
    match raw {
        "internal" => Ok(FastModeType::Internal),
        "udp_repeater" => Ok(FastModeType::UdpRepeater),
        other => Err(HubError::InvalidRequest(format!("unknown fast_mode_type: {other}"))),
    }
}

fn parse_control_mode(raw: &str) -> HubResult<RoomControlMode> {
    match raw {
        "auto" => Ok(RoomControlMode::Auto),
        "manual" => Ok(RoomControlMode::Manual),
        other => Err(HubError::InvalidRequest(format!("unknown control_mode: {other}"))),
    }
}

#[derive(Deserialize)]
struct ModeRequest {
    mode: String,
}

#[derive(Deserialize)]
struct ControlModeRequest {
    control_mode: String,
}

#[derive(Deserialize)]
struct ValuesRequest {
    values: Vec<u8>,
}

#[derive(Deserialize)]
struct PlanIdRequest {
    plan_id: Option<String>,
}

#[derive(Deserialize)]
struct FastModeTypeRequest {
    fast_mode_type: String,
}

// ── Device queries ──────────────────────────────────────────────────────

async fn list_devices(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.state.get_all_device_status())
}

async fn list_rooms(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.config.rooms.clone())
}

async fn list_rooms_control(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.state.get_all_room_control_status())
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "devices": state.state.all_device_ids().len(),
        "pubsub_connected": state.pubsub.is_connected(),
    }))
}

// ── Device commands ──────────────────────────────────────────────────────

async fn device_mode(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ModeRequest>,
) -> HubResult<Json<serde_json::Value>> {
    let mode = parse_mode(&req.mode)?;
    if !state.state.set_mode(&id, mode) {
        return Err(HubError::DeviceNotFound(id));
    }
    push_state(&state);
    Ok(Json(json!({"ok": true})))
}

async fn device_static(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ValuesRequest>,
) -> HubResult<Json<serde_json::Value>> {
    if !state.state.set_static_values(&id, &req.values) {
        return Err(HubError::DeviceNotFound(id));
    }
    if let Some(device) = state.config.device(&id) {
        state.pubsub.publish_static(device, &req.values).await;
    }
    push_state(&state);
    Ok(Json(json!({"ok": true})))
}

async fn device_fast(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ValuesRequest>,
) -> HubResult<Json<serde_json::Value>> {
    if !state.state.set_fast_values(&id, &req.values) {
        return Err(HubError::DeviceNotFound(id));
    }
    push_state(&state);
    Ok(Json(json!({"ok": true})))
}

async fn device_planned_plan(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PlanIdRequest>,
) -> HubResult<Json<serde_json::Value>> {
    if !state.state.set_plan(&id, req.plan_id) {
        return Err(HubError::DeviceNotFound(id));
    }
    push_state(&state);
    Ok(Json(json!({"ok": true})))
}

async fn device_fast_mode_type(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<FastModeTypeRequest>,
) -> HubResult<Json<serde_json::Value>> {
    let fast_mode_type = parse_fast_mode_type(&req.fast_mode_type)?;
    if !state.state.set_fast_mode_type(&id, fast_mode_type) {
        return Err(HubError::DeviceNotFound(id));
    }
    push_state(&state);
    Ok(Json(json!({"ok": true})))
}

// ── Room commands ────────────────────────────────────────────────────────

async fn room_control_mode(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<ControlModeRequest>,
) -> HubResult<Json<serde_json::Value>> {
    let control_mode = parse_control_mode(&req.control_mode)?;
    if !state.state.set_room_control_mode(&name, control_mode) {
        return Err(HubError::RoomNotFound(name));
    }
    push_state(&state);
    push_rooms_control(&state);
    Ok(Json(json!({"ok": true})))
}

async fn room_mode(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<ModeRequest>,
) -> HubResult<Json<serde_json::Value>> {
    let mode = parse_mode(&req.mode)?;
    if !state.state.set_room_mode(&name, mode) {
        return Err(HubError::RoomNotFound(name));
    }
    push_state(&state);
    push_rooms_control(&state);
    Ok(Json(json!({"ok": true})))
}

async fn room_static(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<ValuesRequest>,
) -> HubResult<Json<serde_json::Value>> {
    if !state.state.set_room_static_values(&name, &req.values) {
        return Err(HubError::RoomNotFound(name));
    }
    push_state(&state);
    push_rooms_control(&state);
    Ok(Json(json!({"ok": true})))
}

async fn room_planned_plan(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<PlanIdRequest>,
) -> HubResult<Json<serde_json::Value>> {
    if !state.state.set_room_plan(&name, req.plan_id) {
        return Err(HubError::RoomNotFound(name));
    }
    push_state(&state);
    push_rooms_control(&state);
    Ok(Json(json!({"ok": true})))
}

async fn room_fast_mode_type(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<FastModeTypeRequest>,
) -> HubResult<Json<serde_json::Value>> {
    let fast_mode_type = parse_fast_mode_type(&req.fast_mode_type)?;
    if !state.state.set_room_fast_mode_type(&name, fast_mode_type) {
        return Err(HubError::RoomNotFound(name));
    }
    push_state(&state);
    push_rooms_control(&state);
    Ok(Json(json!({"ok": true})))
}

// ── Plans ─────────────────────────────────────────────────────────────────

async fn list_plans(State(state): State<AppState>) -> HubResult<Json<serde_json::Value>> {
    let plans = state.plan_cache.store().list()?;
    Ok(Json(json!(plans)))
}

async fn get_plan(State(state): State<AppState>, Path(id): Path<String>) -> HubResult<Json<serde_json::Value>> {
    let plan = state.plan_cache.store().load(&id)?;
    Ok(Json(json!(plan)))
}

async fn create_plan(
    State(state): State<AppState>,
    Json(req): Json<PlanRequest>,
) -> HubResult<Json<serde_json::Value>> {
    let plan = state.plan_cache.store().save(req, None)?;
    Ok(Json(json!(plan)))
}

async fn update_plan(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PlanRequest>,
) -> HubResult<Json<serde_json::Value>> {
    let plan = state.plan_cache.store().save(req, Some(&id))?;
    state.plan_cache.invalidate(&id);
    Ok(Json(json!(plan)))
}

async fn delete_plan(State(state): State<AppState>, Path(id): Path<String>) -> HubResult<Json<serde_json::Value>> {
    state.plan_cache.store().delete(&id)?;
    state.plan_cache.invalidate(&id);
    Ok(Json(json!({"ok": true})))
}

// ── Router ────────────────────────────────────────────────────────────────

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_credentials(false);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/devices", get(list_devices))
        .route("/api/rooms", get(list_rooms))
        .route("/api/rooms/control", get(list_rooms_control))
        .route("/api/plans", get(list_plans).post(create_plan))
        .route(
            "/api/plans/{id}",
            get(get_plan).put(update_plan).delete(delete_plan),
        )
        .route("/api/device/{id}/mode", post(device_mode))
        .route("/api/device/{id}/static", post(device_static))
        .route("/api/device/{id}/fast", post(device_fast))
        .route("/api/device/{id}/planned_plan", post(device_planned_plan))
        .route("/api/device/{id}/fast_mode_type", post(device_fast_mode_type))
        .route("/api/room/{name}/control_mode", post(room_control_mode))
        .route("/api/room/{name}/mode", post(room_mode))
        .route("/api/room/{name}/static", post(room_static))
        .route("/api/room/{name}/planned_plan", post(room_planned_plan))
        .route("/api/room/{name}/fast_mode_type", post(room_fast_mode_type))
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(cors)
}
