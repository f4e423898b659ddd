/**
 * CONTROL SURFACE API - HTTP front of the gateway
 *
 * ROUTES:
 * - GET  /health          liveness probe, always open
 * - GET  /system/health   pub/sub link status and reconnect count
 * - POST /detect          raw image bytes -> detection JSON (400 empty, 500 undecodable)
 * - GET  /status          mode, sensors, actuators, overrides, detection, liveness
 * - POST /control         {pump?, fan?, light?} -> {status, actuators} (403 in auto)
 * - POST /mode            {mode} -> {status, mode} (400 outside manual/auto/hybrid)
 *
 * SECURITY: when an API key is configured, every route but /health needs a
 * matching `x-api-key` header.
 */

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::warn;

use crate::control::{ManualCommand, StatusReport};
use crate::error::ControlError;
use crate::gateway::Gateway;
use crate::health::GatewayHealth;
use crate::models::DetectionResult;

/// Any JSON value is accepted for `mode`; validation happens against the
/// mode names so every bad value is a 400.
#[derive(Debug, Deserialize)]
struct ModeRequest {
    mode: Option<serde_json::Value>,
}

pub fn build_router(gateway: Gateway) -> Router {
    let max_image_bytes = gateway.config().http.max_image_bytes;
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/detect", post(detect))
        .route("/status", get(get_status))
        .route("/control", post(manual_control))
        .route("/mode", post(change_mode))
        .layer(middleware::from_fn_with_state(gateway.clone(), require_api_key))
        .layer(DefaultBodyLimit::max(max_image_bytes))
        .with_state(gateway)
}

async fn require_api_key(State(gateway): State<Gateway>, req: Request, next: Next) -> Result<Response, StatusCode> {
    let Some(expected) = gateway.config().http.api_key.as_deref() else {
        return Ok(next.run(req).await);
    };
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !ok {
        warn!(path = req.uri().path(), "rejected request without valid api key");
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

// GET /system/health
async fn get_system_health(State(gateway): State<Gateway>) -> Json<GatewayHealth> {
    Json(gateway.health().get_health())
}

// POST /detect
async fn detect(State(gateway): State<Gateway>, body: Bytes) -> Result<Json<DetectionResult>, ControlError> {
    let result = gateway.control().submit_image(&body).await?;
    Ok(Json(result))
}

// GET /status
async fn get_status(State(gateway): State<Gateway>) -> Json<StatusReport> {
    Json(gateway.control().status())
}

// POST /control
async fn manual_control(
    State(gateway): State<Gateway>,
    Json(command): Json<ManualCommand>,
) -> Result<Json<serde_json::Value>, ControlError> {
    let actuators = gateway.control().manual_command(&command).await?;
    Ok(Json(serde_json::json!({ "status": "ok", "actuators": actuators })))
}

// POST /mode
async fn change_mode(
    State(gateway): State<Gateway>,
    request: Result<Json<ModeRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ControlError> {
    let requested = match request {
        Ok(Json(ModeRequest { mode: Some(serde_json::Value::String(mode)) })) => Some(mode),
        Ok(Json(ModeRequest { mode: Some(other) })) => Some(other.to_string()),
        Ok(Json(ModeRequest { mode: None })) => None,
        Err(rejection) => return Err(ControlError::InvalidMode(rejection.body_text())),
    };
    let mode = gateway.control().change_mode(requested.as_deref()).await?;
    Ok(Json(serde_json::json!({ "status": "ok", "mode": mode })))
}
