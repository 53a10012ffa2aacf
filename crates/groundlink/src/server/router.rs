//! HTTP Router
//!
//! Sets up the axum router with the WebSocket endpoint and a small read-only
//! JSON API over the same snapshot the WebSocket serves.

use axum::{
    Json, Router,
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handler::{PathError, handle_websocket, resolve_path, resolve_tle};
use super::protocol::ErrorCode;
use super::state::AppState;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // WebSocket endpoint for live dashboards
        .route("/ws", get(ws_upgrade))
        // Health check for monitoring/load balancers
        .route("/health", get(health_check))
        // Read-only snapshot API
        .route("/api/units", get(api_units))
        .route("/api/units/:id", get(api_unit))
        .route("/api/schedules/:id", get(api_schedule))
        .route("/api/satellites", get(api_satellites))
        .route("/api/satellites/:key", get(api_satellite))
        .route("/api/tle_by_name", get(api_tle_by_name))
        .route("/api/status", get(api_status))
        .layer(TraceLayer::new_for_http())
        // CORS for development
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// WebSocket upgrade handler
async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    clients: usize,
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        clients: state.client_count(),
    })
}

async fn api_units(State(state): State<AppState>) -> Response {
    resolve(&state, "/units")
}

async fn api_unit(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    resolve(&state, &format!("/units/{id}"))
}

async fn api_schedule(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    resolve(&state, &format!("/schedules/{id}"))
}

async fn api_satellites(State(state): State<AppState>) -> Response {
    resolve(&state, "/satellites")
}

#[derive(Deserialize)]
struct TleQuery {
    name: String,
}

async fn api_tle_by_name(State(state): State<AppState>, Query(query): Query<TleQuery>) -> Response {
    json_response(resolve_tle(state.satellites(), &query.name))
}

async fn api_satellite(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    resolve(&state, &format!("/satellites/{key}"))
}

async fn api_status(State(state): State<AppState>) -> Response {
    resolve(&state, "/status")
}

/// Serve a read path as JSON
fn resolve(state: &AppState, path: &str) -> Response {
    let snapshot = state.session().snapshot();
    json_response(resolve_path(&snapshot, state.satellites(), path))
}

/// Map lookup failures to HTTP statuses
fn json_response(result: Result<Value, PathError>) -> Response {
    match result {
        Ok(data) => Json(data).into_response(),
        Err(PathError { code, message }) => {
            let status = match code {
                ErrorCode::NotFound | ErrorCode::InvalidPath => StatusCode::NOT_FOUND,
                ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
                ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(serde_json::json!({ "code": code, "error": message }))).into_response()
        }
    }
}
