use axum::{
    extract::{State, WebSocketUpgrade},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /ws: upgrades the request and hands the connection to the hub.
///
/// The routing flag is the raw value of the configured header (by default
/// `sec-websocket-protocol`); a missing or empty header means the client
/// joins no group and only sees broadcast-to-all traffic.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let flag = headers
        .get(state.config.gateway.flag_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .filter(|f| !f.is_empty());

    relay_hub::serve_ws(ws, flag, state.hub.clone(), state.config.hub.send_cap)
}

/// GET /health: liveness probe, returns server metadata.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "flag_header": state.config.gateway.flag_header,
        "send_cap": state.config.hub.send_cap,
    }))
}
