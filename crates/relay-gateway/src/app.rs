use axum::{routing::get, Router};
use relay_core::RelayConfig;
use relay_hub::HubHandle;
use std::sync::Arc;

/// Shared state for the axum handlers.
pub struct AppState {
    pub config: RelayConfig,
    pub hub: HubHandle,
}

impl AppState {
    pub fn new(config: RelayConfig, hub: HubHandle) -> Self {
        Self { config, hub }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::routes::health_handler))
        .route("/ws", get(crate::routes::ws_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
