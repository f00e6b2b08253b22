pub mod rest;
pub mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;

use platefinder_common::Config;
use platefinder_search::Orchestrator;

use ws::hub::SessionHub;

pub struct AppState {
    pub orchestrator: Orchestrator,
    pub hub: Arc<SessionHub>,
    pub config: Config,
    /// Cancelled on graceful shutdown; live connections close with 1001.
    pub shutdown: CancellationToken,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/api/search", post(rest::search_handler))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}
