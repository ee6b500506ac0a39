pub mod routes;
pub mod ws;

use crate::state::AppState;
use axum::routing::{get, post};
use std::sync::Arc;

pub fn router(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .route("/api/simulate", post(routes::simulate))
        .route("/api/reference", post(routes::reference))
        .route("/api/runs", get(routes::get_runs))
        .route("/api/state", get(routes::get_state))
        .route("/api/counters", get(routes::get_counters))
        .route("/ws", get(ws::ws_handler))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .with_state(state)
}
