//! Thin HTTP surface: a health check and the websocket upgrade route. The
//! full REST API is an external collaborator; only enough of a router
//! exists here to bind and serve the hub (`CorsLayer::permissive()`,
//! `TraceLayer`, plain `&'static str` health check, `axum::serve` over a
//! `TcpListener`).

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::orchestrator::Orchestrator;

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(crate::hub::websocket_handler))
        .with_state(orchestrator)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> &'static str {
    "driftwatch operational"
}
