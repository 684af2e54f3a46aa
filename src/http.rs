//! Optional metrics/health HTTP surface (§6 supplement), in the shape of
//! the teacher's `HttpServer`: an `axum::Router` over shared state,
//! trimmed to the two routes this crate's scope actually owns.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::pool::Pool;

#[derive(Clone)]
struct AppState {
    pool: Arc<Pool>,
}

/// Serves `/health` and `/metrics` on `bind_addr` until the process
/// receives ctrl-c. Intended for ad-hoc observability during a run, not
/// as a long-lived service.
pub async fn serve(pool: Arc<Pool>, bind_addr: SocketAddr) -> std::io::Result<()> {
    let state = AppState { pool };
    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(CorsLayer::permissive());

    info!(%bind_addr, "starting metrics http server");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let live = state.pool.live_count();
    if live > 0 {
        (StatusCode::OK, format!("{live} resolvers live"))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "no live resolvers".to_string())
    }
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.pool.metrics().encode() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string().into_bytes()),
    }
}
