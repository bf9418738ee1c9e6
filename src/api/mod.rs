//! Status API module using Axum
//!
//! Optional read-only HTTP endpoints for monitoring a running relay:
//! - `GET /api/v1/health`
//! - `GET /api/v1/status`

pub mod handlers;
mod routes;

pub use handlers::StatusState;

use axum::http::{header, Method};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::defaults::CORS_ORIGINS_ENV;

/// Build a CORS layer that is restrictive by default (same-origin only).
///
/// Set `CAPTION_RELAY_CORS_ORIGINS` to a comma-separated list of origins
/// allowed to read the status from a browser.
pub fn build_cors_layer() -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    match std::env::var(CORS_ORIGINS_ENV) {
        Ok(origins) if !origins.trim().is_empty() => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            info!(origins = %origins, "CORS: allowing configured origins");
            base.allow_origin(allowed)
        }
        _ => base,
    }
}

/// Create the application router.
pub fn create_app(state: StatusState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
}

/// Serve `app` on `listener` until `cancel_token` fires.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    cancel_token: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Status API listening");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel_token.cancelled().await;
            info!("[StatusApi] Received shutdown signal");
        })
        .await
}
