//! API route definitions
//!
//! - /api/v1/health - liveness
//! - /api/v1/status - delivery session status and counters

use axum::{routing::get, Router};

use super::handlers::{self, StatusState};

/// Create the v1 status routes
pub fn api_routes(state: StatusState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/status", get(handlers::get_status))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SharedDeliveryConfig;
    use crate::types::RelayStatus;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn create_test_state() -> StatusState {
        StatusState::new(RelayStatus::shared(), SharedDeliveryConfig::default())
    }

    #[tokio::test]
    async fn test_api_routes_health() {
        let app = api_routes(create_test_state());

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_routes_status() {
        let app = api_routes(create_test_state());

        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = api_routes(create_test_state());

        let response = app
            .oneshot(Request::builder().uri("/api/v1/captions").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
