use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

/// Build the axum router with all registry endpoints.
pub fn build_router(state: AppState, allow_cors: bool) -> Router {
    let router = Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/info", get(handler::info_handler))
        .route("/v1/hashes", post(handler::store_handler))
        .route("/v1/hashes/batch", post(handler::batch_store_handler))
        .route("/v1/hashes/verify", post(handler::batch_verify_handler))
        .route("/v1/hashes/:fingerprint", get(handler::info_for_hash_handler))
        .route("/v1/hashes/:fingerprint/verify", post(handler::verify_handler))
        .route("/v1/stats", get(handler::stats_handler))
        .route("/v1/admin/transfer", post(handler::transfer_handler))
        .route("/v1/events", get(handler::events_handler))
        .route("/v1/events/stream", get(handler::event_stream_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if allow_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, Request};
    use tower::util::ServiceExt;

    use hashreg_journal::{JournalConfig, JournaledRegistry};
    use hashreg_types::ActorId;

    use super::*;
    use crate::auth::HeaderCaller;

    fn router(allow_cors: bool) -> Router {
        let registry =
            JournaledRegistry::in_memory(ActorId::derive("ops"), &JournalConfig::default())
                .unwrap();
        let state = AppState {
            registry: Arc::new(registry),
            resolver: Arc::new(HeaderCaller),
        };
        build_router(state, allow_cors)
    }

    #[tokio::test]
    async fn health_endpoint() {
        let response = router(false)
            .oneshot(
                Request::builder()
                    .uri("/v1/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let response = router(false)
            .oneshot(
                Request::builder()
                    .uri("/v2/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn cors_preflight_when_enabled() {
        let response = router(true)
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/v1/stats")
                    .header("origin", "http://dashboard.local")
                    .header("access-control-request-method", "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response
            .headers()
            .contains_key("access-control-allow-origin"));
    }
}
