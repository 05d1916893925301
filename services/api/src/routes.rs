use crate::infra::{AppState, Platform};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use pass_culture::bookings::booking_router;
use pass_culture::finance::reimbursement::reimbursement_router;
use pass_culture::gdpr::gdpr_router;
use pass_culture::offers::offer_router;
use pass_culture::subscription::subscription_router;
use pass_culture::subscription::ubble::ubble_router;
use serde_json::json;

pub(crate) fn with_platform_routes(platform: &Platform) -> axum::Router {
    subscription_router(platform.subscription.clone())
        .merge(ubble_router(platform.identity.clone()))
        .merge(offer_router(platform.offers.clone()))
        .merge(booking_router(platform.bookings.clone()))
        .merge(reimbursement_router(platform.reimbursement.clone()))
        .merge(gdpr_router(platform.gdpr.clone()))
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use pass_culture::config::AppConfig;
    use pass_culture::store::InMemoryStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(ready: bool) -> axum::Router {
        let config = AppConfig::load().expect("default configuration");
        let platform =
            Platform::build(&config, Arc::new(InMemoryStore::new())).expect("platform builds");
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(false)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        state.readiness.store(ready, Ordering::Release);
        with_platform_routes(&platform).layer(Extension(state))
    }

    async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("router responds");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 16 * 1024)
            .await
            .expect("body readable");
        (status, serde_json::from_slice(&bytes).unwrap_or_default())
    }

    #[tokio::test]
    async fn health_is_always_ok() {
        let (status, payload) = get(app(false), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["status"], "ok");
    }

    #[tokio::test]
    async fn readiness_follows_the_flag() {
        let (status, payload) = get(app(false), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload["status"], "initializing");

        let (status, _) = get(app(true), "/ready").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn domain_routes_are_mounted() {
        let (status, payload) = get(app(true), "/native/v1/users/12/bookings").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(payload["error"], "user 12 not found");

        let response = app(true)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/pro/offerers")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"name":"Cinéma Le Palace"}"#))
                    .expect("request builds"),
            )
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}
