//! HTTP surface and background scheduler: the gateway webhook, health and
//! ops-trigger endpoints, and the recall/daily sweep loops.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub mod bootstrap;
pub mod error;
pub mod health;
pub mod logging;
pub mod ops;
pub mod scheduler;
pub mod state;
pub mod sweeps;
pub mod webhook;

pub use bootstrap::build_state;
pub use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/hooks/{slug}/{token}", post(webhook::handle))
        .route("/jobs/recall", post(ops::run_recall))
        .route("/jobs/confirmations", post(ops::run_confirmations))
        .route("/jobs/due-invoices", post(ops::run_due_invoices))
        .route("/jobs/overdue", post(ops::run_overdue))
        .route("/jobs/payment-thanks/{slug}/{token}/{account}", post(ops::payment_thanks))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use frontdesk_core::config::AppConfig;

    use super::{build_state, router};

    async fn test_router() -> axum::Router {
        let mut config = AppConfig::default();
        config.database.url = "sqlite::memory:".to_string();
        config.database.max_connections = 1;
        let state = build_state(config).await.expect("state");
        router(state)
    }

    #[tokio::test]
    async fn health_answers_ok() {
        let response = test_router()
            .await
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_tenant_webhook_is_a_404() {
        let request = Request::builder()
            .method("POST")
            .uri("/hooks/no-such-tenant/bad-token")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = test_router().await.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn job_triggers_do_not_exist_without_an_ops_key() {
        let request = Request::builder()
            .method("POST")
            .uri("/jobs/recall")
            .body(Body::empty())
            .unwrap();
        let response = test_router().await.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
