//! HTTP mapping for application failures. Bodies carry a stable user-facing
//! message and a correlation id; the detailed error goes to the log only.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use frontdesk_core::{ApplicationError, InterfaceError};

pub struct ApiError {
    interface: InterfaceError,
}

impl ApiError {
    pub fn from_app(error: ApplicationError, correlation_id: &str) -> Self {
        error!(
            event_name = "request_failed",
            correlation_id,
            error = %error,
            "request aborted"
        );
        Self { interface: error.into_interface(correlation_id) }
    }

    pub fn not_found(correlation_id: &str) -> Self {
        Self {
            interface: InterfaceError::NotFound {
                message: "unknown tenant".to_string(),
                correlation_id: correlation_id.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, correlation_id) = match &self.interface {
            InterfaceError::BadRequest { correlation_id, .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, correlation_id.clone())
            }
            InterfaceError::NotFound { correlation_id, .. } => {
                (StatusCode::NOT_FOUND, correlation_id.clone())
            }
            InterfaceError::ServiceUnavailable { correlation_id, .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, correlation_id.clone())
            }
            InterfaceError::Internal { correlation_id, .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, correlation_id.clone())
            }
        };
        let body = json!({
            "error": self.interface.user_message(),
            "correlation_id": correlation_id,
        });
        (status, Json(body)).into_response()
    }
}
