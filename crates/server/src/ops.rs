//! Manual sweep triggers. The `/jobs/*` endpoints run the same sweep
//! functions as the scheduler, under the same overlap guard, so an operator
//! can force a pass without waiting for the next tick. All of them sit
//! behind the `X-Ops-Key` header; the payment-thanks hook is authenticated
//! by tenant slug and token like the gateway webhook.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use frontdesk_agent::persistence_failure;

use crate::error::ApiError;
use crate::state::{AppState, SweepKind};
use crate::sweeps;

pub async fn run_recall(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    trigger(state, headers, SweepKind::Recall).await
}

pub async fn run_confirmations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    trigger(state, headers, SweepKind::Confirmations).await
}

pub async fn run_due_invoices(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    trigger(state, headers, SweepKind::DueInvoices).await
}

pub async fn run_overdue(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    trigger(state, headers, SweepKind::Overdue).await
}

async fn trigger(state: Arc<AppState>, headers: HeaderMap, kind: SweepKind) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }
    info!(event_name = "sweep_triggered", kind = kind.as_str(), "manual trigger");
    let stats = sweeps::run_sweep(&state, kind).await;
    Json(json!({ "sweep": kind.as_str(), "stats": stats })).into_response()
}

/// Without a configured ops key the trigger endpoints do not exist; with one,
/// the header must match exactly.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = state.config.server.ops_key.as_ref() else {
        return Err(StatusCode::NOT_FOUND.into_response());
    };
    let presented = headers.get("x-ops-key").and_then(|value| value.to_str().ok());
    if presented != Some(expected.expose_secret()) {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "invalid ops key" })),
        )
            .into_response());
    }
    Ok(())
}

/// `POST /jobs/payment-thanks/{slug}/{token}/{account}`: a billing payment
/// webhook, answered with a thank-you conversation.
pub async fn payment_thanks(
    State(state): State<Arc<AppState>>,
    Path((slug, token, account)): Path<(String, String, String)>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let tenant = state
        .tenants
        .find_by_slug_and_token(&slug, &token)
        .await
        .map_err(|e| ApiError::from_app(persistence_failure(e), &correlation_id))?
        .ok_or_else(|| ApiError::not_found(&correlation_id))?;
    sweeps::payment_thanks(&state, &tenant, &account, &payload)
        .await
        .map_err(|e| ApiError::from_app(e, &correlation_id))?;
    info!(
        event_name = "payment_thanks_handled",
        tenant = %tenant.slug,
        account = %account,
        correlation_id,
    );
    Ok(Json(json!({ "handled": true })))
}
