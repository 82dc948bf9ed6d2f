//! `POST /hooks/{slug}/{token}`: one inbound gateway event, handled
//! synchronously to completion. The body answers `{"handled": bool}`;
//! well-formed events the pipeline chooses not to act on are still 200s.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use frontdesk_agent::{
    gateway_failure, instructions, persistence_failure, tools, AdapterSet, DriveOutcome,
    DriveRequest, RouteRequest,
};
use frontdesk_core::domain::assistant::Assistant;
use frontdesk_core::domain::tenant::Tenant;
use frontdesk_core::wire::Response;
use frontdesk_core::ApplicationError;
use frontdesk_gateway::events::decode_event;
use frontdesk_gateway::providers::{calendar_client, chat_gateway, crm_client};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn handle(
    State(state): State<Arc<AppState>>,
    Path((slug, token)): Path<(String, String)>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();

    let tenant = state
        .tenants
        .find_by_slug_and_token(&slug, &token)
        .await
        .map_err(|e| ApiError::from_app(persistence_failure(e), &correlation_id))?
        .ok_or_else(|| ApiError::not_found(&correlation_id))?;

    let event = match decode_event(tenant.chat_provider, &payload)
        .map_err(|e| ApiError::from_app(ApplicationError::from(e), &correlation_id))?
    {
        Some(event) => event,
        None => return Ok(unhandled()),
    };
    if event.from_me {
        return Ok(unhandled());
    }

    let chat = chat_gateway(&tenant)
        .map_err(|e| ApiError::from_app(gateway_failure(e), &correlation_id))?;

    let mut contact = state
        .contacts
        .find_or_create(
            &tenant.id,
            &event.external_contact_id,
            tenant.default_assistant_id.as_ref(),
            Utc::now(),
        )
        .await
        .map_err(|e| ApiError::from_app(persistence_failure(e), &correlation_id))?;

    if !contact.ai_replies_enabled || contact.awaiting_human {
        debug!(
            event_name = "webhook_contact_muted",
            tenant = %tenant.slug,
            contact = %contact.external_id,
            "not driving the assistant"
        );
        return Ok(unhandled());
    }

    let Some(text) = event.text.clone() else {
        debug!(
            event_name = "webhook_no_text",
            tenant = %tenant.slug,
            contact = %contact.external_id,
            kind = ?event.kind,
            "nothing to hand the assistant"
        );
        return Ok(unhandled());
    };

    if let Err(error) = chat.send_typing(&contact.external_id).await {
        debug!(event_name = "typing_failed", error = %error, "continuing without indicator");
    }

    let assistant = resolve_assistant(&state, &tenant, &contact)
        .await
        .map_err(|e| ApiError::from_app(e, &correlation_id))?;

    let mut request = DriveRequest::on_thread(contact.thread_id.as_deref());
    if contact.thread_id.is_none() {
        // First contact on this thread: tell the assistant who it is talking
        // to, using what the gateway knows plus the webhook push name.
        let profile = chat.contact_profile(&contact.external_id).await.unwrap_or_default();
        let name = profile
            .name
            .or_else(|| event.display_name.clone())
            .unwrap_or_else(|| contact.external_id.clone());
        let phone = profile.phone.unwrap_or_default();
        state
            .contacts
            .update_profile(&contact.id, Some(&name), Some(&phone), Utc::now())
            .await
            .map_err(|e| ApiError::from_app(persistence_failure(e), &correlation_id))?;
        request = request.with_message(instructions::contact_profile_message(&name, &phone));
    }
    request = request.with_message(text);

    let registry = tools::tenant_registry(tenant.timezone, state.directory.clone(), tenant.id.clone());
    let outcome: DriveOutcome<Response> =
        match state.driver.drive(&assistant, request, &registry).await {
            Ok(outcome) => outcome,
            Err(ApplicationError::AiResponse { attempts, reason }) => {
                warn!(
                    event_name = "webhook_fallback",
                    tenant = %tenant.slug,
                    contact = %contact.external_id,
                    attempts,
                    reason = %reason,
                    "sending the tenant fallback message"
                );
                if let Err(error) = chat
                    .send_text(&contact.external_id, &assistant.name, &tenant.fallback_message)
                    .await
                {
                    warn!(event_name = "fallback_send_failed", error = %error, "giving up");
                }
                return Ok(unhandled());
            }
            Err(error) => return Err(ApiError::from_app(error, &correlation_id)),
        };
    if outcome.created_thread {
        state
            .contacts
            .set_thread(&contact.id, &outcome.thread_id, Utc::now())
            .await
            .map_err(|e| ApiError::from_app(persistence_failure(e), &correlation_id))?;
        contact.thread_id = Some(outcome.thread_id.clone());
    }

    let calendar = calendar_client(&tenant)
        .map_err(|e| ApiError::from_app(gateway_failure(e), &correlation_id))?;
    let crm = crm_client(&tenant)
        .map_err(|e| ApiError::from_app(gateway_failure(e), &correlation_id))?;

    let routed = state
        .routing
        .route(RouteRequest {
            tenant: &tenant,
            contact: &contact,
            assistant: &assistant,
            response: &outcome.reply,
            audio_reply_url: None,
            adapters: AdapterSet {
                chat: chat.as_ref(),
                calendar: calendar.as_deref(),
                crm: crm.as_deref(),
            },
        })
        .await
        .map_err(|e| ApiError::from_app(e, &correlation_id))?;

    info!(
        event_name = "webhook_handled",
        tenant = %tenant.slug,
        contact = %contact.external_id,
        outcome = ?routed,
        correlation_id,
    );
    Ok(Json(json!({ "handled": true })))
}

fn unhandled() -> Json<Value> {
    Json(json!({ "handled": false }))
}

/// The contact's assigned assistant, falling back to the tenant default.
async fn resolve_assistant(
    state: &AppState,
    tenant: &Tenant,
    contact: &frontdesk_core::domain::contact::Contact,
) -> Result<Assistant, ApplicationError> {
    let assistant_id = contact.assistant_id.as_ref().or(tenant.default_assistant_id.as_ref());
    let Some(assistant_id) = assistant_id else {
        return Err(ApplicationError::Configuration(format!(
            "tenant `{}` has no default assistant",
            tenant.slug
        )));
    };
    state
        .directory
        .find_assistant(assistant_id)
        .await
        .map_err(persistence_failure)?
        .ok_or_else(|| {
            ApplicationError::Configuration(format!(
                "assistant `{}` is assigned but missing",
                assistant_id.0
            ))
        })
}
