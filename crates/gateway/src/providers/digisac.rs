//! Digisac chat adapter. Digisac models WhatsApp conversations as tickets;
//! transfers and closes act on the contact's current ticket.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use frontdesk_core::domain::directory::{Department, MediaKind};
use frontdesk_core::domain::tenant::Tenant;

use super::{ensure_success, require};
use crate::chat::{
    branded_message, ChatContactProfile, ChatGateway, OutboundMedia, RecallSnapshot,
};
use crate::GatewayError;

const PROVIDER: &str = "digisac";
const MESSAGE_ORIGIN: &str = "bot";

pub struct DigisacGateway {
    http: Client,
    base_url: String,
    token: String,
    service_id: Option<String>,
    default_user_id: Option<String>,
}

impl DigisacGateway {
    pub fn from_tenant(tenant: &Tenant) -> Result<Self, GatewayError> {
        let creds = &tenant.credentials;
        Ok(Self {
            http: Client::new(),
            base_url: require(&creds.chat_base_url, "chat_base_url")?.trim_end_matches('/').to_string(),
            token: require(&creds.chat_api_key, "chat_api_key")?.to_string(),
            service_id: creds.chat_account.clone(),
            default_user_id: creds.chat_default_user.clone(),
        })
    }

    async fn get_json(&self, operation: &'static str, url: String) -> Result<Value, GatewayError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| GatewayError::request(PROVIDER, operation, e))?;
        ensure_success(PROVIDER, operation, response)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::request(PROVIDER, operation, e))
    }

    async fn post(
        &self,
        operation: &'static str,
        path: &str,
        body: &Value,
    ) -> Result<reqwest::Response, GatewayError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::request(PROVIDER, operation, e))?;
        ensure_success(PROVIDER, operation, response).await
    }
}

fn media_payload(media: &OutboundMedia<'_>) -> Value {
    let name = media.asset.shortcut.as_str();
    let mimetype = match media.asset.kind {
        MediaKind::Image => "image/png",
        MediaKind::Document => "application/pdf",
        MediaKind::Audio => "audio/mpeg",
        MediaKind::Video => "video/mp4",
    };
    json!({ "url": media.asset.url, "name": name, "mimetype": mimetype })
}

#[async_trait]
impl ChatGateway for DigisacGateway {
    async fn send_text(
        &self,
        contact_id: &str,
        assistant_name: &str,
        text: &str,
    ) -> Result<(), GatewayError> {
        let body = json!({
            "text": branded_message(assistant_name, text),
            "type": "chat",
            "contactId": contact_id,
            "userId": self.default_user_id,
            "origin": MESSAGE_ORIGIN,
        });
        self.post("send_text", "/messages", &body).await?;
        debug!(event_name = "digisac_message_sent", contact_id, "message delivered");
        Ok(())
    }

    async fn send_media(
        &self,
        contact_id: &str,
        assistant_name: &str,
        media: OutboundMedia<'_>,
    ) -> Result<(), GatewayError> {
        let caption = media.message.or(media.asset.caption.as_deref()).unwrap_or("");
        let body = json!({
            "text": branded_message(assistant_name, caption),
            "type": "chat",
            "contactId": contact_id,
            "userId": self.default_user_id,
            "origin": MESSAGE_ORIGIN,
            "file": media_payload(&media),
        });
        self.post("send_media", "/messages", &body).await?;
        Ok(())
    }

    async fn send_audio(&self, contact_id: &str, audio_url: &str) -> Result<(), GatewayError> {
        let body = json!({
            "type": "chat",
            "contactId": contact_id,
            "userId": self.default_user_id,
            "origin": MESSAGE_ORIGIN,
            "file": { "url": audio_url, "name": "audio", "mimetype": "audio/mpeg" },
        });
        self.post("send_audio", "/messages", &body).await?;
        Ok(())
    }

    async fn transfer_session(
        &self,
        contact_id: &str,
        department: &Department,
    ) -> Result<(), GatewayError> {
        let mut body = json!({
            "departmentId": department.external_department_id,
            "byUserId": self.default_user_id,
            "comments": department.transfer_comment.as_deref().unwrap_or(""),
        });
        if let Some(user_id) = &department.external_user_id {
            body["userId"] = json!(user_id);
        }
        self.post("transfer_session", &format!("/contacts/{contact_id}/ticket/transfer"), &body)
            .await?;
        Ok(())
    }

    async fn close_session(&self, contact_id: &str) -> Result<(), GatewayError> {
        let body = json!({
            "ticketTopicIds": [],
            "comments": "",
            "byUserId": self.default_user_id,
        });
        self.post("close_session", &format!("/contacts/{contact_id}/ticket/close"), &body).await?;
        Ok(())
    }

    async fn contact_profile(
        &self,
        contact_id: &str,
    ) -> Result<ChatContactProfile, GatewayError> {
        let response = self
            .http
            .get(format!("{}/contacts/{contact_id}", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| GatewayError::request(PROVIDER, "contact_profile", e))?;
        let body: Value = ensure_success(PROVIDER, "contact_profile", response)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::request(PROVIDER, "contact_profile", e))?;

        Ok(ChatContactProfile {
            name: body.get("name").and_then(Value::as_str).map(str::to_string),
            phone: body
                .get("data")
                .and_then(|d| d.get("number"))
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    async fn resolve_contact_id(
        &self,
        phone: &str,
        name: &str,
    ) -> Result<String, GatewayError> {
        let service_id = require(&self.service_id, "chat_account")?;
        let response = self
            .http
            .get(format!("{}/contacts", self.base_url))
            .bearer_auth(&self.token)
            .query(&[("where[data.number]", phone), ("where[serviceId]", service_id)])
            .send()
            .await
            .map_err(|e| GatewayError::request(PROVIDER, "resolve_contact", e))?;
        let body: Value = ensure_success(PROVIDER, "resolve_contact", response)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::request(PROVIDER, "resolve_contact", e))?;

        let existing = body
            .get("data")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(|item| item.get("id"))
            .and_then(Value::as_str);
        if let Some(id) = existing {
            return Ok(id.to_string());
        }

        // Unknown number: register the contact under the tenant's service.
        let registration = json!({
            "serviceId": service_id,
            "internalName": name,
            "alternativeName": name,
            "number": phone,
        });
        let created: Value = self
            .post("resolve_contact", "/contacts", &registration)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::request(PROVIDER, "resolve_contact", e))?;
        created.get("id").and_then(Value::as_str).map(str::to_string).ok_or(
            GatewayError::UnexpectedPayload {
                provider: PROVIDER,
                reason: "registered contact without id".to_string(),
            },
        )
    }

    async fn recall_snapshot(&self, contact_id: &str) -> Result<RecallSnapshot, GatewayError> {
        let contact = self
            .get_json("recall_snapshot", format!("{}/contacts/{contact_id}", self.base_url))
            .await?;

        if contact.get("currentTicketId").and_then(Value::as_str).is_none() {
            return Ok(RecallSnapshot::SessionClosed);
        }
        let Some(message_id) = contact.get("lastMessageId").and_then(Value::as_str) else {
            return Ok(RecallSnapshot::Indeterminate);
        };

        let message = self
            .get_json("recall_snapshot", format!("{}/messages/{message_id}", self.base_url))
            .await?;
        // A missing origin is treated like a user message: do not nudge.
        let origin = message.get("origin").and_then(Value::as_str);
        Ok(RecallSnapshot::Open { last_from_user: !matches!(origin, Some(o) if o != "user") })
    }
}

#[cfg(test)]
mod tests {
    use frontdesk_core::domain::directory::{MediaAsset, MediaKind};
    use frontdesk_core::domain::tenant::TenantId;

    use super::media_payload;
    use crate::chat::OutboundMedia;

    #[test]
    fn media_payload_carries_url_name_and_mimetype() {
        let asset = MediaAsset {
            id: "md-1".to_string(),
            tenant_id: TenantId("t-1".to_string()),
            shortcut: "tabela-precos".to_string(),
            kind: MediaKind::Image,
            url: "https://cdn.example/tabela.png".to_string(),
            caption: None,
        };
        let payload = media_payload(&OutboundMedia { asset: &asset, message: None });
        assert_eq!(payload["url"], "https://cdn.example/tabela.png");
        assert_eq!(payload["name"], "tabela-precos");
        assert_eq!(payload["mimetype"], "image/png");
    }
}
