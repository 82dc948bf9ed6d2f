//! Evolution API chat adapter. Evolution has no ticket concept, so session
//! transfer and close are acknowledged without a wire call; the routing
//! layer still flips the contact flags.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use frontdesk_core::domain::directory::{Department, MediaKind};
use frontdesk_core::domain::tenant::Tenant;

use super::{ensure_success, require};
use crate::chat::{branded_message, ChatContactProfile, ChatGateway, OutboundMedia};
use crate::events::phone_from_jid;
use crate::GatewayError;

const PROVIDER: &str = "evolution";
const TYPING_DELAY_MS: u32 = 2_000;

pub struct EvolutionGateway {
    http: Client,
    base_url: String,
    api_key: String,
    instance: String,
}

impl EvolutionGateway {
    pub fn from_tenant(tenant: &Tenant) -> Result<Self, GatewayError> {
        let creds = &tenant.credentials;
        Ok(Self {
            http: Client::new(),
            base_url: require(&creds.chat_base_url, "chat_base_url")?.trim_end_matches('/').to_string(),
            api_key: require(&creds.chat_api_key, "chat_api_key")?.to_string(),
            instance: require(&creds.chat_account, "chat_account")?.to_string(),
        })
    }

    fn number(contact_id: &str) -> Result<&str, GatewayError> {
        phone_from_jid(contact_id).ok_or_else(|| GatewayError::UnexpectedPayload {
            provider: PROVIDER,
            reason: format!("contact id `{contact_id}` is not a whatsapp jid"),
        })
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
            .header("apikey", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::request(PROVIDER, operation, e))?;
        ensure_success(PROVIDER, operation, response).await
    }
}

#[async_trait]
impl ChatGateway for EvolutionGateway {
    async fn send_text(
        &self,
        contact_id: &str,
        assistant_name: &str,
        text: &str,
    ) -> Result<(), GatewayError> {
        let body = json!({
            "number": Self::number(contact_id)?,
            "textMessage": { "text": branded_message(assistant_name, text) },
        });
        self.post("send_text", &format!("/message/sendText/{}", self.instance), &body).await?;
        debug!(event_name = "evolution_message_sent", contact_id, "message delivered");
        Ok(())
    }

    async fn send_media(
        &self,
        contact_id: &str,
        assistant_name: &str,
        media: OutboundMedia<'_>,
    ) -> Result<(), GatewayError> {
        let mediatype = match media.asset.kind {
            MediaKind::Image => "image",
            MediaKind::Document => "document",
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        };
        let caption = media.message.or(media.asset.caption.as_deref()).unwrap_or("");
        let body = json!({
            "number": Self::number(contact_id)?,
            "mediaMessage": {
                "mediatype": mediatype,
                "media": media.asset.url,
                "caption": branded_message(assistant_name, caption),
            },
        });
        self.post("send_media", &format!("/message/sendMedia/{}", self.instance), &body).await?;
        Ok(())
    }

    async fn send_audio(&self, contact_id: &str, audio_url: &str) -> Result<(), GatewayError> {
        let body = json!({
            "number": Self::number(contact_id)?,
            "audioMessage": { "audio": audio_url },
        });
        self.post("send_audio", &format!("/message/sendWhatsAppAudio/{}", self.instance), &body)
            .await?;
        Ok(())
    }

    async fn send_typing(&self, contact_id: &str) -> Result<(), GatewayError> {
        let body = json!({
            "number": Self::number(contact_id)?,
            "presence": "composing",
            "delay": TYPING_DELAY_MS,
        });
        self.post("send_typing", &format!("/chat/sendPresence/{}", self.instance), &body).await?;
        Ok(())
    }

    async fn transfer_session(
        &self,
        contact_id: &str,
        department: &Department,
    ) -> Result<(), GatewayError> {
        // No ticket queue to move the chat into.
        warn!(
            event_name = "evolution_transfer_noop",
            contact_id,
            department = %department.shortcut,
            "evolution has no session transfer; contact flagged for a human only"
        );
        Ok(())
    }

    async fn close_session(&self, _contact_id: &str) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn contact_profile(
        &self,
        contact_id: &str,
    ) -> Result<ChatContactProfile, GatewayError> {
        // The jid itself is the only profile Evolution guarantees; the push
        // name arrives on the webhook and is persisted there.
        Ok(ChatContactProfile {
            name: None,
            phone: Self::number(contact_id).ok().map(str::to_string),
        })
    }

    async fn resolve_contact_id(
        &self,
        phone: &str,
        _name: &str,
    ) -> Result<String, GatewayError> {
        let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return Err(GatewayError::UnexpectedPayload {
                provider: PROVIDER,
                reason: format!("phone `{phone}` has no digits"),
            });
        }
        Ok(format!("{digits}@s.whatsapp.net"))
    }
}
