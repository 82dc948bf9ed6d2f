//! Inbound webhook decoding. Each chat provider posts its own shape; both
//! normalize to an [`InboundEvent`] keyed by the provider-side contact id.

use serde_json::Value;

use frontdesk_core::domain::tenant::ChatProvider;
use frontdesk_core::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InboundKind {
    Text,
    Audio,
    Image,
    Other,
}

/// A normalized inbound chat event. `from_me` marks echoes of the gateway's
/// own outbound messages; the webhook handler drops those.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundEvent {
    pub external_contact_id: String,
    pub text: Option<String>,
    pub display_name: Option<String>,
    pub from_me: bool,
    pub kind: InboundKind,
}

/// Decodes a provider webhook body. `Ok(None)` means a well-formed event the
/// pipeline does not act on (acks, edits, non-message callbacks).
pub fn decode_event(
    provider: ChatProvider,
    payload: &Value,
) -> Result<Option<InboundEvent>, DomainError> {
    match provider {
        ChatProvider::Digisac => decode_digisac(payload),
        ChatProvider::Evolution => decode_evolution(payload),
    }
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn decode_digisac(payload: &Value) -> Result<Option<InboundEvent>, DomainError> {
    let event = payload
        .get("event")
        .and_then(Value::as_str)
        .ok_or_else(|| DomainError::MalformedPayload("digisac event without `event`".into()))?;
    if event != "message.created" {
        return Ok(None);
    }

    let data = payload
        .get("data")
        .filter(|v| v.is_object())
        .ok_or_else(|| DomainError::MalformedPayload("digisac event without `data`".into()))?;
    let contact_id = non_empty(data.get("contactId")).ok_or_else(|| {
        DomainError::MalformedPayload("digisac message without `contactId`".into())
    })?;

    let message = data.get("message").cloned().unwrap_or(Value::Null);
    let from_me = message.get("isFromMe").and_then(Value::as_bool).unwrap_or(false)
        || message.get("isFromBot").and_then(Value::as_bool).unwrap_or(false);
    let text = non_empty(message.get("text"));
    let kind = match message.get("type").and_then(Value::as_str) {
        Some("chat") | None => InboundKind::Text,
        Some("ptt") | Some("audio") => InboundKind::Audio,
        Some("image") => InboundKind::Image,
        Some(_) => InboundKind::Other,
    };

    Ok(Some(InboundEvent { external_contact_id: contact_id, text, display_name: None, from_me, kind }))
}

fn decode_evolution(payload: &Value) -> Result<Option<InboundEvent>, DomainError> {
    let event = payload
        .get("event")
        .and_then(Value::as_str)
        .ok_or_else(|| DomainError::MalformedPayload("evolution event without `event`".into()))?;
    if event != "messages.upsert" {
        return Ok(None);
    }

    let data = payload
        .get("data")
        .filter(|v| v.is_object())
        .ok_or_else(|| DomainError::MalformedPayload("evolution event without `data`".into()))?;
    let key = data
        .get("key")
        .filter(|v| v.is_object())
        .ok_or_else(|| DomainError::MalformedPayload("evolution message without `key`".into()))?;
    let remote_jid = non_empty(key.get("remoteJid")).ok_or_else(|| {
        DomainError::MalformedPayload("evolution message without `remoteJid`".into())
    })?;
    let from_me = key.get("fromMe").and_then(Value::as_bool).unwrap_or(false);

    let message = data.get("message").cloned().unwrap_or(Value::Null);
    let text = non_empty(message.get("conversation")).or_else(|| {
        non_empty(message.get("extendedTextMessage").and_then(|m| m.get("text")))
    });
    let kind = if message.get("audioMessage").is_some() {
        InboundKind::Audio
    } else if message.get("imageMessage").is_some() {
        InboundKind::Image
    } else if text.is_some() {
        InboundKind::Text
    } else {
        InboundKind::Other
    };

    Ok(Some(InboundEvent {
        external_contact_id: remote_jid,
        text,
        display_name: non_empty(data.get("pushName")),
        from_me,
        kind,
    }))
}

/// The WhatsApp-side phone number embedded in an Evolution jid
/// (`5511999990000@s.whatsapp.net`).
pub fn phone_from_jid(jid: &str) -> Option<&str> {
    let digits = jid.split('@').next()?;
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        Some(digits)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use frontdesk_core::domain::tenant::ChatProvider;

    use super::{decode_event, phone_from_jid, InboundKind};

    #[test]
    fn digisac_message_created_decodes_to_a_text_event() {
        let payload = json!({
            "event": "message.created",
            "webhookId": "wh-1",
            "timestamp": "2026-03-02T14:00:00Z",
            "data": {
                "id": "msg-1",
                "contactId": "ct-42",
                "serviceId": "svc-1",
                "accountId": "acc-1",
                "command": "create",
                "message": { "id": "msg-1", "isFromMe": false, "type": "chat", "text": "Olá!" }
            }
        });

        let event = decode_event(ChatProvider::Digisac, &payload)
            .expect("decode")
            .expect("actionable event");
        assert_eq!(event.external_contact_id, "ct-42");
        assert_eq!(event.text.as_deref(), Some("Olá!"));
        assert_eq!(event.kind, InboundKind::Text);
        assert!(!event.from_me);
    }

    #[test]
    fn digisac_own_and_bot_messages_are_flagged_from_me() {
        let own = json!({
            "event": "message.created",
            "data": {
                "contactId": "ct-42",
                "message": { "isFromMe": true, "type": "chat", "text": "eco" }
            }
        });
        assert!(decode_event(ChatProvider::Digisac, &own).unwrap().unwrap().from_me);

        let bot = json!({
            "event": "message.created",
            "data": {
                "contactId": "ct-42",
                "message": { "isFromMe": false, "isFromBot": true, "type": "chat", "text": "eco" }
            }
        });
        assert!(decode_event(ChatProvider::Digisac, &bot).unwrap().unwrap().from_me);
    }

    #[test]
    fn digisac_non_message_events_are_skipped() {
        let payload = json!({ "event": "ticket.updated", "data": { "contactId": "ct-42" } });
        assert_eq!(decode_event(ChatProvider::Digisac, &payload).expect("decode"), None);
    }

    #[test]
    fn digisac_message_without_contact_is_malformed() {
        let payload = json!({ "event": "message.created", "data": { "message": { "text": "oi" } } });
        assert!(decode_event(ChatProvider::Digisac, &payload).is_err());
    }

    #[test]
    fn evolution_upsert_decodes_jid_name_and_text() {
        let payload = json!({
            "event": "messages.upsert",
            "instance": "clinic",
            "data": {
                "key": { "remoteJid": "5511999990000@s.whatsapp.net", "fromMe": false, "id": "m1" },
                "pushName": "Ana",
                "message": { "conversation": "Quero marcar uma consulta" },
                "messageType": "conversation",
                "messageTimestamp": 1767350000
            }
        });

        let event = decode_event(ChatProvider::Evolution, &payload)
            .expect("decode")
            .expect("actionable event");
        assert_eq!(event.external_contact_id, "5511999990000@s.whatsapp.net");
        assert_eq!(event.display_name.as_deref(), Some("Ana"));
        assert_eq!(event.text.as_deref(), Some("Quero marcar uma consulta"));
    }

    #[test]
    fn evolution_extended_text_and_audio_are_classified() {
        let extended = json!({
            "event": "messages.upsert",
            "data": {
                "key": { "remoteJid": "5511999990000@s.whatsapp.net", "fromMe": false },
                "message": { "extendedTextMessage": { "text": "com link" } }
            }
        });
        let event = decode_event(ChatProvider::Evolution, &extended).unwrap().unwrap();
        assert_eq!(event.text.as_deref(), Some("com link"));
        assert_eq!(event.kind, InboundKind::Text);

        let audio = json!({
            "event": "messages.upsert",
            "data": {
                "key": { "remoteJid": "5511999990000@s.whatsapp.net", "fromMe": false },
                "message": { "audioMessage": { "url": "https://...", "mimetype": "audio/ogg" } }
            }
        });
        assert_eq!(
            decode_event(ChatProvider::Evolution, &audio).unwrap().unwrap().kind,
            InboundKind::Audio
        );
    }

    #[test]
    fn jid_phone_extraction() {
        assert_eq!(phone_from_jid("5511999990000@s.whatsapp.net"), Some("5511999990000"));
        assert_eq!(phone_from_jid("not-a-jid"), None);
        assert_eq!(phone_from_jid("@s.whatsapp.net"), None);
    }
}
