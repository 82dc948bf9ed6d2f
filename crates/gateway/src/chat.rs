use async_trait::async_trait;

use frontdesk_core::domain::directory::{Department, MediaAsset};

use crate::GatewayError;

/// Name and phone number as the chat provider knows them; injected into a
/// new dialogue thread so the assistant can greet the contact.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChatContactProfile {
    pub name: Option<String>,
    pub phone: Option<String>,
}

/// A media send resolved from the tenant library plus the text that
/// accompanies it.
#[derive(Clone, Debug)]
pub struct OutboundMedia<'a> {
    pub asset: &'a MediaAsset,
    pub message: Option<&'a str>,
}

/// What the gateway knows about a contact's session just before a recall
/// nudge goes out. Providers without session inspection keep the default
/// `Open { last_from_user: false }`, which lets the recall proceed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecallSnapshot {
    /// No open session; the gateway already considers the conversation over.
    SessionClosed,
    /// An open session whose newest message could not be inspected.
    Indeterminate,
    /// An open session; whether the newest message came from the contact.
    Open { last_from_user: bool },
}

/// Outbound operations against a tenant's chat provider. Sessions (tickets)
/// only exist on some providers; `transfer_session` and `close_session` are
/// best-effort no-ops where the concept is missing.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Delivers `text` to the contact, branded with the assistant's name.
    async fn send_text(
        &self,
        contact_id: &str,
        assistant_name: &str,
        text: &str,
    ) -> Result<(), GatewayError>;

    async fn send_media(
        &self,
        contact_id: &str,
        assistant_name: &str,
        media: OutboundMedia<'_>,
    ) -> Result<(), GatewayError>;

    /// Delivers a pre-rendered audio payload (by URL) as a voice message.
    async fn send_audio(&self, contact_id: &str, audio_url: &str) -> Result<(), GatewayError>;

    /// Typing indicator while the model thinks. Providers without one keep
    /// the default no-op.
    async fn send_typing(&self, _contact_id: &str) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn transfer_session(
        &self,
        contact_id: &str,
        department: &Department,
    ) -> Result<(), GatewayError>;

    async fn close_session(&self, contact_id: &str) -> Result<(), GatewayError>;

    async fn contact_profile(
        &self,
        contact_id: &str,
    ) -> Result<ChatContactProfile, GatewayError>;

    /// Resolves (or registers) the provider contact id for a phone number.
    /// The sweeps start conversations from calendar events and invoices,
    /// where only a phone number is known.
    async fn resolve_contact_id(&self, phone: &str, name: &str)
        -> Result<String, GatewayError>;

    /// Session state consulted before a recall nudge. Providers without a
    /// session concept keep the default.
    async fn recall_snapshot(&self, _contact_id: &str) -> Result<RecallSnapshot, GatewayError> {
        Ok(RecallSnapshot::Open { last_from_user: false })
    }
}

/// `*Nome:*` on the first line, message below. Every outbound text carries
/// this so customers can tell which assistant is talking.
pub fn branded_message(assistant_name: &str, text: &str) -> String {
    format!("*{assistant_name}:*\n{text}")
}
