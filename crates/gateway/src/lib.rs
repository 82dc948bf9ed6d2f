//! Provider adapters: chat gateways (Digisac, Evolution API), calendars
//! (Outlook, Google), CRM (RD Station), and billing (Asaas). The traits in
//! `chat`, `calendar`, `crm`, and `billing` are the seams the routing engine
//! and the sweeps talk to; `providers` holds the concrete HTTP clients,
//! selected per tenant at construction time.

use thiserror::Error;

pub mod billing;
pub mod calendar;
pub mod chat;
pub mod crm;
pub mod events;
pub mod providers;

pub use billing::{BillingClient, BillingCustomer, Invoice, InvoiceStatus};
pub use calendar::{CalendarClient, EventDraft, EventKey};
pub use chat::{branded_message, ChatContactProfile, ChatGateway, OutboundMedia, RecallSnapshot};
pub use crm::CrmClient;
pub use events::{decode_event, InboundEvent, InboundKind};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{provider} {operation} failed: {reason}")]
    Request { provider: &'static str, operation: &'static str, reason: String },
    #[error("tenant is missing credential `{0}`")]
    MissingCredential(&'static str),
    #[error("unexpected {provider} payload: {reason}")]
    UnexpectedPayload { provider: &'static str, reason: String },
}

impl GatewayError {
    pub(crate) fn request(
        provider: &'static str,
        operation: &'static str,
        err: impl std::fmt::Display,
    ) -> Self {
        Self::Request { provider, operation, reason: err.to_string() }
    }
}
