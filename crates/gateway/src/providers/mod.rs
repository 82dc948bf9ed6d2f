//! Concrete provider clients and the per-tenant factories that select them.

use std::sync::Arc;

use frontdesk_core::domain::directory::BillingAccount;
use frontdesk_core::domain::tenant::{
    BillingProvider, CalendarProvider, ChatProvider, CrmProvider, Tenant,
};

use crate::billing::BillingClient;
use crate::calendar::CalendarClient;
use crate::chat::ChatGateway;
use crate::crm::CrmClient;
use crate::GatewayError;

pub mod asaas;
pub mod digisac;
pub mod evolution;
pub mod google;
pub mod outlook;
pub mod rdstation;

pub use asaas::AsaasClient;
pub use digisac::DigisacGateway;
pub use evolution::EvolutionGateway;
pub use google::GoogleCalendarClient;
pub use outlook::OutlookClient;
pub use rdstation::RdStationClient;

/// Builds the chat gateway the tenant's `chat_provider` selects.
pub fn chat_gateway(tenant: &Tenant) -> Result<Arc<dyn ChatGateway>, GatewayError> {
    match tenant.chat_provider {
        ChatProvider::Digisac => Ok(Arc::new(DigisacGateway::from_tenant(tenant)?)),
        ChatProvider::Evolution => Ok(Arc::new(EvolutionGateway::from_tenant(tenant)?)),
    }
}

/// `None` when the tenant has no calendar provider configured.
pub fn calendar_client(tenant: &Tenant) -> Result<Option<Arc<dyn CalendarClient>>, GatewayError> {
    match tenant.calendar_provider {
        Some(CalendarProvider::Outlook) => {
            Ok(Some(Arc::new(OutlookClient::from_tenant(tenant)?)))
        }
        Some(CalendarProvider::Google) => {
            Ok(Some(Arc::new(GoogleCalendarClient::from_tenant(tenant)?)))
        }
        None => Ok(None),
    }
}

pub fn crm_client(tenant: &Tenant) -> Result<Option<Arc<dyn CrmClient>>, GatewayError> {
    match tenant.crm_provider {
        Some(CrmProvider::RdStation) => Ok(Some(Arc::new(RdStationClient::from_tenant(tenant)?))),
        None => Ok(None),
    }
}

/// Billing clients are per account, not per tenant: a tenant may carry
/// several API keys and the sweeps run once per account.
pub fn billing_client(
    tenant: &Tenant,
    account: &BillingAccount,
) -> Result<Option<Arc<dyn BillingClient>>, GatewayError> {
    match tenant.billing_provider {
        Some(BillingProvider::Asaas) => Ok(Some(Arc::new(AsaasClient::new(account)))),
        None => Ok(None),
    }
}

pub(crate) fn require<'a>(
    value: &'a Option<String>,
    credential: &'static str,
) -> Result<&'a str, GatewayError> {
    value.as_deref().ok_or(GatewayError::MissingCredential(credential))
}

pub(crate) async fn ensure_success(
    provider: &'static str,
    operation: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(200).collect();
    Err(GatewayError::Request {
        provider,
        operation,
        reason: format!("status {status}: {snippet}"),
    })
}

#[cfg(test)]
mod tests {
    use super::require;
    use crate::GatewayError;

    #[test]
    fn require_reports_the_missing_credential_by_name() {
        let missing: Option<String> = None;
        match require(&missing, "chat_api_key") {
            Err(GatewayError::MissingCredential(name)) => assert_eq!(name, "chat_api_key"),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(require(&Some("tok".to_string()), "chat_api_key").unwrap(), "tok");
    }
}
