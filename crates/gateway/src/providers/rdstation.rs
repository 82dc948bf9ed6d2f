//! RD Station CRM adapter. The API authenticates with a token query
//! parameter rather than a header.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use frontdesk_core::domain::tenant::Tenant;

use super::{ensure_success, require};
use crate::crm::CrmClient;
use crate::GatewayError;

const PROVIDER: &str = "rdstation";

pub struct RdStationClient {
    http: Client,
    base_url: String,
    token: String,
    user_id: Option<String>,
}

impl RdStationClient {
    pub fn from_tenant(tenant: &Tenant) -> Result<Self, GatewayError> {
        let creds = &tenant.credentials;
        Ok(Self {
            http: Client::new(),
            base_url: require(&creds.crm_base_url, "crm_base_url")?
                .trim_end_matches('/')
                .to_string(),
            token: require(&creds.crm_api_key, "crm_api_key")?.to_string(),
            user_id: creds.crm_user_id.clone(),
        })
    }
}

#[async_trait]
impl CrmClient for RdStationClient {
    async fn create_deal(
        &self,
        deal_name: &str,
        contact_name: &str,
        contact_phone: &str,
    ) -> Result<String, GatewayError> {
        let body = json!({
            "deal": {
                "name": deal_name,
                "rating": 1,
                "user_id": self.user_id,
            },
            "contacts": [{
                "name": contact_name,
                "phones": [{ "phone": contact_phone, "type": "cellphone" }],
            }],
        });
        let response = self
            .http
            .post(format!("{}/deals", self.base_url))
            .query(&[("token", self.token.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::request(PROVIDER, "create_deal", e))?;
        let created: Value = ensure_success(PROVIDER, "create_deal", response)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::request(PROVIDER, "create_deal", e))?;

        created.get("id").and_then(Value::as_str).map(str::to_string).ok_or(
            GatewayError::UnexpectedPayload {
                provider: PROVIDER,
                reason: "created deal without id".to_string(),
            },
        )
    }

    async fn move_deal_stage(&self, deal_id: &str, stage_id: &str) -> Result<(), GatewayError> {
        let mut body = json!({ "deal_stage_id": stage_id });
        if let Some(user_id) = &self.user_id {
            body["deal"] = json!({ "user_id": user_id });
        }
        let response = self
            .http
            .put(format!("{}/deals/{deal_id}", self.base_url))
            .query(&[("token", self.token.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::request(PROVIDER, "move_deal_stage", e))?;
        ensure_success(PROVIDER, "move_deal_stage", response).await?;
        debug!(event_name = "crm_stage_moved", deal_id, stage_id, "deal moved");
        Ok(())
    }
}
