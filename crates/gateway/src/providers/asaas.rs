//! Asaas billing adapter. Authenticates with an `access_token` header; keys
//! come from the tenant's billing accounts, one client per account.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use frontdesk_core::domain::directory::BillingAccount;

use super::ensure_success;
use crate::billing::{BillingClient, BillingCustomer, Invoice, InvoiceStatus};
use crate::GatewayError;

const PROVIDER: &str = "asaas";
const DEFAULT_BASE_URL: &str = "https://api.asaas.com/v3";
const PAGE_LIMIT: &str = "100";
const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct AsaasClient {
    http: Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct PaymentPage {
    #[serde(default)]
    data: Vec<PaymentItem>,
}

#[derive(Debug, Deserialize)]
struct PaymentItem {
    id: String,
    customer: String,
    #[serde(rename = "dueDate")]
    due_date: String,
    #[serde(default)]
    value: f64,
    description: Option<String>,
    #[serde(rename = "invoiceUrl")]
    invoice_url: Option<String>,
    status: InvoiceStatus,
}

impl AsaasClient {
    pub fn new(account: &BillingAccount) -> Self {
        Self {
            http: Client::new(),
            base_url: account
                .base_url
                .as_deref()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            token: account.api_key.clone(),
        }
    }

    async fn get(
        &self,
        operation: &'static str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response, GatewayError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header("access_token", &self.token)
            .query(query)
            .send()
            .await
            .map_err(|e| GatewayError::request(PROVIDER, operation, e))?;
        ensure_success(PROVIDER, operation, response).await
    }

    async fn list_payments(
        &self,
        operation: &'static str,
        query: &[(&str, &str)],
    ) -> Result<Vec<Invoice>, GatewayError> {
        let page: PaymentPage = self
            .get(operation, "/payments", query)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::request(PROVIDER, operation, e))?;

        page.data.into_iter().map(invoice_from_item).collect()
    }
}

fn invoice_from_item(item: PaymentItem) -> Result<Invoice, GatewayError> {
    let due_date = NaiveDate::parse_from_str(&item.due_date, DATE_FORMAT).map_err(|e| {
        GatewayError::UnexpectedPayload {
            provider: PROVIDER,
            reason: format!("bad due date `{}`: {e}", item.due_date),
        }
    })?;
    Ok(Invoice {
        id: item.id,
        customer_id: item.customer,
        due_date,
        value: item.value,
        description: item.description,
        invoice_url: item.invoice_url,
        status: item.status,
    })
}

#[async_trait]
impl BillingClient for AsaasClient {
    async fn list_invoices_due_on(&self, date: NaiveDate) -> Result<Vec<Invoice>, GatewayError> {
        let day = date.format(DATE_FORMAT).to_string();
        self.list_payments(
            "list_invoices_due_on",
            &[
                ("dueDate[ge]", day.as_str()),
                ("dueDate[le]", day.as_str()),
                ("status", "PENDING"),
                ("limit", PAGE_LIMIT),
            ],
        )
        .await
    }

    async fn list_overdue_invoices(&self) -> Result<Vec<Invoice>, GatewayError> {
        self.list_payments(
            "list_overdue_invoices",
            &[("status", "OVERDUE"), ("limit", PAGE_LIMIT)],
        )
        .await
    }

    async fn get_customer(&self, customer_id: &str) -> Result<BillingCustomer, GatewayError> {
        let body: Value = self
            .get("get_customer", &format!("/customers/{customer_id}"), &[])
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::request(PROVIDER, "get_customer", e))?;

        Ok(BillingCustomer {
            id: customer_id.to_string(),
            name: body.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
            phone: body
                .get("mobilePhone")
                .and_then(Value::as_str)
                .or_else(|| body.get("phone").and_then(Value::as_str))
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
    }
}
