use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::GatewayError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Pending,
    Overdue,
    Received,
    #[serde(other)]
    Other,
}

/// One charge at the billing provider. `customer_id` is resolved to a
/// [`BillingCustomer`] before messaging, since the invoice record carries no
/// phone number.
#[derive(Clone, Debug, PartialEq)]
pub struct Invoice {
    pub id: String,
    pub customer_id: String,
    pub due_date: NaiveDate,
    pub value: f64,
    pub description: Option<String>,
    pub invoice_url: Option<String>,
    pub status: InvoiceStatus,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BillingCustomer {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
}

/// Read-only billing queries behind the due-invoice and overdue sweeps.
#[async_trait]
pub trait BillingClient: Send + Sync {
    /// Pending invoices with a due date exactly on `date`.
    async fn list_invoices_due_on(&self, date: NaiveDate) -> Result<Vec<Invoice>, GatewayError>;

    async fn list_overdue_invoices(&self) -> Result<Vec<Invoice>, GatewayError>;

    async fn get_customer(&self, customer_id: &str) -> Result<BillingCustomer, GatewayError>;
}
