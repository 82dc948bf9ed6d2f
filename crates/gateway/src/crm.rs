use async_trait::async_trait;

use crate::GatewayError;

/// Pipeline moves against the tenant's CRM. Stage ids come from the tenant's
/// per-activity stage configuration; a tenant without a stage for an
/// activity simply skips the move.
#[async_trait]
pub trait CrmClient: Send + Sync {
    /// Creates a deal for a new contact, returning the provider deal id.
    async fn create_deal(
        &self,
        deal_name: &str,
        contact_name: &str,
        contact_phone: &str,
    ) -> Result<String, GatewayError>;

    async fn move_deal_stage(&self, deal_id: &str, stage_id: &str) -> Result<(), GatewayError>;
}
