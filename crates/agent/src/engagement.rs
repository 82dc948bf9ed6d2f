//! Model-driven conversation starters behind the scheduler sweeps: recall
//! nudges on the contact's existing thread, and confirmation/billing
//! extractions on fresh threads.

use std::sync::Arc;

use chrono::Utc;

use frontdesk_core::availability::CalendarEvent;
use frontdesk_core::domain::assistant::{Assistant, AssistantPurpose};
use frontdesk_core::domain::contact::Contact;
use frontdesk_core::domain::tenant::Tenant;
use frontdesk_core::recall::RecallKind;
use frontdesk_core::wire::{
    BillingReply, ConfirmationReply, Instruction, InstructionAction, Response,
};
use frontdesk_core::{ApplicationError, DomainError, ReferenceKind};
use frontdesk_db::DirectoryRepository;
use frontdesk_gateway::billing::{BillingCustomer, Invoice};

use crate::driver::{ConversationDriver, DriveOutcome, DriveRequest};
use crate::instructions;
use crate::persistence_failure;

pub struct EngagementFlow {
    directory: Arc<dyn DirectoryRepository>,
    driver: Arc<ConversationDriver>,
}

impl EngagementFlow {
    pub fn new(directory: Arc<dyn DirectoryRepository>, driver: Arc<ConversationDriver>) -> Self {
        Self { directory, driver }
    }

    async fn assistant_by_purpose(
        &self,
        tenant: &Tenant,
        purpose: AssistantPurpose,
    ) -> Result<Assistant, ApplicationError> {
        self.directory
            .find_assistant_by_purpose(&tenant.id, purpose)
            .await
            .map_err(persistence_failure)?
            .ok_or_else(|| {
                DomainError::UnresolvedReference {
                    kind: ReferenceKind::Assistant,
                    shortcut: purpose.as_str().to_string(),
                }
                .into()
            })
    }

    fn tools(&self, tenant: &Tenant) -> crate::tools::ToolRegistry {
        crate::tools::tenant_registry(tenant.timezone, self.directory.clone(), tenant.id.clone())
    }

    /// Resume/close instruction on the contact's existing thread, run by the
    /// tenant's recall assistant. Returns the assistant alongside the
    /// response so the caller can deliver under the right name.
    pub async fn recall_nudge(
        &self,
        tenant: &Tenant,
        contact: &Contact,
        kind: RecallKind,
    ) -> Result<(Assistant, DriveOutcome<Response>), ApplicationError> {
        let assistant = self.assistant_by_purpose(tenant, AssistantPurpose::Recall).await?;
        let message = Instruction::new(kind.instruction_action(), None).to_wire();
        let outcome = self
            .driver
            .drive(
                &assistant,
                DriveRequest::on_thread(contact.thread_id.as_deref()).with_message(message),
                &self.tools(tenant),
            )
            .await?;
        Ok((assistant, outcome))
    }

    /// Hands tomorrow's event to the confirmation assistant on a fresh
    /// thread. The returned thread id becomes the contact's conversation.
    pub async fn extract_confirmation(
        &self,
        tenant: &Tenant,
        agenda_address: &str,
        event: &CalendarEvent,
    ) -> Result<(Assistant, DriveOutcome<ConfirmationReply>), ApplicationError> {
        let assistant = self.assistant_by_purpose(tenant, AssistantPurpose::Confirm).await?;
        let now = Utc::now().with_timezone(&tenant.timezone);
        let message = instructions::extract_event(agenda_address, event, now).to_wire();
        let outcome = self
            .driver
            .drive(
                &assistant,
                DriveRequest::on_thread(None).with_message(message),
                &self.tools(tenant),
            )
            .await?;
        Ok((assistant, outcome))
    }

    /// One invoice handed to the collection assistant on a fresh thread.
    /// `action` picks the extraction: due notice, overdue collection, or
    /// payment thanks.
    pub async fn extract_invoice_notice(
        &self,
        tenant: &Tenant,
        action: InstructionAction,
        invoice: &Invoice,
        customer: &BillingCustomer,
    ) -> Result<(Assistant, DriveOutcome<BillingReply>), ApplicationError> {
        let assistant = self.assistant_by_purpose(tenant, AssistantPurpose::Collect).await?;
        let now = Utc::now().with_timezone(&tenant.timezone);
        let message = instructions::extract_invoice(
            action,
            &customer.name,
            customer.phone.as_deref().unwrap_or_default(),
            invoice.due_date,
            now,
            invoice.description.as_deref().unwrap_or_default(),
        )
        .to_wire();
        let outcome = self
            .driver
            .drive(
                &assistant,
                DriveRequest::on_thread(None).with_message(message),
                &self.tools(tenant),
            )
            .await?;
        Ok((assistant, outcome))
    }
}
