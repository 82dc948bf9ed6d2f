//! The scheduler's work units: the periodic recall sweep and the daily
//! confirmation, due-invoice, and overdue sweeps. The ops endpoints run the
//! same functions on demand. One contact's, event's, or invoice's failure is
//! logged and the sweep moves on; only a tenant-level lookup failure stops
//! that tenant's pass.

use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use frontdesk_agent::{gateway_failure, persistence_failure, AdapterSet, RouteRequest};
use frontdesk_core::availability::CalendarEvent;
use frontdesk_core::domain::contact::Contact;
use frontdesk_core::domain::directory::{Agenda, BillingAccount, Department};
use frontdesk_core::domain::tenant::Tenant;
use frontdesk_core::recall::{recall_cutoffs, recall_eligibility};
use frontdesk_core::wire::{Activity, InstructionAction};
use frontdesk_core::{ApplicationError, DomainError};
use frontdesk_gateway::billing::{BillingClient, Invoice, InvoiceStatus};
use frontdesk_gateway::calendar::CalendarClient;
use frontdesk_gateway::chat::{ChatGateway, RecallSnapshot};
use frontdesk_gateway::crm::CrmClient;
use frontdesk_gateway::providers;

use crate::state::{AppState, SweepKind};

/// What one sweep pass did. `skipped` counts units examined and deliberately
/// left alone: an overlapping sweep, a failed eligibility re-check, or a
/// session the gateway says is already over.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    pub processed: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl SweepStats {
    fn absorb(&mut self, other: SweepStats) {
        self.processed += other.processed;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }

    fn one_failed() -> Self {
        Self { failed: 1, ..Self::default() }
    }

    fn one_skipped() -> Self {
        Self { skipped: 1, ..Self::default() }
    }
}

/// Runs `kind` across every active tenant.
pub async fn run_sweep(state: &AppState, kind: SweepKind) -> SweepStats {
    let mut stats = SweepStats::default();
    let tenants = match state.tenants.list_active().await {
        Ok(tenants) => tenants,
        Err(error) => {
            warn!(
                event_name = "sweep_tenant_list_failed",
                kind = kind.as_str(),
                error = %error,
                "skipping this pass"
            );
            return SweepStats::one_failed();
        }
    };
    for tenant in &tenants {
        stats.absorb(sweep_tenant(state, tenant, kind).await);
    }
    info!(
        event_name = "sweep_finished",
        kind = kind.as_str(),
        processed = stats.processed,
        failed = stats.failed,
        skipped = stats.skipped,
    );
    stats
}

/// Runs `kind` for one tenant under the overlap guard. Tenants that have the
/// feature switched off contribute nothing.
pub async fn sweep_tenant(state: &AppState, tenant: &Tenant, kind: SweepKind) -> SweepStats {
    let enabled = match kind {
        SweepKind::Recall => tenant.recall.enabled,
        SweepKind::Confirmations => tenant.confirm_appointments_enabled,
        SweepKind::DueInvoices => tenant.invoice_reminders_enabled,
        SweepKind::Overdue => tenant.overdue_collection_enabled,
    };
    if !enabled {
        return SweepStats::default();
    }
    if !state.sweep_guard.try_begin(&tenant.id, kind) {
        debug!(
            event_name = "sweep_overlap",
            kind = kind.as_str(),
            tenant = %tenant.slug,
            "previous sweep still running"
        );
        return SweepStats::one_skipped();
    }

    let adapters = match TenantAdapters::for_tenant(tenant) {
        Ok(adapters) => adapters,
        Err(error) => {
            warn!(
                event_name = "sweep_adapters_failed",
                kind = kind.as_str(),
                tenant = %tenant.slug,
                error = %error,
            );
            state.sweep_guard.finish(&tenant.id, kind);
            return SweepStats::one_failed();
        }
    };
    let stats = match kind {
        SweepKind::Recall => recall_tenant(state, tenant, &adapters).await,
        SweepKind::Confirmations => confirmation_tenant(state, tenant, &adapters).await,
        SweepKind::DueInvoices => {
            invoices_tenant(state, tenant, &adapters, InvoiceSelection::DueSoon).await
        }
        SweepKind::Overdue => {
            invoices_tenant(state, tenant, &adapters, InvoiceSelection::Overdue).await
        }
    };
    state.sweep_guard.finish(&tenant.id, kind);
    stats
}

/// One tenant's provider clients, built once per sweep pass.
pub(crate) struct TenantAdapters {
    chat: Arc<dyn ChatGateway>,
    calendar: Option<Arc<dyn CalendarClient>>,
    crm: Option<Arc<dyn CrmClient>>,
}

impl TenantAdapters {
    fn for_tenant(tenant: &Tenant) -> Result<Self, ApplicationError> {
        Ok(Self {
            chat: providers::chat_gateway(tenant).map_err(gateway_failure)?,
            calendar: providers::calendar_client(tenant).map_err(gateway_failure)?,
            crm: providers::crm_client(tenant).map_err(gateway_failure)?,
        })
    }

    fn as_set(&self) -> AdapterSet<'_> {
        AdapterSet {
            chat: self.chat.as_ref(),
            calendar: self.calendar.as_deref(),
            crm: self.crm.as_deref(),
        }
    }
}

async fn recall_tenant(
    state: &AppState,
    tenant: &Tenant,
    adapters: &TenantAdapters,
) -> SweepStats {
    let mut stats = SweepStats::default();
    let cutoffs = recall_cutoffs(&tenant.recall, Utc::now());
    let candidates = match state
        .contacts
        .list_recall_candidates(
            &tenant.id,
            cutoffs,
            tenant.recall.max_attempts,
            tenant.recall.skips_pending_confirmation,
        )
        .await
    {
        Ok(candidates) => candidates,
        Err(error) => {
            warn!(
                event_name = "recall_candidates_failed",
                tenant = %tenant.slug,
                error = %error,
            );
            return SweepStats::one_failed();
        }
    };

    for contact in &candidates {
        match recall_contact(state, tenant, adapters, contact).await {
            Ok(true) => stats.processed += 1,
            Ok(false) => stats.skipped += 1,
            Err(error) => {
                warn!(
                    event_name = "recall_contact_failed",
                    tenant = %tenant.slug,
                    contact = %contact.external_id,
                    error = %error,
                    "continuing with the next contact"
                );
                stats.failed += 1;
            }
        }
    }
    stats
}

/// One recall attempt. `Ok(true)` means a nudge went out.
async fn recall_contact(
    state: &AppState,
    tenant: &Tenant,
    adapters: &TenantAdapters,
    contact: &Contact,
) -> Result<bool, ApplicationError> {
    // The candidate query is a coarse filter; re-check against a fresh clock.
    let Some(kind) = recall_eligibility(&tenant.recall, contact, Utc::now()) else {
        return Ok(false);
    };

    match adapters.chat.recall_snapshot(&contact.external_id).await.map_err(gateway_failure)? {
        RecallSnapshot::SessionClosed => {
            debug!(
                event_name = "recall_session_closed",
                contact = %contact.external_id,
                "resetting instead of nudging"
            );
            state.contacts.reset(&contact.id, Utc::now()).await.map_err(persistence_failure)?;
            return Ok(false);
        }
        RecallSnapshot::Open { last_from_user: true } => {
            debug!(
                event_name = "recall_user_spoke_last",
                contact = %contact.external_id,
                "resetting instead of nudging"
            );
            state.contacts.reset(&contact.id, Utc::now()).await.map_err(persistence_failure)?;
            return Ok(false);
        }
        // Could not inspect the session; leave the contact for the next
        // sweep rather than resetting on a guess.
        RecallSnapshot::Indeterminate => {
            debug!(
                event_name = "recall_session_indeterminate",
                contact = %contact.external_id,
                "skipping without reset"
            );
            return Ok(false);
        }
        RecallSnapshot::Open { last_from_user: false } => {}
    }

    let (assistant, outcome) = state.engagement.recall_nudge(tenant, contact, kind).await?;
    if outcome.created_thread {
        state
            .contacts
            .set_thread(&contact.id, &outcome.thread_id, Utc::now())
            .await
            .map_err(persistence_failure)?;
    }

    let response = outcome.reply;
    state
        .routing
        .route(RouteRequest {
            tenant,
            contact,
            assistant: &assistant,
            response: &response,
            audio_reply_url: None,
            adapters: adapters.as_set(),
        })
        .await?;

    // An E routing already reset the contact; counting it would resurrect a
    // cleared counter. The guard keys on the thread id this sweep read, so a
    // concurrent webhook reset also wins over the increment.
    if response.activity() != Some(Activity::End) {
        state
            .contacts
            .increment_recall_guarded(&contact.id, contact.thread_id.as_deref(), Utc::now())
            .await
            .map_err(persistence_failure)?;
    }
    Ok(true)
}

async fn confirmation_tenant(
    state: &AppState,
    tenant: &Tenant,
    adapters: &TenantAdapters,
) -> SweepStats {
    let mut stats = SweepStats::default();
    let Some(calendar) = adapters.calendar.as_deref() else {
        warn!(
            event_name = "confirmation_without_calendar",
            tenant = %tenant.slug,
            "confirmations enabled but no calendar provider configured"
        );
        return SweepStats::one_failed();
    };
    let department = match state.directory.find_confirmation_department(&tenant.id).await {
        Ok(department) => department,
        Err(error) => {
            warn!(event_name = "confirmation_department_failed", tenant = %tenant.slug, error = %error);
            return SweepStats::one_failed();
        }
    };
    let agendas = match state.directory.list_agendas(&tenant.id).await {
        Ok(agendas) => agendas,
        Err(error) => {
            warn!(event_name = "confirmation_agendas_failed", tenant = %tenant.slug, error = %error);
            return SweepStats::one_failed();
        }
    };

    let tomorrow = local_today(tenant) + Days::new(1);
    for agenda in &agendas {
        let events = match calendar.list_events(&agenda.address, tomorrow).await {
            Ok(events) => events,
            Err(error) => {
                warn!(
                    event_name = "confirmation_agenda_failed",
                    agenda = %agenda.shortcut,
                    error = %error,
                    "continuing with the next agenda"
                );
                stats.failed += 1;
                continue;
            }
        };
        for event in &events {
            match confirm_event(state, tenant, adapters, department.as_ref(), agenda, event).await
            {
                Ok(()) => stats.processed += 1,
                Err(error) => {
                    warn!(
                        event_name = "confirmation_event_failed",
                        agenda = %agenda.shortcut,
                        event = %event.title,
                        error = %error,
                        "continuing with the next event"
                    );
                    stats.failed += 1;
                }
            }
        }
    }
    stats
}

/// One of tomorrow's appointments turned into a confirmation conversation.
async fn confirm_event(
    state: &AppState,
    tenant: &Tenant,
    adapters: &TenantAdapters,
    department: Option<&Department>,
    agenda: &Agenda,
    event: &CalendarEvent,
) -> Result<(), ApplicationError> {
    let (assistant, outcome) =
        state.engagement.extract_confirmation(tenant, &agenda.address, event).await?;
    let reply = outcome.reply;

    let external_id = adapters
        .chat
        .resolve_contact_id(&reply.telefone, &reply.cliente)
        .await
        .map_err(gateway_failure)?;
    let now = Utc::now();
    let mut contact = state
        .contacts
        .find_or_create(&tenant.id, &external_id, tenant.default_assistant_id.as_ref(), now)
        .await
        .map_err(persistence_failure)?;

    // First notice for this appointment: flag the contact and hand it to the
    // confirmation assistant. A repeat sweep leaves the assignment alone.
    if !contact.pending_confirmation {
        state
            .contacts
            .set_pending_confirmation(&contact.id, true, now)
            .await
            .map_err(persistence_failure)?;
        state
            .contacts
            .set_assistant(&contact.id, &assistant.id, now)
            .await
            .map_err(persistence_failure)?;
    }

    if let Some(department) = department {
        if let Err(error) = adapters.chat.transfer_session(&external_id, department).await {
            warn!(
                event_name = "confirmation_transfer_failed",
                contact = %external_id,
                error = %error,
                "delivering without the session move"
            );
        }
    }

    // The extraction ran on a fresh thread; route on it and make it the
    // contact's conversation.
    contact.thread_id = Some(outcome.thread_id.clone());
    state
        .routing
        .route(RouteRequest {
            tenant,
            contact: &contact,
            assistant: &assistant,
            response: &reply.resposta_confirmacao,
            audio_reply_url: None,
            adapters: adapters.as_set(),
        })
        .await?;
    state
        .contacts
        .set_thread(&contact.id, &outcome.thread_id, Utc::now())
        .await
        .map_err(persistence_failure)?;
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InvoiceSelection {
    DueSoon,
    Overdue,
}

async fn invoices_tenant(
    state: &AppState,
    tenant: &Tenant,
    adapters: &TenantAdapters,
    selection: InvoiceSelection,
) -> SweepStats {
    let mut stats = SweepStats::default();
    let accounts = match state.directory.list_billing_accounts(&tenant.id).await {
        Ok(accounts) => accounts,
        Err(error) => {
            warn!(event_name = "billing_accounts_failed", tenant = %tenant.slug, error = %error);
            return SweepStats::one_failed();
        }
    };
    for account in &accounts {
        match sweep_account(state, tenant, adapters, account, selection).await {
            Ok(account_stats) => stats.absorb(account_stats),
            Err(error) => {
                warn!(
                    event_name = "billing_account_failed",
                    tenant = %tenant.slug,
                    account = %account.label,
                    error = %error,
                    "continuing with the next account"
                );
                stats.failed += 1;
            }
        }
    }
    stats
}

async fn sweep_account(
    state: &AppState,
    tenant: &Tenant,
    adapters: &TenantAdapters,
    account: &BillingAccount,
    selection: InvoiceSelection,
) -> Result<SweepStats, ApplicationError> {
    let Some(billing) = providers::billing_client(tenant, account).map_err(gateway_failure)?
    else {
        return Err(ApplicationError::Configuration(format!(
            "tenant `{}` has no billing provider configured",
            tenant.slug
        )));
    };

    let invoices = match selection {
        InvoiceSelection::DueSoon => {
            let today = local_today(tenant);
            let lead = u64::from(tenant.invoice_reminder_lead_days);
            let mut due = Vec::new();
            // Two notices per invoice: one `lead` days out and a second two
            // days later.
            for offset in [lead, lead + 2] {
                let date = today + Days::new(offset);
                due.extend(billing.list_invoices_due_on(date).await.map_err(gateway_failure)?);
            }
            due
        }
        InvoiceSelection::Overdue => {
            billing.list_overdue_invoices().await.map_err(gateway_failure)?
        }
    };
    let action = match selection {
        InvoiceSelection::DueSoon => InstructionAction::ExtractDueInvoice,
        InvoiceSelection::Overdue => InstructionAction::ExtractOverdueInvoice,
    };

    let mut stats = SweepStats::default();
    for invoice in &invoices {
        match notify_invoice(state, tenant, adapters, billing.as_ref(), action, invoice).await {
            Ok(()) => stats.processed += 1,
            Err(error) => {
                warn!(
                    event_name = "invoice_notice_failed",
                    invoice = %invoice.id,
                    error = %error,
                    "continuing with the next invoice"
                );
                stats.failed += 1;
            }
        }
    }
    Ok(stats)
}

/// One invoice turned into a collection (or thank-you) conversation.
async fn notify_invoice(
    state: &AppState,
    tenant: &Tenant,
    adapters: &TenantAdapters,
    billing: &dyn BillingClient,
    action: InstructionAction,
    invoice: &Invoice,
) -> Result<(), ApplicationError> {
    let customer = billing.get_customer(&invoice.customer_id).await.map_err(gateway_failure)?;
    let (assistant, outcome) =
        state.engagement.extract_invoice_notice(tenant, action, invoice, &customer).await?;
    let reply = outcome.reply;

    // The extraction may normalize the phone; fall back to the billing record.
    let phone = if reply.telefone.is_empty() {
        customer.phone.clone().unwrap_or_default()
    } else {
        reply.telefone.clone()
    };
    if phone.is_empty() {
        return Err(DomainError::MalformedPayload(format!(
            "no phone number for billing customer `{}`",
            customer.id
        ))
        .into());
    }

    let external_id =
        adapters.chat.resolve_contact_id(&phone, &customer.name).await.map_err(gateway_failure)?;
    let now = Utc::now();
    let mut contact = state
        .contacts
        .find_or_create(&tenant.id, &external_id, tenant.default_assistant_id.as_ref(), now)
        .await
        .map_err(persistence_failure)?;
    state
        .contacts
        .set_assistant(&contact.id, &assistant.id, now)
        .await
        .map_err(persistence_failure)?;

    contact.thread_id = Some(outcome.thread_id.clone());
    state
        .routing
        .route(RouteRequest {
            tenant,
            contact: &contact,
            assistant: &assistant,
            response: &reply.resposta,
            audio_reply_url: None,
            adapters: adapters.as_set(),
        })
        .await?;
    state
        .contacts
        .set_thread(&contact.id, &outcome.thread_id, Utc::now())
        .await
        .map_err(persistence_failure)?;
    Ok(())
}

/// A billing payment webhook turned into a thank-you conversation through
/// the tenant's collection assistant.
pub async fn payment_thanks(
    state: &AppState,
    tenant: &Tenant,
    account_ref: &str,
    payload: &Value,
) -> Result<(), ApplicationError> {
    let accounts =
        state.directory.list_billing_accounts(&tenant.id).await.map_err(persistence_failure)?;
    let Some(account) =
        accounts.into_iter().find(|a| a.id == account_ref || a.label == account_ref)
    else {
        return Err(ApplicationError::Configuration(format!(
            "unknown billing account `{account_ref}`"
        )));
    };
    let Some(billing) = providers::billing_client(tenant, &account).map_err(gateway_failure)?
    else {
        return Err(ApplicationError::Configuration(format!(
            "tenant `{}` has no billing provider configured",
            tenant.slug
        )));
    };
    let adapters = TenantAdapters::for_tenant(tenant)?;
    let invoice = payment_invoice(payload)?;
    notify_invoice(
        state,
        tenant,
        &adapters,
        billing.as_ref(),
        InstructionAction::ExtractPaymentThanks,
        &invoice,
    )
    .await
}

/// Decodes the `payment` object of a billing payment webhook.
fn payment_invoice(payload: &Value) -> Result<Invoice, ApplicationError> {
    let payment = payload
        .get("payment")
        .ok_or_else(|| DomainError::MalformedPayload("missing `payment` object".to_string()))?;
    let field = |name: &str| payment.get(name).and_then(Value::as_str);

    let customer_id = field("customer").ok_or_else(|| {
        DomainError::MalformedPayload("payment without a `customer` id".to_string())
    })?;
    let due_date = field("dueDate")
        .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
        .ok_or_else(|| {
            DomainError::MalformedPayload("payment without a parseable `dueDate`".to_string())
        })?;

    Ok(Invoice {
        id: field("id").unwrap_or_default().to_string(),
        customer_id: customer_id.to_string(),
        due_date,
        value: payment.get("value").and_then(Value::as_f64).unwrap_or(0.0),
        description: field("description").map(str::to_string),
        invoice_url: field("invoiceUrl").map(str::to_string),
        status: InvoiceStatus::Received,
    })
}

fn local_today(tenant: &Tenant) -> NaiveDate {
    Utc::now().with_timezone(&tenant.timezone).date_naive()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use serde_json::json;

    use frontdesk_agent::{
        ConversationDriver, DriverSettings, EngagementFlow, RoutingEngine,
    };
    use frontdesk_core::config::AppConfig;
    use frontdesk_db::repositories::{
        SqlContactRepository, SqlDirectoryRepository, SqlTenantRepository,
    };
    use frontdesk_db::{
        connect_with_settings, fixtures, migrations, ContactRepository, TenantRepository,
    };
    use frontdesk_gateway::chat::{ChatContactProfile, ChatGateway, OutboundMedia, RecallSnapshot};
    use frontdesk_gateway::GatewayError;

    use frontdesk_agent::{
        BackendError, RunHandle, RunState, ThreadBackend, ThreadMessage,
    };

    use crate::state::{AppState, SweepGuard};

    use super::{payment_invoice, recall_tenant, TenantAdapters};

    /// Backend whose runs always complete with the given reply body. Records
    /// appended messages so tests can inspect the driven instruction.
    struct CannedBackend {
        reply: String,
        appended: Mutex<Vec<String>>,
    }

    impl CannedBackend {
        fn new(reply: &str) -> Self {
            Self { reply: reply.to_string(), appended: Mutex::new(Vec::new()) }
        }

        fn appended(&self) -> Vec<String> {
            self.appended.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ThreadBackend for CannedBackend {
        async fn create_thread(&self, _messages: &[ThreadMessage]) -> Result<String, BackendError> {
            Err(BackendError::Transport {
                operation: "create_thread",
                reason: "recall must reuse the existing thread".to_string(),
            })
        }

        async fn append_message(
            &self,
            _thread_id: &str,
            message: &ThreadMessage,
        ) -> Result<(), BackendError> {
            if let ThreadMessage::Text(text) = message {
                self.appended.lock().unwrap().push(text.clone());
            }
            Ok(())
        }

        async fn start_run(
            &self,
            _assistant_external_id: &str,
            thread_id: &str,
            _instructions: Option<&str>,
        ) -> Result<RunHandle, BackendError> {
            Ok(RunHandle { thread_id: thread_id.to_string(), run_id: "run_1".to_string() })
        }

        async fn poll_run(&self, _handle: &RunHandle) -> Result<RunState, BackendError> {
            Ok(RunState::Completed)
        }

        async fn submit_tool_outputs(
            &self,
            _handle: &RunHandle,
            _outputs: &[frontdesk_agent::backend::ToolOutput],
        ) -> Result<(), BackendError> {
            Ok(())
        }

        async fn latest_message(&self, _thread_id: &str) -> Result<String, BackendError> {
            Ok(self.reply.clone())
        }
    }

    struct FakeChat {
        sends: Mutex<Vec<String>>,
        snapshot: RecallSnapshot,
    }

    impl FakeChat {
        fn new(snapshot: RecallSnapshot) -> Self {
            Self { sends: Mutex::new(Vec::new()), snapshot }
        }

        fn sends(&self) -> Vec<String> {
            self.sends.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatGateway for FakeChat {
        async fn send_text(
            &self,
            contact_id: &str,
            _assistant_name: &str,
            text: &str,
        ) -> Result<(), GatewayError> {
            self.sends.lock().unwrap().push(format!("{contact_id}:{text}"));
            Ok(())
        }

        async fn send_media(
            &self,
            _contact_id: &str,
            _assistant_name: &str,
            _media: OutboundMedia<'_>,
        ) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn send_audio(&self, _contact_id: &str, _url: &str) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn transfer_session(
            &self,
            _contact_id: &str,
            _department: &frontdesk_core::domain::directory::Department,
        ) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn close_session(&self, _contact_id: &str) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn contact_profile(
            &self,
            _contact_id: &str,
        ) -> Result<ChatContactProfile, GatewayError> {
            Ok(ChatContactProfile::default())
        }

        async fn resolve_contact_id(
            &self,
            phone: &str,
            _name: &str,
        ) -> Result<String, GatewayError> {
            Ok(phone.to_string())
        }

        async fn recall_snapshot(
            &self,
            _contact_id: &str,
        ) -> Result<RecallSnapshot, GatewayError> {
            Ok(self.snapshot)
        }
    }

    struct Setup {
        state: AppState,
        tenant: frontdesk_core::domain::tenant::Tenant,
        contacts: Arc<SqlContactRepository>,
        backend: Arc<CannedBackend>,
    }

    /// Seeded tenant with a 30-minute recall timeout and two attempts, one
    /// contact idle for 31 minutes, and a driver whose model always answers
    /// with `reply`.
    async fn setup(reply: &str) -> Setup {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let seed = fixtures::seed_demo_tenant(&pool).await.expect("seed");

        sqlx::query(
            "UPDATE tenant SET recall_timeout_minutes = 30, recall_max_attempts = 2 \
             WHERE id = ?1",
        )
        .bind(&seed.tenant_id.0)
        .execute(&pool)
        .await
        .expect("tenant update");

        let tenants = Arc::new(SqlTenantRepository::new(pool.clone()));
        let directory = Arc::new(SqlDirectoryRepository::new(pool.clone()));
        let contacts = Arc::new(SqlContactRepository::new(pool.clone()));

        let tenant = tenants
            .find_by_slug_and_token(seed.slug, seed.webhook_token)
            .await
            .expect("tenant query")
            .expect("seeded tenant");

        let contact = contacts
            .find_or_create(&tenant.id, "5511999990000@c.us", Some(&seed.responder_id), Utc::now())
            .await
            .expect("contact");
        contacts
            .set_thread(&contact.id, "thread_live", Utc::now())
            .await
            .expect("thread");
        sqlx::query("UPDATE contact SET last_message_at = ?1 WHERE id = ?2")
            .bind((Utc::now() - Duration::minutes(31)).to_rfc3339())
            .bind(&contact.id.0)
            .execute(&pool)
            .await
            .expect("idle timestamp");

        let backend = Arc::new(CannedBackend::new(reply));
        let driver =
            Arc::new(ConversationDriver::new(backend.clone(), DriverSettings::default()));
        let state = AppState {
            config: AppConfig::default(),
            pool: pool.clone(),
            tenants: tenants.clone(),
            directory: directory.clone(),
            contacts: contacts.clone(),
            driver: driver.clone(),
            routing: RoutingEngine::new(directory.clone(), contacts.clone(), driver.clone()),
            engagement: EngagementFlow::new(directory, driver),
            sweep_guard: SweepGuard::default(),
        };
        Setup { state, tenant, contacts, backend }
    }

    #[tokio::test]
    async fn idle_contact_gets_one_nudge_and_the_counter_moves() {
        let setup = setup(r#"{"atividade":"R","mensagem":"Ainda está aí?"}"#).await;
        let chat = Arc::new(FakeChat::new(RecallSnapshot::Open { last_from_user: false }));
        let adapters =
            TenantAdapters { chat: chat.clone(), calendar: None, crm: None };

        let stats = recall_tenant(&setup.state, &setup.tenant, &adapters).await;
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.failed, 0);

        let sends = chat.sends();
        assert_eq!(sends.len(), 1);
        assert!(sends[0].contains("Ainda está aí?"));

        // A standard recall drives the resume instruction, not the close one.
        let driven = setup.backend.appended();
        assert_eq!(driven.len(), 1);
        assert!(driven[0].contains("retomar_atendimento"));

        let contact = setup
            .contacts
            .find_by_external_id(&setup.tenant.id, "5511999990000@c.us")
            .await
            .expect("query")
            .expect("contact");
        assert_eq!(contact.recall_count, 1);
        assert_eq!(contact.thread_id.as_deref(), Some("thread_live"));
    }

    #[tokio::test]
    async fn closed_session_resets_the_contact_without_a_send() {
        let setup = setup(r#"{"atividade":"R","mensagem":"nunca enviado"}"#).await;
        let chat = Arc::new(FakeChat::new(RecallSnapshot::SessionClosed));
        let adapters =
            TenantAdapters { chat: chat.clone(), calendar: None, crm: None };

        let stats = recall_tenant(&setup.state, &setup.tenant, &adapters).await;
        assert_eq!(stats.processed, 0);
        assert_eq!(stats.skipped, 1);
        assert!(chat.sends().is_empty());

        let contact = setup
            .contacts
            .find_by_external_id(&setup.tenant.id, "5511999990000@c.us")
            .await
            .expect("query")
            .expect("contact");
        assert_eq!(contact.recall_count, 0);
        assert!(contact.thread_id.is_none());
    }

    #[tokio::test]
    async fn an_end_reply_skips_the_counter_and_resets() {
        let setup = setup(r#"{"atividade":"E","mensagem":"Encerro por aqui. Até logo!"}"#).await;
        let chat = Arc::new(FakeChat::new(RecallSnapshot::Open { last_from_user: false }));
        let adapters =
            TenantAdapters { chat: chat.clone(), calendar: None, crm: None };

        let stats = recall_tenant(&setup.state, &setup.tenant, &adapters).await;
        assert_eq!(stats.processed, 1);

        // The E routing closed and reset; the counter must stay cleared.
        let contact = setup
            .contacts
            .find_by_external_id(&setup.tenant.id, "5511999990000@c.us")
            .await
            .expect("query")
            .expect("contact");
        assert_eq!(contact.recall_count, 0);
        assert!(contact.thread_id.is_none());
    }

    #[test]
    fn payment_webhooks_decode_into_received_invoices() {
        let invoice = payment_invoice(&json!({
            "payment": {
                "id": "pay_123",
                "customer": "cus_9",
                "dueDate": "2026-09-01",
                "value": 150.0,
                "description": "Consulta de retorno"
            }
        }))
        .expect("decode");
        assert_eq!(invoice.customer_id, "cus_9");
        assert_eq!(invoice.status, super::InvoiceStatus::Received);
        assert_eq!(invoice.value, 150.0);

        assert!(payment_invoice(&json!({"payment": {"id": "x"}})).is_err());
        assert!(payment_invoice(&json!({"event": "PAYMENT_RECEIVED"})).is_err());
    }
}
