use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use frontdesk_core::domain::assistant::{Assistant, AssistantId, AssistantPurpose};
use frontdesk_core::domain::contact::{Contact, ContactId};
use frontdesk_core::domain::directory::{
    Agenda, BillingAccount, Department, Employee, MediaAsset,
};
use frontdesk_core::domain::tenant::{Tenant, TenantId};
use frontdesk_core::recall::RecallCutoffs;

pub mod contact;
pub mod directory;
pub mod tenant;

pub use contact::SqlContactRepository;
pub use directory::SqlDirectoryRepository;
pub use tenant::SqlTenantRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn find_by_slug_and_token(
        &self,
        slug: &str,
        token: &str,
    ) -> Result<Option<Tenant>, RepositoryError>;

    async fn list_active(&self) -> Result<Vec<Tenant>, RepositoryError>;
}

/// Lookups over the tenant directory: assistants, departments, agendas,
/// media shortcuts, staff, and billing accounts.
#[async_trait]
pub trait DirectoryRepository: Send + Sync {
    async fn find_assistant(
        &self,
        id: &AssistantId,
    ) -> Result<Option<Assistant>, RepositoryError>;

    async fn find_assistant_by_purpose(
        &self,
        tenant_id: &TenantId,
        purpose: AssistantPurpose,
    ) -> Result<Option<Assistant>, RepositoryError>;

    async fn find_assistant_by_shortcut(
        &self,
        tenant_id: &TenantId,
        shortcut: &str,
    ) -> Result<Option<Assistant>, RepositoryError>;

    async fn find_department_by_shortcut(
        &self,
        tenant_id: &TenantId,
        shortcut: &str,
    ) -> Result<Option<Department>, RepositoryError>;

    async fn find_confirmation_department(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<Department>, RepositoryError>;

    async fn find_agenda_by_shortcut(
        &self,
        tenant_id: &TenantId,
        shortcut: &str,
    ) -> Result<Option<Agenda>, RepositoryError>;

    async fn list_agendas(&self, tenant_id: &TenantId) -> Result<Vec<Agenda>, RepositoryError>;

    async fn find_media_by_shortcut(
        &self,
        tenant_id: &TenantId,
        shortcut: &str,
    ) -> Result<Option<MediaAsset>, RepositoryError>;

    async fn list_employees(&self, tenant_id: &TenantId)
        -> Result<Vec<Employee>, RepositoryError>;

    async fn list_billing_accounts(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<BillingAccount>, RepositoryError>;
}

/// Contact reads plus the guarded mutations the webhook path and the sweeps
/// share. Every mutation is a single statement, so webhook and scheduler
/// interleavings cannot observe a half-applied contact.
#[async_trait]
pub trait ContactRepository: Send + Sync {
    async fn find_by_external_id(
        &self,
        tenant_id: &TenantId,
        external_id: &str,
    ) -> Result<Option<Contact>, RepositoryError>;

    /// Creates the contact on first sight (assigning the tenant default
    /// assistant), or touches `last_message_at` on an existing one.
    async fn find_or_create(
        &self,
        tenant_id: &TenantId,
        external_id: &str,
        default_assistant: Option<&AssistantId>,
        now: DateTime<Utc>,
    ) -> Result<Contact, RepositoryError>;

    async fn list_recall_candidates(
        &self,
        tenant_id: &TenantId,
        cutoffs: RecallCutoffs,
        max_attempts: u32,
        skip_pending_confirmation: bool,
    ) -> Result<Vec<Contact>, RepositoryError>;

    async fn set_thread(
        &self,
        id: &ContactId,
        thread_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn set_assistant(
        &self,
        id: &ContactId,
        assistant_id: &AssistantId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn set_awaiting_human(
        &self,
        id: &ContactId,
        awaiting: bool,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn set_pending_confirmation(
        &self,
        id: &ContactId,
        pending: bool,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn update_profile(
        &self,
        id: &ContactId,
        display_name: Option<&str>,
        phone: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Clears thread, assistant, recall counter, and the confirmation and
    /// awaiting-human flags. Idempotent.
    async fn reset(&self, id: &ContactId, now: DateTime<Utc>) -> Result<(), RepositoryError>;

    /// Increments the recall counter and refreshes `last_message_at` (so the
    /// next attempt waits a full timeout), but only while the contact still
    /// carries the thread id the sweep selected it with; a concurrent reset
    /// wins and the increment becomes a no-op. Returns whether a row was
    /// updated.
    async fn increment_recall_guarded(
        &self,
        id: &ContactId,
        expected_thread_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
}

pub(crate) fn column<'r, T>(
    row: &'r sqlx::sqlite::SqliteRow,
    name: &str,
) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    use sqlx::Row;
    row.try_get(name).map_err(|e| RepositoryError::Decode(format!("column `{name}`: {e}")))
}

pub(crate) fn bool_column(
    row: &sqlx::sqlite::SqliteRow,
    name: &str,
) -> Result<bool, RepositoryError> {
    Ok(column::<i64>(row, name)? != 0)
}

pub(crate) fn parse_timestamp(
    column: &str,
    value: &str,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| RepositoryError::Decode(format!("column `{column}`: {err}")))
}

pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}
