use chrono::NaiveTime;
use sqlx::sqlite::SqliteRow;

use frontdesk_core::domain::assistant::AssistantId;
use frontdesk_core::domain::tenant::{
    BillingProvider, CalendarProvider, CancelPolicy, ChatProvider, CrmProvider, CrmStages,
    ProviderCredentials, RecallSettings, Tenant, TenantId,
};

use super::{bool_column, column, parse_timestamp, RepositoryError, TenantRepository};
use crate::DbPool;

pub struct SqlTenantRepository {
    pool: DbPool,
}

impl SqlTenantRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_time(name: &str, value: &str) -> Result<NaiveTime, RepositoryError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|e| RepositoryError::Decode(format!("column `{name}`: {e}")))
}

fn row_to_tenant(row: &SqliteRow) -> Result<Tenant, RepositoryError> {
    let timezone_name: String = column(row, "timezone")?;
    let timezone = Tenant::parse_timezone(&timezone_name)
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let chat_provider = ChatProvider::parse(&column::<String>(row, "chat_provider")?)
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let calendar_provider = column::<Option<String>>(row, "calendar_provider")?
        .map(|s| CalendarProvider::parse(&s))
        .transpose()
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let crm_provider = column::<Option<String>>(row, "crm_provider")?
        .map(|s| CrmProvider::parse(&s))
        .transpose()
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let billing_provider = column::<Option<String>>(row, "billing_provider")?
        .map(|s| BillingProvider::parse(&s))
        .transpose()
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let cancel_policy = CancelPolicy::parse(&column::<String>(row, "cancel_policy")?)
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let recall = RecallSettings {
        enabled: bool_column(row, "recall_enabled")?,
        timeout_minutes: column(row, "recall_timeout_minutes")?,
        final_timeout_minutes: column(row, "final_recall_timeout_minutes")?,
        max_attempts: column::<i64>(row, "recall_max_attempts")?.max(0) as u32,
        skips_pending_confirmation: bool_column(row, "recall_skips_pending_confirmation")?,
    };

    let crm_stages = CrmStages {
        booked: column(row, "crm_stage_booked")?,
        rescheduled: column(row, "crm_stage_rescheduled")?,
        cancelled: column(row, "crm_stage_cancelled")?,
        confirmed: column(row, "crm_stage_confirmed")?,
    };

    let credentials = ProviderCredentials {
        chat_base_url: column(row, "chat_base_url")?,
        chat_api_key: column(row, "chat_api_key")?,
        chat_account: column(row, "chat_account")?,
        chat_default_user: column(row, "chat_default_user")?,
        calendar_base_url: column(row, "calendar_base_url")?,
        calendar_api_key: column(row, "calendar_api_key")?,
        calendar_default_user: column(row, "calendar_default_user")?,
        crm_base_url: column(row, "crm_base_url")?,
        crm_api_key: column(row, "crm_api_key")?,
        crm_user_id: column(row, "crm_user_id")?,
    };

    Ok(Tenant {
        id: TenantId(column(row, "id")?),
        slug: column(row, "slug")?,
        webhook_token: column(row, "webhook_token")?,
        name: column(row, "name")?,
        timezone,
        active: bool_column(row, "active")?,
        chat_provider,
        calendar_provider,
        crm_provider,
        billing_provider,
        default_assistant_id: column::<Option<String>>(row, "default_assistant_id")?
            .map(AssistantId),
        fallback_message: column(row, "fallback_message")?,
        cancel_policy,
        recall,
        confirm_appointments_enabled: bool_column(row, "confirm_appointments_enabled")?,
        invoice_reminders_enabled: bool_column(row, "invoice_reminders_enabled")?,
        invoice_reminder_lead_days: column::<i64>(row, "invoice_reminder_lead_days")?.max(0)
            as u32,
        overdue_collection_enabled: bool_column(row, "overdue_collection_enabled")?,
        business_hours_start: parse_time(
            "business_hours_start",
            &column::<String>(row, "business_hours_start")?,
        )?,
        business_hours_end: parse_time(
            "business_hours_end",
            &column::<String>(row, "business_hours_end")?,
        )?,
        slot_minutes: column::<i64>(row, "slot_minutes")?.max(1) as u32,
        daily_sweep_time: parse_time(
            "daily_sweep_time",
            &column::<String>(row, "daily_sweep_time")?,
        )?,
        crm_stages,
        credentials,
        created_at: parse_timestamp("created_at", &column::<String>(row, "created_at")?)?,
        updated_at: parse_timestamp("updated_at", &column::<String>(row, "updated_at")?)?,
    })
}

#[async_trait::async_trait]
impl TenantRepository for SqlTenantRepository {
    async fn find_by_slug_and_token(
        &self,
        slug: &str,
        token: &str,
    ) -> Result<Option<Tenant>, RepositoryError> {
        let row = sqlx::query(
            "SELECT * FROM tenant WHERE slug = ? AND webhook_token = ? AND active = 1",
        )
        .bind(slug)
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_tenant(r)?)),
            None => Ok(None),
        }
    }

    async fn list_active(&self) -> Result<Vec<Tenant>, RepositoryError> {
        let rows: Vec<SqliteRow> =
            sqlx::query("SELECT * FROM tenant WHERE active = 1 ORDER BY slug")
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(row_to_tenant).collect::<Result<Vec<_>, _>>()
    }
}
