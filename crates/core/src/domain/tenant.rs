use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::domain::assistant::AssistantId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatProvider {
    Digisac,
    Evolution,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarProvider {
    Outlook,
    Google,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrmProvider {
    RdStation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingProvider {
    Asaas,
}

/// What cancelling a booked event does: remove it from the calendar, or keep
/// it retitled as cancelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelPolicy {
    Delete,
    Keep,
}

impl ChatProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Digisac => "digisac",
            Self::Evolution => "evolution",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "digisac" => Ok(Self::Digisac),
            "evolution" => Ok(Self::Evolution),
            other => Err(DomainError::InvariantViolation(format!(
                "unknown chat provider `{other}`"
            ))),
        }
    }
}

impl CalendarProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Outlook => "outlook",
            Self::Google => "google",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "outlook" => Ok(Self::Outlook),
            "google" => Ok(Self::Google),
            other => Err(DomainError::InvariantViolation(format!(
                "unknown calendar provider `{other}`"
            ))),
        }
    }
}

impl CrmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RdStation => "rdstation",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "rdstation" => Ok(Self::RdStation),
            other => {
                Err(DomainError::InvariantViolation(format!("unknown crm provider `{other}`")))
            }
        }
    }
}

impl BillingProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asaas => "asaas",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "asaas" => Ok(Self::Asaas),
            other => {
                Err(DomainError::InvariantViolation(format!("unknown billing provider `{other}`")))
            }
        }
    }
}

impl CancelPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Keep => "keep",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "delete" => Ok(Self::Delete),
            "keep" => Ok(Self::Keep),
            other => {
                Err(DomainError::InvariantViolation(format!("unknown cancel policy `{other}`")))
            }
        }
    }
}

/// Re-engagement thresholds. Unset timeouts fall back to the compatibility
/// defaults: 60 minutes standard, 1440 minutes (one day) final.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecallSettings {
    pub enabled: bool,
    pub timeout_minutes: Option<i64>,
    pub final_timeout_minutes: Option<i64>,
    pub max_attempts: u32,
    pub skips_pending_confirmation: bool,
}

impl RecallSettings {
    pub const DEFAULT_TIMEOUT_MINUTES: i64 = 60;
    pub const DEFAULT_FINAL_TIMEOUT_MINUTES: i64 = 1440;

    pub fn standard_timeout_minutes(&self) -> i64 {
        self.timeout_minutes.unwrap_or(Self::DEFAULT_TIMEOUT_MINUTES)
    }

    pub fn final_timeout_minutes(&self) -> i64 {
        self.final_timeout_minutes.unwrap_or(Self::DEFAULT_FINAL_TIMEOUT_MINUTES)
    }
}

impl Default for RecallSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_minutes: None,
            final_timeout_minutes: None,
            max_attempts: 3,
            skips_pending_confirmation: false,
        }
    }
}

/// CRM pipeline stage ids per calendar activity. A missing stage means the
/// CRM move is skipped for that activity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CrmStages {
    pub booked: Option<String>,
    pub rescheduled: Option<String>,
    pub cancelled: Option<String>,
    pub confirmed: Option<String>,
}

/// Per-provider credential columns. Which fields are populated depends on the
/// tenant's provider selectors; the provider constructors validate what they
/// need.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderCredentials {
    pub chat_base_url: Option<String>,
    pub chat_api_key: Option<String>,
    pub chat_account: Option<String>,
    pub chat_default_user: Option<String>,
    pub calendar_base_url: Option<String>,
    pub calendar_api_key: Option<String>,
    pub calendar_default_user: Option<String>,
    pub crm_base_url: Option<String>,
    pub crm_api_key: Option<String>,
    pub crm_user_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tenant {
    pub id: TenantId,
    pub slug: String,
    pub webhook_token: String,
    pub name: String,
    pub timezone: Tz,
    pub active: bool,
    pub chat_provider: ChatProvider,
    pub calendar_provider: Option<CalendarProvider>,
    pub crm_provider: Option<CrmProvider>,
    pub billing_provider: Option<BillingProvider>,
    pub default_assistant_id: Option<AssistantId>,
    pub fallback_message: String,
    pub cancel_policy: CancelPolicy,
    pub recall: RecallSettings,
    pub confirm_appointments_enabled: bool,
    pub invoice_reminders_enabled: bool,
    pub invoice_reminder_lead_days: u32,
    pub overdue_collection_enabled: bool,
    pub business_hours_start: NaiveTime,
    pub business_hours_end: NaiveTime,
    pub slot_minutes: u32,
    pub daily_sweep_time: NaiveTime,
    pub crm_stages: CrmStages,
    pub credentials: ProviderCredentials,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    /// Resolves the IANA timezone name stored for a tenant, rejecting values
    /// `chrono_tz` does not know.
    pub fn parse_timezone(name: &str) -> Result<Tz, DomainError> {
        name.parse::<Tz>().map_err(|_| DomainError::InvalidTimezone(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::{CancelPolicy, ChatProvider, RecallSettings, Tenant};

    #[test]
    fn recall_timeouts_fall_back_to_defaults() {
        let recall = RecallSettings::default();
        assert_eq!(recall.standard_timeout_minutes(), 60);
        assert_eq!(recall.final_timeout_minutes(), 1440);

        let tuned = RecallSettings {
            timeout_minutes: Some(30),
            final_timeout_minutes: Some(720),
            ..RecallSettings::default()
        };
        assert_eq!(tuned.standard_timeout_minutes(), 30);
        assert_eq!(tuned.final_timeout_minutes(), 720);
    }

    #[test]
    fn provider_selectors_round_trip_through_strings() {
        for provider in [ChatProvider::Digisac, ChatProvider::Evolution] {
            assert_eq!(ChatProvider::parse(provider.as_str()).unwrap(), provider);
        }
        for policy in [CancelPolicy::Delete, CancelPolicy::Keep] {
            assert_eq!(CancelPolicy::parse(policy.as_str()).unwrap(), policy);
        }
        assert!(ChatProvider::parse("telegram").is_err());
    }

    #[test]
    fn timezone_parsing_rejects_unknown_names() {
        assert!(Tenant::parse_timezone("America/Sao_Paulo").is_ok());
        assert!(Tenant::parse_timezone("Mars/Olympus_Mons").is_err());
    }
}
