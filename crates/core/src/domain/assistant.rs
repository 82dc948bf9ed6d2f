use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::tenant::TenantId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssistantId(pub String);

/// The single job an assistant configuration is scoped to. The routing
/// engine and the sweeps look assistants up by purpose; `M` handoffs look
/// them up by shortcut.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistantPurpose {
    Respond,
    Schedule,
    Recall,
    Confirm,
    Rewrite,
    Collect,
}

impl AssistantPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Respond => "respond",
            Self::Schedule => "schedule",
            Self::Recall => "recall",
            Self::Confirm => "confirm",
            Self::Rewrite => "rewrite",
            Self::Collect => "collect",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "respond" => Ok(Self::Respond),
            "schedule" => Ok(Self::Schedule),
            "recall" => Ok(Self::Recall),
            "confirm" => Ok(Self::Confirm),
            "rewrite" => Ok(Self::Rewrite),
            "collect" => Ok(Self::Collect),
            other => Err(DomainError::InvariantViolation(format!(
                "unknown assistant purpose `{other}`"
            ))),
        }
    }
}

/// A named LLM configuration scoped to one tenant. `external_id` is the
/// assistant id at the model backend; immutable during a routing decision.
#[derive(Clone, Debug, PartialEq)]
pub struct Assistant {
    pub id: AssistantId,
    pub tenant_id: TenantId,
    pub external_id: String,
    pub name: String,
    pub purpose: AssistantPurpose,
    pub shortcut: Option<String>,
    pub created_at: DateTime<Utc>,
}
