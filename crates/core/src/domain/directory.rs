//! Tenant directory records: transfer targets, calendar registrations, media
//! shortcuts, staff, and billing accounts. All are resolved by shortcut (or
//! listed whole) during routing and sweeps.

use serde::{Deserialize, Serialize};

use crate::domain::tenant::TenantId;
use crate::errors::DomainError;

/// Transfer target scoped to a tenant's chat gateway. `is_confirmation`
/// marks the department the appointment-confirmation sweep hands sessions to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Department {
    pub id: String,
    pub tenant_id: TenantId,
    pub shortcut: String,
    pub external_department_id: String,
    pub external_user_id: Option<String>,
    pub transfer_comment: Option<String>,
    pub is_confirmation: bool,
}

/// Calendar registration: shortcut → calendar address (email or calendar id).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Agenda {
    pub id: String,
    pub tenant_id: TenantId,
    pub shortcut: String,
    pub address: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Document,
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Document => "document",
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "image" => Ok(Self::Image),
            "document" => Ok(Self::Document),
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            other => Err(DomainError::InvariantViolation(format!("unknown media kind `{other}`"))),
        }
    }
}

/// Tenant media library entry; `Response.midia` shortcuts resolve here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaAsset {
    pub id: String,
    pub tenant_id: TenantId,
    pub shortcut: String,
    pub kind: MediaKind,
    pub url: String,
    pub caption: Option<String>,
}

/// Staff roster row surfaced to the model through the list-employees tool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Employee {
    pub id: String,
    pub tenant_id: TenantId,
    pub name: String,
    pub role: Option<String>,
}

/// One billing API key; the invoice sweeps run once per account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BillingAccount {
    pub id: String,
    pub tenant_id: TenantId,
    pub label: String,
    pub api_key: String,
    pub base_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::MediaKind;

    #[test]
    fn media_kinds_round_trip_through_strings() {
        for kind in [MediaKind::Image, MediaKind::Document, MediaKind::Audio, MediaKind::Video] {
            assert_eq!(MediaKind::parse(kind.as_str()).unwrap(), kind);
        }
        assert!(MediaKind::parse("sticker").is_err());
    }
}
