use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use frontdesk_core::availability::CalendarEvent;
use frontdesk_core::domain::tenant::CancelPolicy;

use crate::GatewayError;

pub const CONFIRMED_PREFIX: &str = "CONFIRMADO - ";
pub const RESCHEDULED_PREFIX: &str = "REAGENDADO - ";
pub const CANCELLED_PREFIX: &str = "CANCELADO - ";

/// A booking to create. `start` is tenant-local wall-clock time, exactly as
/// the assistant extracted it; the provider client applies the tenant
/// timezone on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventDraft {
    pub title: String,
    pub start: NaiveDateTime,
    pub duration_minutes: u32,
    pub description: Option<String>,
    pub location: Option<String>,
}

/// How existing events are located for confirm/reschedule/cancel: exact
/// title, optionally narrowed by the local start instant. Lookups derived
/// from thread history only know the title.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventKey {
    pub title: String,
    pub start: Option<NaiveDateTime>,
}

impl EventKey {
    pub fn titled(title: impl Into<String>) -> Self {
        Self { title: title.into(), start: None }
    }

    pub fn at(title: impl Into<String>, start: NaiveDateTime) -> Self {
        Self { title: title.into(), start: Some(start) }
    }
}

/// Calendar operations the scheduling flows need. The lookup methods return
/// `Ok(false)` when no event matches the key.
#[async_trait]
pub trait CalendarClient: Send + Sync {
    /// Events within the tenant's business-hours window on `date`, for the
    /// availability bitmap.
    async fn list_events(
        &self,
        calendar: &str,
        date: NaiveDate,
    ) -> Result<Vec<CalendarEvent>, GatewayError>;

    async fn create_event(&self, calendar: &str, draft: &EventDraft)
        -> Result<(), GatewayError>;

    /// Retitles the matching event with [`CONFIRMED_PREFIX`].
    async fn confirm_event(&self, calendar: &str, key: &EventKey) -> Result<bool, GatewayError>;

    /// Retitles with [`RESCHEDULED_PREFIX`] and moves the event to
    /// `new_start`.
    async fn reschedule_event(
        &self,
        calendar: &str,
        key: &EventKey,
        new_start: NaiveDateTime,
        duration_minutes: u32,
    ) -> Result<bool, GatewayError>;

    /// Deletes the event or retitles it with [`CANCELLED_PREFIX`], per the
    /// tenant's cancel policy.
    async fn cancel_event(
        &self,
        calendar: &str,
        key: &EventKey,
        policy: CancelPolicy,
    ) -> Result<bool, GatewayError>;
}

/// Prepends `prefix` to a title, replacing any lifecycle prefix already
/// there so a rescheduled-then-cancelled event reads `CANCELADO - Consulta`,
/// not `CANCELADO - REAGENDADO - Consulta`.
pub fn retitle(prefix: &str, title: &str) -> String {
    let mut base = title;
    loop {
        let stripped = [CONFIRMED_PREFIX, RESCHEDULED_PREFIX, CANCELLED_PREFIX]
            .iter()
            .find_map(|known| base.strip_prefix(known));
        match stripped {
            Some(rest) => base = rest,
            None => break,
        }
    }
    format!("{prefix}{base}")
}

#[cfg(test)]
mod tests {
    use super::{retitle, CANCELLED_PREFIX, CONFIRMED_PREFIX, RESCHEDULED_PREFIX};

    #[test]
    fn retitle_prepends_the_lifecycle_prefix() {
        assert_eq!(retitle(CONFIRMED_PREFIX, "Consulta - Ana"), "CONFIRMADO - Consulta - Ana");
    }

    #[test]
    fn retitle_replaces_an_existing_prefix_instead_of_stacking() {
        assert_eq!(
            retitle(CANCELLED_PREFIX, "REAGENDADO - Consulta - Ana"),
            "CANCELADO - Consulta - Ana"
        );
        assert_eq!(
            retitle(RESCHEDULED_PREFIX, "CONFIRMADO - REAGENDADO - Consulta"),
            "REAGENDADO - Consulta"
        );
    }
}
