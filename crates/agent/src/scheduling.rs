//! Calendar flows behind the `AG*` activity codes: suggested-date check with
//! availability feedback, booking, and the lookup-based reschedule, cancel,
//! and confirm operations.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use tracing::{debug, warn};

use frontdesk_core::availability::{availability_bitmap, fully_booked, BusinessHours};
use frontdesk_core::domain::assistant::{Assistant, AssistantPurpose};
use frontdesk_core::domain::contact::Contact;
use frontdesk_core::domain::directory::Agenda;
use frontdesk_core::domain::tenant::Tenant;
use frontdesk_core::wire::{BookingReply, EventLookupReply, RescheduleReply, SuggestedDateReply};
use frontdesk_core::{ApplicationError, DomainError, ReferenceKind};
use frontdesk_db::{ContactRepository, DirectoryRepository};
use frontdesk_gateway::calendar::{CalendarClient, EventDraft, EventKey};
use frontdesk_gateway::crm::CrmClient;

use crate::driver::{ConversationDriver, DriveOutcome, DriveRequest};
use crate::instructions;
use crate::{gateway_failure, persistence_failure};

const CHOSEN_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const SUGGESTED_DATE_FORMAT: &str = "%Y-%m-%d";
const WINDOW_FORMAT: &str = "%H:%M";

pub struct SchedulingFlow {
    directory: Arc<dyn DirectoryRepository>,
    contacts: Arc<dyn ContactRepository>,
    driver: Arc<ConversationDriver>,
}

impl SchedulingFlow {
    pub fn new(
        directory: Arc<dyn DirectoryRepository>,
        contacts: Arc<dyn ContactRepository>,
        driver: Arc<ConversationDriver>,
    ) -> Self {
        Self { directory, contacts, driver }
    }

    async fn schedule_assistant(&self, tenant: &Tenant) -> Result<Assistant, ApplicationError> {
        self.directory
            .find_assistant_by_purpose(&tenant.id, AssistantPurpose::Schedule)
            .await
            .map_err(persistence_failure)?
            .ok_or_else(|| {
                DomainError::UnresolvedReference {
                    kind: ReferenceKind::Assistant,
                    shortcut: AssistantPurpose::Schedule.as_str().to_string(),
                }
                .into()
            })
    }

    async fn resolve_agenda(
        &self,
        tenant: &Tenant,
        shortcut: Option<&str>,
    ) -> Result<Agenda, ApplicationError> {
        let shortcut = shortcut.unwrap_or_default();
        self.directory
            .find_agenda_by_shortcut(&tenant.id, shortcut)
            .await
            .map_err(persistence_failure)?
            .ok_or_else(|| {
                DomainError::UnresolvedReference {
                    kind: ReferenceKind::Agenda,
                    shortcut: shortcut.to_string(),
                }
                .into()
            })
    }

    /// Drives on the contact's thread, persisting the thread id when the
    /// turn had to create one.
    async fn drive_on_thread<T: serde::de::DeserializeOwned>(
        &self,
        tenant: &Tenant,
        contact: &Contact,
        assistant: &Assistant,
        message: String,
    ) -> Result<DriveOutcome<T>, ApplicationError> {
        let tools = crate::tools::tenant_registry(
            tenant.timezone,
            self.directory.clone(),
            tenant.id.clone(),
        );
        let outcome = self
            .driver
            .drive::<T>(
                assistant,
                DriveRequest::on_thread(contact.thread_id.as_deref()).with_message(message),
                &tools,
            )
            .await?;
        if outcome.created_thread {
            self.contacts
                .set_thread(&contact.id, &outcome.thread_id, Utc::now())
                .await
                .map_err(persistence_failure)?;
        }
        Ok(outcome)
    }

    /// The `AG` flow. Returns the message to deliver, or `None` when the
    /// assistant produced nothing usable.
    pub async fn suggest_availability(
        &self,
        tenant: &Tenant,
        contact: &Contact,
        agenda_shortcut: Option<&str>,
        calendar: &dyn CalendarClient,
    ) -> Result<Option<String>, ApplicationError> {
        let agenda = self.resolve_agenda(tenant, agenda_shortcut).await?;
        let assistant = self.schedule_assistant(tenant).await?;
        let now = Utc::now().with_timezone(&tenant.timezone);

        let check = instructions::check_suggested_date(now).to_wire();
        let outcome: DriveOutcome<SuggestedDateReply> =
            self.drive_on_thread(tenant, contact, &assistant, check).await?;
        let reply = outcome.reply;

        if !reply.has_valid_date() {
            return Ok(Some(reply.mensagem));
        }

        let date = NaiveDate::parse_from_str(&reply.data_sugerida, SUGGESTED_DATE_FORMAT)
            .map_err(|e| {
                ApplicationError::from(DomainError::MalformedPayload(format!(
                    "suggested date `{}`: {e}",
                    reply.data_sugerida
                )))
            })?;

        let events =
            calendar.list_events(&agenda.address, date).await.map_err(gateway_failure)?;
        let hours = BusinessHours {
            start: tenant.business_hours_start,
            end: tenant.business_hours_end,
            slot_minutes: tenant.slot_minutes,
        };
        let bitmap = availability_bitmap(&events, &hours, date, tenant.timezone);

        let feedback = if fully_booked(&bitmap) {
            let first_title = events.first().map(|e| e.title.as_str()).unwrap_or_default();
            instructions::agenda_closed(&bitmap, first_title)
        } else {
            instructions::agenda_open(
                &reply.data_sugerida,
                &bitmap,
                &tenant.business_hours_start.format(WINDOW_FORMAT).to_string(),
                &tenant.business_hours_end.format(WINDOW_FORMAT).to_string(),
                tenant.slot_minutes,
            )
        };
        debug!(
            event_name = "availability_computed",
            tenant = %tenant.slug,
            agenda = %agenda.shortcut,
            date = %date,
            bitmap = %bitmap,
            "feeding availability back"
        );

        let outcome: DriveOutcome<SuggestedDateReply> =
            self.drive_on_thread(tenant, contact, &assistant, feedback.to_wire()).await?;
        Ok(Some(outcome.reply.mensagem))
    }

    /// The `AG-OK` flow: extract the chosen slot, create the event, move the
    /// CRM deal to the booked stage.
    pub async fn book(
        &self,
        tenant: &Tenant,
        contact: &Contact,
        agenda_shortcut: Option<&str>,
        calendar: &dyn CalendarClient,
        crm: Option<&dyn CrmClient>,
    ) -> Result<Option<String>, ApplicationError> {
        let agenda = self.resolve_agenda(tenant, agenda_shortcut).await?;
        let assistant = self.schedule_assistant(tenant).await?;
        let now = Utc::now().with_timezone(&tenant.timezone);

        let extract = instructions::extract_chosen_datetime(now).to_wire();
        let outcome: DriveOutcome<BookingReply> =
            self.drive_on_thread(tenant, contact, &assistant, extract).await?;
        let reply = outcome.reply;

        if !reply.has_valid_date() {
            return Ok(Some(reply.mensagem));
        }

        let start = parse_chosen_datetime(&reply.data_hora_agendamento)?;
        let draft = EventDraft {
            title: reply.titulo_evento.clone(),
            start,
            duration_minutes: tenant.slot_minutes,
            description: None,
            location: None,
        };
        calendar.create_event(&agenda.address, &draft).await.map_err(gateway_failure)?;

        self.move_stage(tenant, contact, crm, tenant.crm_stages.booked.as_deref()).await;
        Ok(Some(reply.mensagem))
    }

    /// The `AG-RE` lookup + reschedule. The user-facing text comes from the
    /// routed Response, not from here.
    pub async fn reschedule(
        &self,
        tenant: &Tenant,
        contact: &Contact,
        calendar: &dyn CalendarClient,
        crm: Option<&dyn CrmClient>,
    ) -> Result<(), ApplicationError> {
        let assistant = self.schedule_assistant(tenant).await?;
        let lookup = instructions::lookup_reschedule().to_wire();
        let outcome: DriveOutcome<RescheduleReply> =
            self.drive_on_thread(tenant, contact, &assistant, lookup).await?;
        let reply = outcome.reply;

        let new_start = parse_chosen_datetime(&reply.data_nova)?;
        let moved = calendar
            .reschedule_event(
                &reply.endereco_agenda,
                &EventKey::titled(&reply.titulo),
                new_start,
                tenant.slot_minutes,
            )
            .await
            .map_err(gateway_failure)?;
        if !moved {
            warn!(
                event_name = "calendar_event_not_found",
                tenant = %tenant.slug,
                title = %reply.titulo,
                "reschedule target missing"
            );
        }

        self.move_stage(tenant, contact, crm, tenant.crm_stages.rescheduled.as_deref()).await;
        Ok(())
    }

    /// The `AG-CN` lookup + cancel, honoring the tenant's cancel policy.
    pub async fn cancel(
        &self,
        tenant: &Tenant,
        contact: &Contact,
        calendar: &dyn CalendarClient,
        crm: Option<&dyn CrmClient>,
    ) -> Result<(), ApplicationError> {
        let reply = self.lookup_event(tenant, contact).await?;
        let cancelled = calendar
            .cancel_event(
                &reply.endereco_agenda,
                &EventKey::titled(&reply.titulo),
                tenant.cancel_policy,
            )
            .await
            .map_err(gateway_failure)?;
        if !cancelled {
            warn!(
                event_name = "calendar_event_not_found",
                tenant = %tenant.slug,
                title = %reply.titulo,
                "cancel target missing"
            );
        }

        self.move_stage(tenant, contact, crm, tenant.crm_stages.cancelled.as_deref()).await;
        Ok(())
    }

    /// The `AG-CF` lookup + confirm retitle.
    pub async fn confirm(
        &self,
        tenant: &Tenant,
        contact: &Contact,
        calendar: &dyn CalendarClient,
        crm: Option<&dyn CrmClient>,
    ) -> Result<(), ApplicationError> {
        let reply = self.lookup_event(tenant, contact).await?;
        let confirmed = calendar
            .confirm_event(&reply.endereco_agenda, &EventKey::titled(&reply.titulo))
            .await
            .map_err(gateway_failure)?;
        if !confirmed {
            warn!(
                event_name = "calendar_event_not_found",
                tenant = %tenant.slug,
                title = %reply.titulo,
                "confirm target missing"
            );
        }

        self.move_stage(tenant, contact, crm, tenant.crm_stages.confirmed.as_deref()).await;
        Ok(())
    }

    async fn lookup_event(
        &self,
        tenant: &Tenant,
        contact: &Contact,
    ) -> Result<EventLookupReply, ApplicationError> {
        let assistant = self.schedule_assistant(tenant).await?;
        let lookup = instructions::lookup_booked_event().to_wire();
        let outcome: DriveOutcome<EventLookupReply> =
            self.drive_on_thread(tenant, contact, &assistant, lookup).await?;
        Ok(outcome.reply)
    }

    /// CRM moves after a successful calendar operation never roll it back;
    /// failure is logged and the flow continues.
    async fn move_stage(
        &self,
        tenant: &Tenant,
        contact: &Contact,
        crm: Option<&dyn CrmClient>,
        stage_id: Option<&str>,
    ) {
        let (Some(crm), Some(deal_id), Some(stage_id)) =
            (crm, contact.crm_deal_id.as_deref(), stage_id)
        else {
            return;
        };
        if let Err(error) = crm.move_deal_stage(deal_id, stage_id).await {
            warn!(
                event_name = "crm_stage_move_failed",
                tenant = %tenant.slug,
                deal_id,
                stage_id,
                error = %error,
                "keeping the calendar change"
            );
        }
    }
}

fn parse_chosen_datetime(raw: &str) -> Result<NaiveDateTime, ApplicationError> {
    NaiveDateTime::parse_from_str(raw, CHOSEN_DATETIME_FORMAT).map_err(|e| {
        ApplicationError::from(DomainError::MalformedPayload(format!(
            "chosen datetime `{raw}`: {e}"
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::parse_chosen_datetime;

    #[test]
    fn chosen_datetimes_use_the_extraction_format() {
        let parsed = parse_chosen_datetime("2025-03-06T09:30:00").expect("parse");
        assert_eq!(parsed.to_string(), "2025-03-06 09:30:00");
        assert!(parse_chosen_datetime("06/03/2025 09:30").is_err());
    }
}
