//! Outlook calendar adapter over the Microsoft Graph REST surface. The
//! tenant's `calendar_api_key` is a ready bearer token; minting it (client
//! credentials, refresh) happens outside this process.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use serde_json::{json, Value};

use frontdesk_core::availability::CalendarEvent;
use frontdesk_core::domain::tenant::{CancelPolicy, Tenant};

use super::{ensure_success, require};
use crate::calendar::{
    retitle, CalendarClient, EventDraft, EventKey, CANCELLED_PREFIX, CONFIRMED_PREFIX,
    RESCHEDULED_PREFIX,
};
use crate::GatewayError;

const PROVIDER: &str = "outlook";
const LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub struct OutlookClient {
    http: Client,
    base_url: String,
    token: String,
    timezone: Tz,
    day_start: NaiveTime,
    day_end: NaiveTime,
}

impl OutlookClient {
    pub fn from_tenant(tenant: &Tenant) -> Result<Self, GatewayError> {
        let creds = &tenant.credentials;
        Ok(Self {
            http: Client::new(),
            base_url: require(&creds.calendar_base_url, "calendar_base_url")?
                .trim_end_matches('/')
                .to_string(),
            token: require(&creds.calendar_api_key, "calendar_api_key")?.to_string(),
            timezone: tenant.timezone,
            day_start: tenant.business_hours_start,
            day_end: tenant.business_hours_end,
        })
    }

    fn timezone_preference(&self) -> String {
        format!("outlook.timezone=\"{}\"", self.timezone.name())
    }

    fn to_utc(&self, local: NaiveDateTime) -> Result<DateTime<Utc>, GatewayError> {
        self.timezone.from_local_datetime(&local).earliest().map(|dt| dt.with_timezone(&Utc)).ok_or(
            GatewayError::UnexpectedPayload {
                provider: PROVIDER,
                reason: format!("local time {local} does not exist in {}", self.timezone.name()),
            },
        )
    }

    fn time_zone_body(&self, local: NaiveDateTime) -> Value {
        json!({ "dateTime": local.format(LOCAL_FORMAT).to_string(), "timeZone": self.timezone.name() })
    }

    async fn find_event_id(
        &self,
        calendar: &str,
        key: &EventKey,
    ) -> Result<Option<String>, GatewayError> {
        let subject = key.title.replace('\'', "''");
        let filter = match key.start {
            Some(start) => format!(
                "start/dateTime eq '{}' and subject eq '{subject}'",
                start.format(LOCAL_FORMAT),
            ),
            None => format!("subject eq '{subject}'"),
        };
        let response = self
            .http
            .get(format!("{}/users/{calendar}/events", self.base_url))
            .bearer_auth(&self.token)
            .header("Prefer", self.timezone_preference())
            .query(&[("$filter", filter.as_str()), ("$select", "id,subject,start,end")])
            .send()
            .await
            .map_err(|e| GatewayError::request(PROVIDER, "find_event", e))?;
        let body: Value = ensure_success(PROVIDER, "find_event", response)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::request(PROVIDER, "find_event", e))?;

        Ok(body
            .get("value")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(|item| item.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn patch_event(
        &self,
        operation: &'static str,
        calendar: &str,
        event_id: &str,
        body: &Value,
    ) -> Result<(), GatewayError> {
        let response = self
            .http
            .patch(format!("{}/users/{calendar}/events/{event_id}", self.base_url))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::request(PROVIDER, operation, e))?;
        ensure_success(PROVIDER, operation, response).await?;
        Ok(())
    }

    fn event_from_item(&self, item: &Value) -> Result<CalendarEvent, GatewayError> {
        let local = |field: &str| -> Result<DateTime<Utc>, GatewayError> {
            let raw = item
                .get(field)
                .and_then(|v| v.get("dateTime"))
                .and_then(Value::as_str)
                .ok_or_else(|| GatewayError::UnexpectedPayload {
                    provider: PROVIDER,
                    reason: format!("event without `{field}.dateTime`"),
                })?;
            // Graph emits 7-digit fractional seconds in the preferred zone.
            let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map_err(
                |e| GatewayError::UnexpectedPayload {
                    provider: PROVIDER,
                    reason: format!("bad event time `{raw}`: {e}"),
                },
            )?;
            self.to_utc(naive)
        };

        Ok(CalendarEvent {
            id: item.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
            title: item.get("subject").and_then(Value::as_str).unwrap_or_default().to_string(),
            start: local("start")?,
            end: local("end")?,
            location: item
                .get("location")
                .and_then(|l| l.get("displayName"))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
    }
}

#[async_trait]
impl CalendarClient for OutlookClient {
    async fn list_events(
        &self,
        calendar: &str,
        date: NaiveDate,
    ) -> Result<Vec<CalendarEvent>, GatewayError> {
        let window_start = date.and_time(self.day_start).format(LOCAL_FORMAT).to_string();
        let window_end = date.and_time(self.day_end).format(LOCAL_FORMAT).to_string();
        let response = self
            .http
            .get(format!("{}/users/{calendar}/calendarView", self.base_url))
            .bearer_auth(&self.token)
            .header("Prefer", self.timezone_preference())
            .query(&[
                ("startDateTime", window_start.as_str()),
                ("endDateTime", window_end.as_str()),
                ("$select", "id,subject,start,end,location"),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::request(PROVIDER, "list_events", e))?;
        let body: Value = ensure_success(PROVIDER, "list_events", response)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::request(PROVIDER, "list_events", e))?;

        body.get("value")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(|item| self.event_from_item(item)).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn create_event(
        &self,
        calendar: &str,
        draft: &EventDraft,
    ) -> Result<(), GatewayError> {
        let end = draft.start + chrono::Duration::minutes(i64::from(draft.duration_minutes));
        let mut body = json!({
            "subject": draft.title,
            "start": self.time_zone_body(draft.start),
            "end": self.time_zone_body(end),
        });
        if let Some(description) = &draft.description {
            body["body"] = json!({ "contentType": "HTML", "content": description });
        }
        if let Some(location) = &draft.location {
            body["location"] = json!({ "displayName": location });
        }

        let response = self
            .http
            .post(format!("{}/users/{calendar}/events", self.base_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::request(PROVIDER, "create_event", e))?;
        ensure_success(PROVIDER, "create_event", response).await?;
        Ok(())
    }

    async fn confirm_event(&self, calendar: &str, key: &EventKey) -> Result<bool, GatewayError> {
        let Some(event_id) = self.find_event_id(calendar, key).await? else {
            return Ok(false);
        };
        let body = json!({ "subject": retitle(CONFIRMED_PREFIX, &key.title) });
        self.patch_event("confirm_event", calendar, &event_id, &body).await?;
        Ok(true)
    }

    async fn reschedule_event(
        &self,
        calendar: &str,
        key: &EventKey,
        new_start: NaiveDateTime,
        duration_minutes: u32,
    ) -> Result<bool, GatewayError> {
        let Some(event_id) = self.find_event_id(calendar, key).await? else {
            return Ok(false);
        };
        let new_end = new_start + chrono::Duration::minutes(i64::from(duration_minutes));
        let body = json!({
            "subject": retitle(RESCHEDULED_PREFIX, &key.title),
            "start": self.time_zone_body(new_start),
            "end": self.time_zone_body(new_end),
        });
        self.patch_event("reschedule_event", calendar, &event_id, &body).await?;
        Ok(true)
    }

    async fn cancel_event(
        &self,
        calendar: &str,
        key: &EventKey,
        policy: CancelPolicy,
    ) -> Result<bool, GatewayError> {
        let Some(event_id) = self.find_event_id(calendar, key).await? else {
            return Ok(false);
        };
        match policy {
            CancelPolicy::Delete => {
                let response = self
                    .http
                    .delete(format!("{}/users/{calendar}/events/{event_id}", self.base_url))
                    .bearer_auth(&self.token)
                    .send()
                    .await
                    .map_err(|e| GatewayError::request(PROVIDER, "cancel_event", e))?;
                ensure_success(PROVIDER, "cancel_event", response).await?;
            }
            CancelPolicy::Keep => {
                // Cancelled-but-kept events free the slot in availability views.
                let body = json!({
                    "subject": retitle(CANCELLED_PREFIX, &key.title),
                    "showAs": "free",
                });
                self.patch_event("cancel_event", calendar, &event_id, &body).await?;
            }
        }
        Ok(true)
    }
}
