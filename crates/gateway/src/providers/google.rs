//! Google Calendar adapter over the v3 REST surface, bearer-token
//! authenticated like the Outlook client. Existing events are located with
//! the free-text `q` filter, matching on the exact title.

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

const PROVIDER: &str = "google";

pub struct GoogleCalendarClient {
    http: Client,
    base_url: String,
    token: String,
    timezone: Tz,
    day_start: NaiveTime,
    day_end: NaiveTime,
}

impl GoogleCalendarClient {
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

    fn events_url(&self, calendar: &str) -> String {
        format!("{}/calendars/{calendar}/events", self.base_url)
    }

    fn to_utc(&self, local: NaiveDateTime) -> Result<DateTime<Utc>, GatewayError> {
        self.timezone.from_local_datetime(&local).earliest().map(|dt| dt.with_timezone(&Utc)).ok_or(
            GatewayError::UnexpectedPayload {
                provider: PROVIDER,
                reason: format!("local time {local} does not exist in {}", self.timezone.name()),
            },
        )
    }

    fn date_time_body(&self, local: NaiveDateTime) -> Result<Value, GatewayError> {
        let instant = self.to_utc(local)?;
        Ok(json!({ "dateTime": instant.to_rfc3339(), "timeZone": self.timezone.name() }))
    }

    async fn get_json(
        &self,
        operation: &'static str,
        url: String,
        query: &[(&str, &str)],
    ) -> Result<Value, GatewayError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(|e| GatewayError::request(PROVIDER, operation, e))?;
        ensure_success(PROVIDER, operation, response)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::request(PROVIDER, operation, e))
    }

    /// Finds the event whose summary and local start match `key`.
    async fn find_event(
        &self,
        calendar: &str,
        key: &EventKey,
    ) -> Result<Option<Value>, GatewayError> {
        let wanted_start = key.start.map(|start| self.to_utc(start)).transpose()?;
        let body = self
            .get_json(
                "find_event",
                self.events_url(calendar),
                &[("q", key.title.as_str()), ("singleEvents", "true")],
            )
            .await?;

        let Some(items) = body.get("items").and_then(Value::as_array) else {
            return Ok(None);
        };
        for item in items {
            let summary = item.get("summary").and_then(Value::as_str).unwrap_or_default();
            if summary != key.title {
                continue;
            }
            match wanted_start {
                None => return Ok(Some(item.clone())),
                Some(wanted) => match item.get("start").map(|s| self.event_instant("start", s)) {
                    Some(Ok(start)) if start == wanted => return Ok(Some(item.clone())),
                    _ => continue,
                },
            }
        }
        Ok(None)
    }

    fn event_instant(&self, field: &str, value: &Value) -> Result<DateTime<Utc>, GatewayError> {
        let raw = value.get("dateTime").and_then(Value::as_str).ok_or_else(|| {
            GatewayError::UnexpectedPayload {
                provider: PROVIDER,
                reason: format!("event without `{field}.dateTime`"),
            }
        })?;
        DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)).map_err(|e| {
            GatewayError::UnexpectedPayload {
                provider: PROVIDER,
                reason: format!("bad event time `{raw}`: {e}"),
            }
        })
    }

    fn event_from_item(&self, item: &Value) -> Result<CalendarEvent, GatewayError> {
        let start = item.get("start").map(|v| self.event_instant("start", v)).transpose()?;
        let end = item.get("end").map(|v| self.event_instant("end", v)).transpose()?;
        let (Some(start), Some(end)) = (start, end) else {
            return Err(GatewayError::UnexpectedPayload {
                provider: PROVIDER,
                reason: "event without start/end".to_string(),
            });
        };
        Ok(CalendarEvent {
            id: item.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
            title: item.get("summary").and_then(Value::as_str).unwrap_or_default().to_string(),
            start,
            end,
            location: item
                .get("location")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
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
            .patch(format!("{}/{event_id}", self.events_url(calendar)))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::request(PROVIDER, operation, e))?;
        ensure_success(PROVIDER, operation, response).await?;
        Ok(())
    }
}

fn item_id(item: &Value) -> Result<&str, GatewayError> {
    item.get("id").and_then(Value::as_str).ok_or(GatewayError::UnexpectedPayload {
        provider: PROVIDER,
        reason: "event without id".to_string(),
    })
}

#[async_trait]
impl CalendarClient for GoogleCalendarClient {
    async fn list_events(
        &self,
        calendar: &str,
        date: NaiveDate,
    ) -> Result<Vec<CalendarEvent>, GatewayError> {
        let time_min = self.to_utc(date.and_time(self.day_start))?.to_rfc3339();
        let time_max = self.to_utc(date.and_time(self.day_end))?.to_rfc3339();
        let body = self
            .get_json(
                "list_events",
                self.events_url(calendar),
                &[
                    ("timeMin", time_min.as_str()),
                    ("timeMax", time_max.as_str()),
                    ("singleEvents", "true"),
                ],
            )
            .await?;

        let mut events = Vec::new();
        for item in body.get("items").and_then(Value::as_array).into_iter().flatten() {
            // All-day entries carry `date` instead of `dateTime`; they do not
            // occupy bookable slots.
            if item.get("start").and_then(|s| s.get("dateTime")).is_none() {
                continue;
            }
            events.push(self.event_from_item(item)?);
        }
        Ok(events)
    }

    async fn create_event(
        &self,
        calendar: &str,
        draft: &EventDraft,
    ) -> Result<(), GatewayError> {
        let end = draft.start + chrono::Duration::minutes(i64::from(draft.duration_minutes));
        let mut body = json!({
            "summary": draft.title,
            "start": self.date_time_body(draft.start)?,
            "end": self.date_time_body(end)?,
        });
        if let Some(description) = &draft.description {
            body["description"] = json!(description);
        }
        if let Some(location) = &draft.location {
            body["location"] = json!(location);
        }

        let response = self
            .http
            .post(self.events_url(calendar))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::request(PROVIDER, "create_event", e))?;
        ensure_success(PROVIDER, "create_event", response).await?;
        Ok(())
    }

    async fn confirm_event(&self, calendar: &str, key: &EventKey) -> Result<bool, GatewayError> {
        let Some(item) = self.find_event(calendar, key).await? else {
            return Ok(false);
        };
        let body = json!({ "summary": retitle(CONFIRMED_PREFIX, &key.title) });
        self.patch_event("confirm_event", calendar, item_id(&item)?, &body).await?;
        Ok(true)
    }

    async fn reschedule_event(
        &self,
        calendar: &str,
        key: &EventKey,
        new_start: NaiveDateTime,
        duration_minutes: u32,
    ) -> Result<bool, GatewayError> {
        let Some(item) = self.find_event(calendar, key).await? else {
            return Ok(false);
        };
        let new_end = new_start + chrono::Duration::minutes(i64::from(duration_minutes));
        let body = json!({
            "summary": retitle(RESCHEDULED_PREFIX, &key.title),
            "start": self.date_time_body(new_start)?,
            "end": self.date_time_body(new_end)?,
        });
        self.patch_event("reschedule_event", calendar, item_id(&item)?, &body).await?;
        Ok(true)
    }

    async fn cancel_event(
        &self,
        calendar: &str,
        key: &EventKey,
        policy: CancelPolicy,
    ) -> Result<bool, GatewayError> {
        let Some(item) = self.find_event(calendar, key).await? else {
            return Ok(false);
        };
        let event_id = item_id(&item)?;
        match policy {
            CancelPolicy::Delete => {
                let response = self
                    .http
                    .delete(format!("{}/{event_id}", self.events_url(calendar)))
                    .bearer_auth(&self.token)
                    .send()
                    .await
                    .map_err(|e| GatewayError::request(PROVIDER, "cancel_event", e))?;
                ensure_success(PROVIDER, "cancel_event", response).await?;
            }
            CancelPolicy::Keep => {
                let body = json!({ "summary": retitle(CANCELLED_PREFIX, &key.title) });
                self.patch_event("cancel_event", calendar, event_id, &body).await?;
            }
        }
        Ok(true)
    }
}
