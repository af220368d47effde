//! Calendar tool implementations.
//!
//! Each tool validates its parameters first, then asks the session for a
//! client, then makes one calendar call. A 401 earns one retry with
//! refreshed credentials. Results are JSON values; failures
//! become a [`ToolError`] whose payload is `{"error": "..."}`.

use std::future::Future;
use std::sync::Arc;

use gcal_mcp_auth::AuthError;
use gcal_mcp_calendar::{
    CalendarApiError, CalendarClient, CalendarResult, EventPatch, EventQuery, EventTime, FreeBusyRequest, NewEvent,
    color_id, parse_attendees, parse_reminders,
};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use crate::params::{
    CreateEventParams, EventRefParams, FreeBusyParams, GetCalendarParams, ListEventsParams,
    SearchEventsParams, UpdateEventParams,
};
use crate::session::CalendarSession;

/// Accepted `order_by` values.
pub const ORDER_BY_VALUES: [&str; 2] = ["startTime", "updated"];

/// Upper bound Google places on `maxResults`.
pub const MAX_RESULTS_LIMIT: i64 = 2500;

pub type ToolResult = Result<Value, ToolError>;

/// A tool call that did not produce a result.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Rejected before any credential or network work.
    #[error("{0}")]
    Invalid(String),

    #[error("authentication required: {0}")]
    Auth(#[from] AuthError),

    /// Only the status reaches the caller; the full error is logged.
    #[error("{}", .0.client_message())]
    Api(CalendarApiError),
}

impl ToolError {
    fn empty(name: &str) -> Self {
        Self::Invalid(format!("{} must not be empty", name))
    }

    /// `{"error": "<message>"}`
    pub fn payload(&self) -> Value {
        json!({ "error": self.to_string() })
    }
}

fn api_error(action: &str) -> impl FnOnce(CalendarApiError) -> ToolError + '_ {
    move |e| {
        warn!("{} failed: {}", action, e);
        ToolError::Api(e)
    }
}

fn auth_error(e: AuthError) -> ToolError {
    warn!("no usable credentials for tool call: {}", e);
    ToolError::Auth(e)
}

/// Trimmed value, or `None` when absent or blank.
fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn require<'a>(name: &str, value: &'a str) -> Result<&'a str, ToolError> {
    present(Some(value)).ok_or_else(|| ToolError::empty(name))
}

fn clamp_max_results(value: i64) -> u32 {
    // lossless: the clamped range fits in u32
    value.clamp(1, MAX_RESULTS_LIMIT) as u32
}

pub struct CalendarTools {
    session: Arc<CalendarSession>,
    default_calendar_id: String,
}

impl CalendarTools {
    pub fn new(session: Arc<CalendarSession>, default_calendar_id: impl Into<String>) -> Self {
        Self {
            session,
            default_calendar_id: default_calendar_id.into(),
        }
    }

    fn calendar_id(&self, value: Option<&str>) -> String {
        present(value)
            .unwrap_or(self.default_calendar_id.as_str())
            .to_string()
    }

    /// Runs `op` with a session client, retrying once with fresh credentials
    /// when the API rejects the access token.
    async fn call<T, F, Fut>(&self, action: &str, op: F) -> Result<T, ToolError>
    where
        F: Fn(CalendarClient) -> Fut,
        Fut: Future<Output = CalendarResult<T>>,
    {
        let client = self.session.client().await.map_err(auth_error)?;
        match op(client.clone()).await {
            Err(e) if e.is_unauthorized() => {
                debug!("{} got 401, retrying with refreshed credentials", action);
                let client = self.session.reauthorize(&client).await.map_err(auth_error)?;
                op(client).await.map_err(api_error(action))
            }
            result => result.map_err(api_error(action)),
        }
    }

    pub async fn list_events(&self, params: ListEventsParams) -> ToolResult {
        let order_by = params.order_by.trim();
        if !ORDER_BY_VALUES.contains(&order_by) {
            return Err(ToolError::Invalid(format!(
                "order_by must be one of: {}",
                ORDER_BY_VALUES.join(", ")
            )));
        }
        let calendar_id = self.calendar_id(params.calendar_id.as_deref());
        let query = EventQuery {
            time_min: present(params.time_min.as_deref()).map(String::from),
            time_max: present(params.time_max.as_deref()).map(String::from),
            max_results: clamp_max_results(params.max_results),
            order_by: Some(order_by.to_string()),
            ..EventQuery::default()
        };

        let (calendar_id, query) = (&calendar_id, &query);
        let events = self
            .call("list_events", |client| async move {
                client.list_events(calendar_id, query).await
            })
            .await?;
        Ok(json!({ "count": events.len(), "events": events }))
    }

    pub async fn search_events(&self, params: SearchEventsParams) -> ToolResult {
        let text = require("query", &params.query)?.to_string();
        let calendar_id = self.calendar_id(params.calendar_id.as_deref());
        let query = EventQuery {
            time_min: present(params.time_min.as_deref()).map(String::from),
            time_max: present(params.time_max.as_deref()).map(String::from),
            max_results: clamp_max_results(params.max_results),
            order_by: Some("startTime".to_string()),
            text: Some(text),
            ..EventQuery::default()
        };

        let (calendar_id, query) = (&calendar_id, &query);
        let events = self
            .call("search_events", |client| async move {
                client.list_events(calendar_id, query).await
            })
            .await?;
        Ok(json!({ "count": events.len(), "events": events }))
    }

    pub async fn get_event(&self, params: EventRefParams) -> ToolResult {
        let event_id = require("event_id", &params.event_id)?;
        let calendar_id = &self.calendar_id(params.calendar_id.as_deref());

        self.call("get_event", |client| async move {
            client.get_event(calendar_id, event_id).await
        })
        .await
    }

    pub async fn create_event(&self, params: CreateEventParams) -> ToolResult {
        let summary = require("summary", &params.summary)?;
        let (Some(start), Some(end)) = (
            present(Some(params.start.as_str())),
            present(Some(params.end.as_str())),
        ) else {
            return Err(ToolError::Invalid("start and end must not be empty".to_string()));
        };

        let event = NewEvent {
            summary: summary.to_string(),
            start: EventTime::new(start, params.all_day),
            end: EventTime::new(end, params.all_day),
            description: present(params.description.as_deref()).map(String::from),
            location: present(params.location.as_deref()).map(String::from),
            attendees: params
                .attendees
                .as_deref()
                .map(parse_attendees)
                .unwrap_or_default(),
            color_id: present(params.color_id.as_deref()).and_then(color_id),
            reminders: present(params.reminders.as_deref()).and_then(parse_reminders),
        };
        let (calendar_id, event) = (&self.calendar_id(params.calendar_id.as_deref()), &event);

        self.call("create_event", |client| async move {
            client.insert_event(calendar_id, event).await
        })
        .await
    }

    pub async fn update_event(&self, params: UpdateEventParams) -> ToolResult {
        let event_id = require("event_id", &params.event_id)?;
        let patch = EventPatch {
            summary: present(params.summary.as_deref()).map(String::from),
            start: present(params.start.as_deref()).map(EventTime::infer),
            end: present(params.end.as_deref()).map(EventTime::infer),
            description: present(params.description.as_deref()).map(String::from),
            location: present(params.location.as_deref()).map(String::from),
            attendees: present(params.attendees.as_deref()).map(parse_attendees),
            color_id: present(params.color_id.as_deref()).and_then(color_id),
            reminders: present(params.reminders.as_deref()).and_then(parse_reminders),
        };
        if patch.is_empty() {
            debug!(event_id, "update_event called without changes");
        }
        let (calendar_id, patch) = (&self.calendar_id(params.calendar_id.as_deref()), &patch);

        self.call("update_event", |client| async move {
            client.patch_event(calendar_id, event_id, patch).await
        })
        .await
    }

    pub async fn delete_event(&self, params: EventRefParams) -> ToolResult {
        let event_id = require("event_id", &params.event_id)?;
        let calendar_id = &self.calendar_id(params.calendar_id.as_deref());

        self.call("delete_event", |client| async move {
            client.delete_event(calendar_id, event_id).await
        })
        .await?;
        Ok(json!({ "deleted": true, "event_id": event_id }))
    }

    pub async fn list_calendars(&self) -> ToolResult {
        let calendars = self
            .call("list_calendars", |client| async move { client.list_calendars().await })
            .await?;
        Ok(json!({ "calendars": calendars, "count": calendars.len() }))
    }

    pub async fn get_calendar(&self, params: GetCalendarParams) -> ToolResult {
        let calendar_id = require("calendar_id", &params.calendar_id)?;

        self.call("get_calendar", |client| async move {
            client.get_calendar(calendar_id).await
        })
        .await
    }

    pub async fn check_free_busy(&self, params: FreeBusyParams) -> ToolResult {
        let (Some(time_min), Some(time_max)) = (
            present(Some(params.time_min.as_str())),
            present(Some(params.time_max.as_str())),
        ) else {
            return Err(ToolError::Invalid(
                "time_min and time_max must not be empty".to_string(),
            ));
        };
        let mut calendar_ids: Vec<String> = params
            .calendar_ids
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(String::from)
            .collect();
        if calendar_ids.is_empty() {
            calendar_ids.push(self.default_calendar_id.clone());
        }
        let timezone = present(Some(params.timezone.as_str())).unwrap_or("UTC");
        let query = &FreeBusyRequest::new(time_min, time_max, timezone, calendar_ids);

        self.call("check_free_busy", |client| async move {
            client.query_free_busy(query).await
        })
        .await
    }
}
