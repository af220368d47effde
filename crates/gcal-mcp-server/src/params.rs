//! Tool parameters.
//!
//! Every parameter is a primitive or a string. Optional calendar ids fall
//! back to the configured default calendar.

use rmcp::schemars;
use serde::Deserialize;

fn default_max_results() -> i64 {
    10
}

fn default_order_by() -> String {
    "startTime".to_string()
}

fn default_calendar_ids() -> String {
    "primary".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Clone, Deserialize, schemars::JsonSchema)]
pub struct ListEventsParams {
    /// Calendar to read; defaults to the configured calendar
    #[serde(default)]
    pub calendar_id: Option<String>,
    /// Lower bound (RFC 3339) on event end time
    #[serde(default)]
    pub time_min: Option<String>,
    /// Upper bound (RFC 3339) on event start time
    #[serde(default)]
    pub time_max: Option<String>,
    /// Maximum number of events, 1 to 2500
    #[serde(default = "default_max_results")]
    pub max_results: i64,
    /// `startTime` or `updated`
    #[serde(default = "default_order_by")]
    pub order_by: String,
}

#[derive(Debug, Clone, Deserialize, schemars::JsonSchema)]
pub struct SearchEventsParams {
    /// Free-text search terms
    pub query: String,
    #[serde(default)]
    pub calendar_id: Option<String>,
    #[serde(default)]
    pub time_min: Option<String>,
    #[serde(default)]
    pub time_max: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: i64,
}

#[derive(Debug, Clone, Deserialize, schemars::JsonSchema)]
pub struct EventRefParams {
    pub event_id: String,
    #[serde(default)]
    pub calendar_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, schemars::JsonSchema)]
pub struct CreateEventParams {
    pub summary: String,
    /// RFC 3339 timestamp, or `YYYY-MM-DD` when all_day is set
    pub start: String,
    /// RFC 3339 timestamp, or `YYYY-MM-DD` when all_day is set
    pub end: String,
    #[serde(default)]
    pub calendar_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    /// Comma-separated email addresses
    #[serde(default)]
    pub attendees: Option<String>,
    #[serde(default)]
    pub all_day: bool,
    /// `1` to `11` or a colour name such as `tomato` or `sage`
    #[serde(default)]
    pub color_id: Option<String>,
    /// Comma-separated popup reminder offsets in minutes, e.g. `10,30`
    #[serde(default)]
    pub reminders: Option<String>,
}

#[derive(Debug, Clone, Deserialize, schemars::JsonSchema)]
pub struct UpdateEventParams {
    pub event_id: String,
    #[serde(default)]
    pub calendar_id: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    /// A `YYYY-MM-DD` value makes the event all-day
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    /// Comma-separated email addresses; replaces the attendee list
    #[serde(default)]
    pub attendees: Option<String>,
    #[serde(default)]
    pub color_id: Option<String>,
    #[serde(default)]
    pub reminders: Option<String>,
}

#[derive(Debug, Clone, Deserialize, schemars::JsonSchema)]
pub struct GetCalendarParams {
    pub calendar_id: String,
}

#[derive(Debug, Clone, Deserialize, schemars::JsonSchema)]
pub struct FreeBusyParams {
    pub time_min: String,
    pub time_max: String,
    /// Comma-separated calendar ids
    #[serde(default = "default_calendar_ids")]
    pub calendar_ids: String,
    /// IANA time zone for the response
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_defaults() {
        let params: ListEventsParams = serde_json::from_value(json!({})).unwrap();
        assert_eq!(params.max_results, 10);
        assert_eq!(params.order_by, "startTime");
        assert!(params.calendar_id.is_none());
    }

    #[test]
    fn free_busy_defaults() {
        let params: FreeBusyParams = serde_json::from_value(json!({
            "time_min": "2025-01-10T00:00:00Z",
            "time_max": "2025-01-11T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(params.calendar_ids, "primary");
        assert_eq!(params.timezone, "UTC");
    }

    #[test]
    fn create_requires_core_fields() {
        assert!(serde_json::from_value::<CreateEventParams>(json!({"summary": "x"})).is_err());
        let params: CreateEventParams = serde_json::from_value(json!({
            "summary": "x", "start": "2025-01-10", "end": "2025-01-11", "all_day": true
        }))
        .unwrap();
        assert!(params.all_day);
    }
}
