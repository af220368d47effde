//! Request bodies and parameter parsing.

use chrono::NaiveDate;
use serde::Serialize;

/// Longest reminder Google accepts: four weeks, in minutes.
pub const MAX_REMINDER_MINUTES: u32 = 40_320;

/// Google keeps at most this many reminder overrides.
pub const MAX_REMINDERS: usize = 5;

/// Event colour names in `colorId` order.
const COLOR_NAMES: [&str; 11] = [
    "tomato",
    "flamingo",
    "tangerine",
    "banana",
    "sage",
    "basil",
    "peacock",
    "blueberry",
    "lavender",
    "grape",
    "graphite",
];

/// Event start or end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventTime {
    /// RFC 3339 timestamp, `{"dateTime": ...}`.
    DateTime(String),
    /// `YYYY-MM-DD`, `{"date": ...}`.
    Date(String),
}

impl EventTime {
    pub fn new(value: &str, all_day: bool) -> Self {
        if all_day {
            Self::Date(value.to_string())
        } else {
            Self::DateTime(value.to_string())
        }
    }

    /// A bare calendar date becomes an all-day time, anything else a timestamp.
    pub fn infer(value: &str) -> Self {
        Self::new(value, NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attendee {
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminders {
    pub use_default: bool,
    pub overrides: Vec<ReminderOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReminderOverride {
    pub method: String,
    pub minutes: u32,
}

/// Body of `events.insert`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub summary: String,
    pub start: EventTime,
    pub end: EventTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<Attendee>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminders: Option<Reminders>,
}

/// Body of `events.patch`. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<EventTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<EventTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<Attendee>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminders: Option<Reminders>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none()
            && self.start.is_none()
            && self.end.is_none()
            && self.description.is_none()
            && self.location.is_none()
            && self.attendees.is_none()
            && self.color_id.is_none()
            && self.reminders.is_none()
    }
}

/// Body of `freebusy.query`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeBusyRequest {
    pub time_min: String,
    pub time_max: String,
    pub time_zone: String,
    pub items: Vec<FreeBusyItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FreeBusyItem {
    pub id: String,
}

impl FreeBusyRequest {
    pub fn new(
        time_min: impl Into<String>,
        time_max: impl Into<String>,
        time_zone: impl Into<String>,
        calendar_ids: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            time_min: time_min.into(),
            time_max: time_max.into(),
            time_zone: time_zone.into(),
            items: calendar_ids.into_iter().map(|id| FreeBusyItem { id }).collect(),
        }
    }
}

/// Maps `"1"`..`"11"` or a colour name to a `colorId`.
pub fn color_id(value: &str) -> Option<String> {
    let value = value.trim();
    if let Ok(n) = value.parse::<usize>() {
        return (1..=COLOR_NAMES.len()).contains(&n).then(|| n.to_string());
    }
    COLOR_NAMES
        .iter()
        .position(|name| name.eq_ignore_ascii_case(value))
        .map(|i| (i + 1).to_string())
}

/// Parses `"10,30"` into popup reminders.
///
/// Entries that are not numbers or exceed four weeks are dropped, and only the
/// first five are kept. Returns `None` if nothing usable remains.
pub fn parse_reminders(value: &str) -> Option<Reminders> {
    let overrides: Vec<ReminderOverride> = value
        .split(',')
        .filter_map(|m| m.trim().parse::<u32>().ok())
        .filter(|m| *m <= MAX_REMINDER_MINUTES)
        .take(MAX_REMINDERS)
        .map(|minutes| ReminderOverride {
            method: "popup".to_string(),
            minutes,
        })
        .collect();

    (!overrides.is_empty()).then_some(Reminders {
        use_default: false,
        overrides,
    })
}

/// Splits a comma-separated address list.
pub fn parse_attendees(value: &str) -> Vec<Attendee> {
    value
        .split(',')
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .map(|email| Attendee {
            email: email.to_string(),
        })
        .collect()
}
