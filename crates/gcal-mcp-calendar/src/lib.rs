//! Google Calendar v3 REST client
//!
//! A thin, bearer-authenticated wrapper over the endpoints the tool layer
//! exposes. Responses are returned as JSON values; failures are normalized
//! into [`CalendarApiError`].

pub mod client;
pub mod error;
pub mod model;

pub use client::{CALENDAR_API_BASE, CalendarClient, EventQuery};
pub use error::{CalendarApiError, CalendarResult};
pub use model::{
    Attendee, EventPatch, EventTime, FreeBusyRequest, NewEvent, Reminders, color_id,
    parse_attendees, parse_reminders,
};
