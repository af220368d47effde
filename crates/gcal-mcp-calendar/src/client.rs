//! Bearer-authenticated Calendar v3 client.

use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{CalendarApiError, CalendarResult};
use crate::model::{EventPatch, FreeBusyRequest, NewEvent};

/// Base URL for Google Calendar API v3.
pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Filters for `events.list`.
#[derive(Debug, Clone)]
pub struct EventQuery {
    pub time_min: Option<String>,
    pub time_max: Option<String>,
    pub max_results: u32,
    pub order_by: Option<String>,
    /// Free-text search.
    pub text: Option<String>,
    /// Expand recurring events into instances.
    pub single_events: bool,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            time_min: None,
            time_max: None,
            max_results: 10,
            order_by: None,
            text: None,
            single_events: true,
        }
    }
}

/// Calendar client bound to one access token. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CalendarClient {
    http: reqwest::Client,
    access_token: String,
    base_url: String,
}

impl CalendarClient {
    pub fn with_http_client(http: reqwest::Client, access_token: impl Into<String>) -> Self {
        Self {
            http,
            access_token: access_token.into(),
            base_url: CALENDAR_API_BASE.to_string(),
        }
    }

    /// The bearer token this client sends.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Returns the `items` of one `events.list` page.
    pub async fn list_events(&self, calendar_id: &str, query: &EventQuery) -> CalendarResult<Vec<Value>> {
        let mut params: Vec<(&str, String)> = vec![
            ("maxResults", query.max_results.to_string()),
            ("singleEvents", query.single_events.to_string()),
        ];
        if let Some(ref v) = query.time_min {
            params.push(("timeMin", v.clone()));
        }
        if let Some(ref v) = query.time_max {
            params.push(("timeMax", v.clone()));
        }
        if let Some(ref v) = query.order_by {
            params.push(("orderBy", v.clone()));
        }
        if let Some(ref v) = query.text {
            params.push(("q", v.clone()));
        }

        let request = self.http.get(self.events_url(calendar_id)).query(&params);
        let body = self.execute(request, "events.list").await?;
        items(parse("events.list", &body)?)
    }

    pub async fn get_event(&self, calendar_id: &str, event_id: &str) -> CalendarResult<Value> {
        let request = self.http.get(self.event_url(calendar_id, event_id));
        let body = self.execute(request, "events.get").await?;
        parse("events.get", &body)
    }

    pub async fn insert_event(&self, calendar_id: &str, event: &NewEvent) -> CalendarResult<Value> {
        let request = json_body(self.http.post(self.events_url(calendar_id)), event, "events.insert")?;
        let body = self.execute(request, "events.insert").await?;
        parse("events.insert", &body)
    }

    pub async fn patch_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> CalendarResult<Value> {
        let request = json_body(
            self.http.patch(self.event_url(calendar_id, event_id)),
            patch,
            "events.patch",
        )?;
        let body = self.execute(request, "events.patch").await?;
        parse("events.patch", &body)
    }

    pub async fn delete_event(&self, calendar_id: &str, event_id: &str) -> CalendarResult<()> {
        let request = self.http.delete(self.event_url(calendar_id, event_id));
        self.execute(request, "events.delete").await?;
        Ok(())
    }

    /// Returns the `items` of the user's calendar list.
    pub async fn list_calendars(&self) -> CalendarResult<Vec<Value>> {
        let request = self
            .http
            .get(format!("{}/users/me/calendarList", self.base_url));
        let body = self.execute(request, "calendarList.list").await?;
        items(parse("calendarList.list", &body)?)
    }

    pub async fn get_calendar(&self, calendar_id: &str) -> CalendarResult<Value> {
        let request = self.http.get(format!(
            "{}/calendars/{}",
            self.base_url,
            urlencoding::encode(calendar_id)
        ));
        let body = self.execute(request, "calendars.get").await?;
        parse("calendars.get", &body)
    }

    pub async fn query_free_busy(&self, query: &FreeBusyRequest) -> CalendarResult<Value> {
        let request = json_body(
            self.http.post(format!("{}/freeBusy", self.base_url)),
            query,
            "freebusy.query",
        )?;
        let body = self.execute(request, "freebusy.query").await?;
        parse("freebusy.query", &body)
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(calendar_id)
        )
    }

    fn event_url(&self, calendar_id: &str, event_id: &str) -> String {
        format!("{}/{}", self.events_url(calendar_id), urlencoding::encode(event_id))
    }

    /// Sends the request and returns the body of a successful response.
    async fn execute(&self, request: reqwest::RequestBuilder, action: &str) -> CalendarResult<String> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| CalendarApiError::transport(action, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CalendarApiError::transport(action, e))?;

        if !status.is_success() {
            return Err(CalendarApiError::status(action, status.as_u16(), &body));
        }
        debug!("{} succeeded ({})", action, status);
        Ok(body)
    }
}

fn json_body<T: Serialize>(
    request: reqwest::RequestBuilder,
    body: &T,
    action: &str,
) -> CalendarResult<reqwest::RequestBuilder> {
    let bytes = serde_json::to_vec(body).map_err(|e| CalendarApiError::encode(action, e))?;
    Ok(request.header(CONTENT_TYPE, "application/json").body(bytes))
}

fn parse(action: &str, body: &str) -> CalendarResult<Value> {
    serde_json::from_str(body).map_err(|e| CalendarApiError::invalid_response(action, e))
}

fn items(mut page: Value) -> CalendarResult<Vec<Value>> {
    match page.get_mut("items").map(Value::take) {
        Some(Value::Array(items)) => Ok(items),
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(other) => Err(CalendarApiError::invalid_response(
            "list",
            format!("expected an items array, got {}", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn items_extraction() {
        assert_eq!(
            items(json!({"kind": "calendar#events", "items": [{"id": "a"}]})).unwrap(),
            vec![json!({"id": "a"})]
        );
        assert!(items(json!({"kind": "calendar#events"})).unwrap().is_empty());
        assert!(items(json!({"items": "nope"})).is_err());
    }

    #[test]
    fn urls_encode_identifiers() {
        let client = CalendarClient::with_http_client(reqwest::Client::new(), "t")
            .with_base_url("http://127.0.0.1:1/calendar/v3/");
        assert_eq!(
            client.event_url("team@example.com", "abc/def"),
            "http://127.0.0.1:1/calendar/v3/calendars/team%40example.com/events/abc%2Fdef"
        );
    }

    #[test]
    fn default_query() {
        let query = EventQuery::default();
        assert_eq!(query.max_results, 10);
        assert!(query.single_events);
        assert!(query.order_by.is_none());
    }
}
