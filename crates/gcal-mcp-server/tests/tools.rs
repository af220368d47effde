//! Tool layer against an in-memory store and a local calendar responder.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use gcal_mcp_auth::{
    AuthorizationFlow, BoxFuture, CredentialManager, CredentialRecord, MemoryTokenStore,
    OAuthError, RefreshFailed, TokenStore,
};
use gcal_mcp_core::ClientCredentials;
use gcal_mcp_server::params::{
    CreateEventParams, EventRefParams, FreeBusyParams, GetCalendarParams, ListEventsParams,
    SearchEventsParams, UpdateEventParams,
};
use gcal_mcp_server::{CalendarSession, CalendarTools, ToolError};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const SCOPE: &str = "https://www.googleapis.com/auth/calendar";

/// Refreshes to a fixed token and never grants.
#[derive(Default)]
struct CountingFlow {
    refreshes: AtomicUsize,
    grants: AtomicUsize,
}

impl AuthorizationFlow for CountingFlow {
    fn refresh<'a>(
        &'a self,
        _client: &'a ClientCredentials,
        record: &'a CredentialRecord,
    ) -> BoxFuture<'a, Result<CredentialRecord, RefreshFailed>> {
        Box::pin(async move {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(CredentialRecord::new("REFRESHED", record.refresh_token.clone())
                .with_scopes(record.scopes.clone())
                .expiring_in(Some(3600)))
        })
    }

    fn authorize<'a>(
        &'a self,
        _client: &'a ClientCredentials,
        _scopes: &'a [String],
    ) -> BoxFuture<'a, Result<CredentialRecord, OAuthError>> {
        Box::pin(async move {
            self.grants.fetch_add(1, Ordering::SeqCst);
            Err(OAuthError::Denied("not in tests".into()))
        })
    }
}

struct Harness {
    tools: CalendarTools,
    flow: Arc<CountingFlow>,
}

fn harness(record: Option<CredentialRecord>, api_base: &str) -> Harness {
    let store = match record {
        Some(record) => MemoryTokenStore::with_record("default", record).unwrap(),
        None => MemoryTokenStore::new(),
    };
    let flow = Arc::new(CountingFlow::default());
    let manager = CredentialManager::new(
        ClientCredentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
        },
        vec![SCOPE.into()],
        Arc::new(store) as Arc<dyn TokenStore>,
        Arc::clone(&flow) as Arc<dyn AuthorizationFlow>,
    );
    let http = reqwest::Client::builder().no_proxy().build().unwrap();
    let session = CalendarSession::with_http_client(Arc::new(manager), "default", http)
        .with_api_base(api_base);
    Harness {
        tools: CalendarTools::new(Arc::new(session), "team@example.com"),
        flow,
    }
}

fn valid_record() -> CredentialRecord {
    CredentialRecord::new("VALID", Some("R".into()))
        .with_scopes(vec![SCOPE.into()])
        .expiring_in(Some(3600))
}

/// Answers one request per response, in order, returning the base URL and a
/// handle yielding the raw requests.
async fn respond_each(
    responses: Vec<(&'static str, &'static str)>,
) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}/calendar/v3", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let mut requests = Vec::new();
        for (status, body) in responses {
            let (mut stream, _) = listener.accept().await.unwrap();
            requests.push(read_request(&mut stream).await);
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
        }
        requests
    });

    (base, handle)
}

async fn respond_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let (base, requests) = respond_each(vec![(status, body)]).await;
    let handle = tokio::spawn(async move { requests.await.unwrap().remove(0) });
    (base, handle)
}

async fn read_request(stream: &mut TcpStream) -> String {
    let mut request = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        request.extend_from_slice(&buf[..n]);
        if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&request[..end]).to_ascii_lowercase();
            let length = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if request.len() >= end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8(request).unwrap()
}

fn list_params() -> ListEventsParams {
    serde_json::from_value(json!({})).unwrap()
}

fn message(err: ToolError) -> String {
    err.payload()["error"].as_str().unwrap().to_string()
}

// Nothing is stored, so reaching credential work would report
// "authentication required" instead of the validation message.
#[tokio::test]
async fn validation_precedes_credential_work() {
    let h = harness(None, "http://127.0.0.1:9");

    let mut params = list_params();
    params.order_by = "created".into();
    assert_eq!(
        message(h.tools.list_events(params).await.unwrap_err()),
        "order_by must be one of: startTime, updated"
    );

    let params: SearchEventsParams = serde_json::from_value(json!({"query": "  "})).unwrap();
    assert_eq!(
        message(h.tools.search_events(params).await.unwrap_err()),
        "query must not be empty"
    );

    let params: EventRefParams = serde_json::from_value(json!({"event_id": ""})).unwrap();
    assert_eq!(
        message(h.tools.get_event(params.clone()).await.unwrap_err()),
        "event_id must not be empty"
    );
    assert_eq!(
        message(h.tools.delete_event(params).await.unwrap_err()),
        "event_id must not be empty"
    );

    let params: UpdateEventParams =
        serde_json::from_value(json!({"event_id": " ", "summary": "x"})).unwrap();
    assert_eq!(
        message(h.tools.update_event(params).await.unwrap_err()),
        "event_id must not be empty"
    );

    let params: GetCalendarParams = serde_json::from_value(json!({"calendar_id": ""})).unwrap();
    assert_eq!(
        message(h.tools.get_calendar(params).await.unwrap_err()),
        "calendar_id must not be empty"
    );

    let params: CreateEventParams =
        serde_json::from_value(json!({"summary": "", "start": "a", "end": "b"})).unwrap();
    assert_eq!(
        message(h.tools.create_event(params).await.unwrap_err()),
        "summary must not be empty"
    );

    let params: CreateEventParams =
        serde_json::from_value(json!({"summary": "Lunch", "start": "", "end": "b"})).unwrap();
    assert_eq!(
        message(h.tools.create_event(params).await.unwrap_err()),
        "start and end must not be empty"
    );

    let params: FreeBusyParams =
        serde_json::from_value(json!({"time_min": "", "time_max": "2025-01-11T00:00:00Z"}))
            .unwrap();
    assert_eq!(
        message(h.tools.check_free_busy(params).await.unwrap_err()),
        "time_min and time_max must not be empty"
    );

    assert_eq!(h.flow.refreshes.load(Ordering::SeqCst), 0);
    assert_eq!(h.flow.grants.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_credentials_never_start_a_grant() {
    let h = harness(None, "http://127.0.0.1:9");

    let err = h.tools.list_calendars().await.unwrap_err();
    assert!(matches!(err, ToolError::Auth(_)));
    assert_eq!(
        message(err),
        "authentication required: no valid credentials for user 'default'"
    );
    assert_eq!(h.flow.grants.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn list_events_uses_default_calendar_and_clamps() {
    let (base, server) = respond_once(
        "200 OK",
        r#"{"items":[{"id":"e1","summary":"Standup"}]}"#,
    )
    .await;
    let h = harness(Some(valid_record()), &base);

    let mut params = list_params();
    params.max_results = 9000;
    let result = h.tools.list_events(params).await.unwrap();
    assert_eq!(result["count"], 1);
    assert_eq!(result["events"][0]["summary"], "Standup");

    let request = server.await.unwrap();
    let first_line = request.lines().next().unwrap();
    assert!(first_line.starts_with("GET /calendar/v3/calendars/team%40example.com/events?"));
    assert!(first_line.contains("maxResults=2500"));
    assert!(first_line.contains("orderBy=startTime"));
    assert!(request.to_ascii_lowercase().contains("authorization: bearer valid"));
}

#[tokio::test]
async fn api_errors_report_status_only() {
    let (base, server) = respond_once(
        "403 Forbidden",
        r#"{"error":{"code":403,"message":"Calendar usage limits exceeded for alice@example.com"}}"#,
    )
    .await;
    let h = harness(Some(valid_record()), &base);

    let params: EventRefParams =
        serde_json::from_value(json!({"event_id": "e1", "calendar_id": "primary"})).unwrap();
    let payload = h.tools.get_event(params).await.unwrap_err().payload();
    assert_eq!(payload, json!({"error": "Calendar API error (403)"}));
    server.await.unwrap();
}

#[tokio::test]
async fn delete_reports_event_id() {
    let (base, server) = respond_once("204 No Content", "").await;
    let h = harness(Some(valid_record()), &base);

    let params: EventRefParams = serde_json::from_value(json!({"event_id": "e1"})).unwrap();
    let result = h.tools.delete_event(params).await.unwrap();
    assert_eq!(result, json!({"deleted": true, "event_id": "e1"}));

    let request = server.await.unwrap();
    assert!(request.starts_with("DELETE /calendar/v3/calendars/team%40example.com/events/e1 "));
}

#[tokio::test]
async fn create_maps_optional_fields() {
    let (base, server) = respond_once("200 OK", r#"{"id":"new1"}"#).await;
    let h = harness(Some(valid_record()), &base);

    let params: CreateEventParams = serde_json::from_value(json!({
        "summary": "Offsite",
        "start": "2025-03-01",
        "end": "2025-03-02",
        "all_day": true,
        "attendees": "a@example.com, b@example.com",
        "color_id": "Basil",
        "reminders": "60,abc",
        "description": "  "
    }))
    .unwrap();
    let result = h.tools.create_event(params).await.unwrap();
    assert_eq!(result["id"], "new1");

    let request = server.await.unwrap();
    let body: serde_json::Value =
        serde_json::from_str(&request[request.find("\r\n\r\n").unwrap() + 4..]).unwrap();
    assert_eq!(
        body,
        json!({
            "summary": "Offsite",
            "start": {"date": "2025-03-01"},
            "end": {"date": "2025-03-02"},
            "attendees": [{"email": "a@example.com"}, {"email": "b@example.com"}],
            "colorId": "6",
            "reminders": {"useDefault": false, "overrides": [{"method": "popup", "minutes": 60}]}
        })
    );
}

#[tokio::test]
async fn expired_session_credentials_are_refreshed_headlessly() {
    let (base, server) = respond_once("200 OK", r#"{"items":[]}"#).await;
    let mut record = valid_record();
    record.expires_at = Some(Utc::now() - chrono::Duration::minutes(5));
    let h = harness(Some(record), &base);

    let result = h.tools.list_calendars().await.unwrap();
    assert_eq!(result, json!({"calendars": [], "count": 0}));
    assert_eq!(h.flow.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(h.flow.grants.load(Ordering::SeqCst), 0);

    let request = server.await.unwrap();
    assert!(request.to_ascii_lowercase().contains("authorization: bearer refreshed"));
}

/// A record written by older tooling: no expiry, so only the API can say the
/// token is dead.
fn legacy_record() -> CredentialRecord {
    serde_json::from_value(json!({
        "token": "OLD",
        "refresh_token": "R",
        "token_uri": "https://oauth2.googleapis.com/token",
        "scopes": [SCOPE]
    }))
    .unwrap()
}

const UNAUTHORIZED: (&str, &str) = (
    "401 Unauthorized",
    r#"{"error":{"code":401,"message":"Request had invalid authentication credentials."}}"#,
);

#[tokio::test]
async fn rejected_token_is_refreshed_and_retried() {
    let (base, server) =
        respond_each(vec![UNAUTHORIZED, ("200 OK", r#"{"items":[{"id":"c1"}]}"#)]).await;
    let h = harness(Some(legacy_record()), &base);

    let result = h.tools.list_calendars().await.unwrap();
    assert_eq!(result["count"], 1);
    assert_eq!(h.flow.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(h.flow.grants.load(Ordering::SeqCst), 0);

    let requests = server.await.unwrap();
    assert!(requests[0].to_ascii_lowercase().contains("authorization: bearer old"));
    assert!(requests[1].to_ascii_lowercase().contains("authorization: bearer refreshed"));
}

#[tokio::test]
async fn repeated_rejection_is_reported_after_one_retry() {
    let (base, server) = respond_each(vec![UNAUTHORIZED, UNAUTHORIZED]).await;
    let h = harness(Some(legacy_record()), &base);

    let params: EventRefParams = serde_json::from_value(json!({"event_id": "e1"})).unwrap();
    let payload = h.tools.get_event(params).await.unwrap_err().payload();
    assert_eq!(payload, json!({"error": "Calendar API error (401)"}));
    assert_eq!(h.flow.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(server.await.unwrap().len(), 2);
}
