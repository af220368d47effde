//! MCP exposure of [`CalendarTools`].

use std::sync::Arc;

use rmcp::{
    ErrorData, ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router,
};

use crate::params::{
    CreateEventParams, EventRefParams, FreeBusyParams, GetCalendarParams, ListEventsParams,
    SearchEventsParams, UpdateEventParams,
};
use crate::tools::{CalendarTools, ToolResult};

/// Every tool answers with one JSON object as text content.
fn respond(result: ToolResult) -> Result<CallToolResult, ErrorData> {
    Ok(match result {
        Ok(value) => CallToolResult::success(vec![Content::text(value.to_string())]),
        Err(e) => CallToolResult::error(vec![Content::text(e.payload().to_string())]),
    })
}

#[derive(Clone)]
pub struct CalendarServer {
    tools: Arc<CalendarTools>,
    tool_router: ToolRouter<Self>,
}

impl CalendarServer {
    pub fn new(tools: Arc<CalendarTools>) -> Self {
        Self {
            tools,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl CalendarServer {
    #[tool(description = "List upcoming events from a calendar")]
    async fn list_events(
        &self,
        Parameters(params): Parameters<ListEventsParams>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(self.tools.list_events(params).await)
    }

    #[tool(description = "Search events by free text")]
    async fn search_events(
        &self,
        Parameters(params): Parameters<SearchEventsParams>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(self.tools.search_events(params).await)
    }

    #[tool(description = "Fetch a single event by ID")]
    async fn get_event(
        &self,
        Parameters(params): Parameters<EventRefParams>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(self.tools.get_event(params).await)
    }

    #[tool(description = "Create an event")]
    async fn create_event(
        &self,
        Parameters(params): Parameters<CreateEventParams>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(self.tools.create_event(params).await)
    }

    #[tool(description = "Update the given fields of an existing event")]
    async fn update_event(
        &self,
        Parameters(params): Parameters<UpdateEventParams>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(self.tools.update_event(params).await)
    }

    #[tool(description = "Delete an event")]
    async fn delete_event(
        &self,
        Parameters(params): Parameters<EventRefParams>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(self.tools.delete_event(params).await)
    }

    #[tool(description = "List the calendars of the authorized user")]
    async fn list_calendars(&self) -> Result<CallToolResult, ErrorData> {
        respond(self.tools.list_calendars().await)
    }

    #[tool(description = "Fetch calendar metadata such as its time zone")]
    async fn get_calendar(
        &self,
        Parameters(params): Parameters<GetCalendarParams>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(self.tools.get_calendar(params).await)
    }

    #[tool(description = "Report busy intervals for one or more calendars")]
    async fn check_free_busy(
        &self,
        Parameters(params): Parameters<FreeBusyParams>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(self.tools.check_free_busy(params).await)
    }
}

#[tool_handler]
impl ServerHandler for CalendarServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "google-calendar-mcp".into(),
                title: Some("Google Calendar".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Tools for reading and editing Google Calendar events. Times are RFC 3339; \
                 omit calendar_id to use the default calendar."
                    .into(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::CalendarSession;
    use gcal_mcp_auth::{
        AuthorizationFlow, BoxFuture, CredentialManager, CredentialRecord, MemoryTokenStore,
        OAuthError, RefreshFailed, TokenStore,
    };
    use gcal_mcp_core::ClientCredentials;

    struct NoFlow;

    impl AuthorizationFlow for NoFlow {
        fn refresh<'a>(
            &'a self,
            _client: &'a ClientCredentials,
            _record: &'a CredentialRecord,
        ) -> BoxFuture<'a, Result<CredentialRecord, RefreshFailed>> {
            Box::pin(async { Err(OAuthError::MissingRefreshToken.into()) })
        }

        fn authorize<'a>(
            &'a self,
            _client: &'a ClientCredentials,
            _scopes: &'a [String],
        ) -> BoxFuture<'a, Result<CredentialRecord, OAuthError>> {
            Box::pin(async { Err(OAuthError::Denied("disabled".into())) })
        }
    }

    fn server() -> CalendarServer {
        let manager = CredentialManager::new(
            ClientCredentials {
                client_id: "id".into(),
                client_secret: "secret".into(),
            },
            vec![],
            Arc::new(MemoryTokenStore::new()) as Arc<dyn TokenStore>,
            Arc::new(NoFlow) as Arc<dyn AuthorizationFlow>,
        );
        let session =
            CalendarSession::with_http_client(Arc::new(manager), "default", reqwest::Client::new());
        CalendarServer::new(Arc::new(CalendarTools::new(Arc::new(session), "primary")))
    }

    #[test]
    fn registers_every_tool() {
        let mut names: Vec<String> = server()
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            [
                "check_free_busy",
                "create_event",
                "delete_event",
                "get_calendar",
                "get_event",
                "list_calendars",
                "list_events",
                "search_events",
                "update_event",
            ]
        );
    }

    #[test]
    fn advertises_tools() {
        let info = server().get_info();
        assert!(info.capabilities.tools.is_some());
        assert_eq!(info.server_info.name, "google-calendar-mcp");
    }

    #[test]
    fn validation_errors_are_flagged() {
        let result = respond(Err(crate::tools::ToolError::Invalid(
            "query must not be empty".into(),
        )))
        .unwrap();
        assert_eq!(result.is_error, Some(true));
    }
}
