//! `gcal-mcp serve`

use std::sync::Arc;

use gcal_mcp_auth::{AcquireMode, AuthError};
use rmcp::ServiceExt;
use tracing::info;

use super::Context;
use crate::error::{AppError, AppResult};
use crate::server::CalendarServer;
use crate::session::CalendarSession;
use crate::tools::CalendarTools;

/// Obtains credentials, then serves the calendar tools on stdio until the
/// peer disconnects.
pub async fn run(ctx: Context, headless: bool) -> AppResult<()> {
    let user_id = ctx.settings.user_id.clone();
    let mode = if headless {
        AcquireMode::Headless
    } else {
        AcquireMode::Interactive
    };

    let credentials = ctx
        .manager
        .obtain(&user_id, mode)
        .await
        .map_err(|e| match e {
            e @ AuthError::NoValidToken { .. } => AppError::AuthRequired(e),
            e => AppError::Auth(e),
        })?;

    let session = CalendarSession::new(
        Arc::clone(&ctx.manager),
        &user_id,
        ctx.settings.request_timeout,
    )?
    .with_credentials(credentials);
    let tools = CalendarTools::new(Arc::new(session), &ctx.settings.default_calendar_id);
    let server = CalendarServer::new(Arc::new(tools));

    info!(user = %user_id, "serving calendar tools on stdio");
    let service = server
        .serve(rmcp::transport::stdio())
        .await
        .map_err(|e| AppError::Transport(e.to_string()))?;
    let reason = service
        .waiting()
        .await
        .map_err(|e| AppError::Transport(e.to_string()))?;
    info!(?reason, "MCP session ended");
    Ok(())
}
