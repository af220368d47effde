//! `gcal-mcp auth`

use gcal_mcp_auth::AcquireMode;
use tracing::info;

use super::Context;
use crate::error::AppResult;

/// Runs the interactive authorization unless usable credentials are stored.
pub async fn run(ctx: &Context, force: bool) -> AppResult<()> {
    let user_id = ctx.settings.user_id.as_str();

    let credentials = if force {
        ctx.manager.authorize(user_id).await?
    } else {
        ctx.manager.obtain(user_id, AcquireMode::Interactive).await?
    };

    info!(user = %user_id, "credentials ready");
    println!("Authorized calendar access for user '{}'.", user_id);
    if let Some(expires_at) = credentials.expires_at() {
        println!("Access token valid until {}.", expires_at.to_rfc3339());
    }
    if let Ok(path) = ctx.store.record_path(user_id) {
        println!("Credentials stored in {}", path.display());
    }
    Ok(())
}
