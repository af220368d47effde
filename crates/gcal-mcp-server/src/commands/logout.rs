//! `gcal-mcp logout`

use tracing::warn;

use super::Context;
use crate::error::AppResult;

/// Deletes the stored record, optionally revoking its grant first.
///
/// A failed revocation is reported but does not keep the record.
pub async fn run(ctx: &Context, revoke: bool) -> AppResult<()> {
    let user_id = ctx.settings.user_id.as_str();

    if revoke {
        let record = ctx.manager.stored(user_id)?;
        let token = record
            .as_ref()
            .and_then(|r| r.refresh_token.as_deref().or(r.access_token.as_deref()));
        match token {
            Some(token) => match ctx.oauth.revoke(token).await {
                Ok(()) => println!("Revoked the grant with Google."),
                Err(e) => {
                    warn!("token revocation failed: {}", e);
                    eprintln!("warning: could not revoke the grant: {}", e);
                }
            },
            None => println!("No stored token to revoke."),
        }
    }

    ctx.manager.forget(user_id).await?;
    println!("Removed stored credentials for user '{}'.", user_id);
    Ok(())
}
