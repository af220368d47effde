//! `gcal-mcp status`

use chrono::Utc;
use gcal_mcp_auth::{CredentialRecord, Credentials};
use gcal_mcp_core::ClientCredentials;

use super::Context;
use crate::error::AppResult;

/// Prints the state of the stored credentials. Token values are never shown.
pub fn run(ctx: &Context) -> AppResult<()> {
    let user_id = ctx.settings.user_id.as_str();
    let path = ctx.store.record_path(user_id)?;
    let record = ctx.manager.stored(user_id)?;

    println!("user:        {}", user_id);
    println!("store:       {}", path.display());
    let lines = describe(
        record,
        ctx.settings.client_credentials(),
        ctx.manager.scopes(),
    );
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

fn describe(
    record: Option<CredentialRecord>,
    client: ClientCredentials,
    required_scopes: &[String],
) -> Vec<String> {
    let Some(record) = record else {
        return vec!["credentials: none (run `gcal-mcp auth`)".to_string()];
    };

    let missing = record.missing_scopes(required_scopes);
    let credentials = Credentials::new(record, client);

    let state = if credentials.is_valid() {
        "valid"
    } else if credentials.is_refreshable() {
        "expired (refreshable)"
    } else {
        "expired"
    };
    let now = Utc::now();
    let expiry = match credentials.expires_at() {
        Some(at) if at > now => {
            format!("{} ({} min left)", at.to_rfc3339(), (at - now).num_minutes())
        }
        Some(at) => at.to_rfc3339(),
        None => "not recorded".to_string(),
    };
    let refresh = if credentials.record().has_refresh_token() {
        "present"
    } else {
        "missing"
    };

    let mut lines = vec![
        format!("credentials: {}", state),
        format!("expires:     {}", expiry),
        format!("refresh:     {}", refresh),
    ];
    if !missing.is_empty() {
        lines.push(format!("missing scopes: {}", missing.join(" ")));
    }
    lines
}
