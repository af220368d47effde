//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gcal_mcp_core::{SettingsOverrides, TracingOutputFormat};

/// gcal-mcp - Google Calendar tools over MCP
#[derive(Debug, Parser)]
#[command(name = "gcal-mcp")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, global = true, env = "GCAL_MCP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Log line format: compact, pretty or json
    #[arg(long, global = true, default_value = "compact")]
    pub log_format: TracingOutputFormat,

    // --- Google OAuth client ---
    /// OAuth client ID (from Google Cloud Console)
    #[arg(long, global = true, env = "GOOGLE_CLIENT_ID")]
    pub client_id: Option<String>,

    /// OAuth client secret (from Google Cloud Console)
    #[arg(long, global = true, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Path to Google Cloud Console credentials JSON file
    ///
    /// Consulted when the client ID or secret is not given directly.
    #[arg(long, global = true, env = "GOOGLE_CREDENTIALS_FILE")]
    pub credentials_file: Option<PathBuf>,

    /// Redirect URI registered for the OAuth client
    #[arg(long, global = true, env = "GOOGLE_REDIRECT_URI")]
    pub redirect_uri: Option<String>,

    /// OAuth scopes to request (comma separated)
    #[arg(long, global = true, env = "GOOGLE_SCOPES", value_delimiter = ',')]
    pub scopes: Vec<String>,

    // --- Storage and defaults ---
    /// Directory holding stored credentials
    #[arg(long, global = true, env = "TOKEN_STORE_PATH")]
    pub token_store_path: Option<PathBuf>,

    /// Calendar used when a tool call omits calendar_id
    #[arg(long, global = true, env = "DEFAULT_CALENDAR_ID")]
    pub default_calendar_id: Option<String>,

    /// Key under which credentials are stored
    #[arg(long, global = true, env = "GCAL_MCP_USER_ID")]
    pub user_id: Option<String>,

    // --- Timeouts ---
    /// Timeout for Google API requests, in seconds
    #[arg(long, global = true, env = "GCAL_MCP_REQUEST_TIMEOUT")]
    pub request_timeout: Option<u64>,

    /// How long to wait for the OAuth redirect, in seconds
    #[arg(long, global = true, env = "GCAL_MCP_CALLBACK_TIMEOUT")]
    pub callback_timeout: Option<u64>,

    /// Print the consent URL instead of opening a browser
    #[arg(long, global = true)]
    pub no_browser: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Flag and environment values, ready to merge over `config.toml`.
    pub fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            credentials_file: self.credentials_file.clone(),
            redirect_uri: self.redirect_uri.clone(),
            scopes: (!self.scopes.is_empty()).then(|| self.scopes.clone()),
            token_store_path: self.token_store_path.clone(),
            default_calendar_id: self.default_calendar_id.clone(),
            user_id: self.user_id.clone(),
            request_timeout_secs: self.request_timeout,
            callback_timeout_secs: self.callback_timeout,
            open_browser: self.no_browser.then_some(false),
        }
    }
}

/// Available commands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Serve calendar tools over MCP on stdio (default)
    Serve {
        /// Never start a browser authorization; fail if no usable credentials exist
        #[arg(long)]
        headless: bool,
    },

    /// Authorize calendar access and store the credentials
    Auth {
        /// Run a new authorization even if stored credentials are usable
        #[arg(long, short)]
        force: bool,
    },

    /// Show the state of the stored credentials
    Status,

    /// Delete the stored credentials
    Logout {
        /// Ask Google to revoke the token before deleting it
        #[arg(long)]
        revoke: bool,
    },
}
