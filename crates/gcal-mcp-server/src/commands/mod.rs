//! Command implementations.

pub mod auth;
pub mod logout;
pub mod serve;
pub mod status;

use std::sync::Arc;

use gcal_mcp_auth::{AuthorizationFlow, CredentialManager, FileTokenStore, OAuthClient, TokenStore};
use gcal_mcp_core::{FileConfig, Settings};
use tracing::debug;

use crate::cli::{Cli, Command};
use crate::error::AppResult;

/// Everything a command needs, built from validated settings.
pub struct Context {
    pub settings: Settings,
    pub store: Arc<FileTokenStore>,
    pub oauth: Arc<OAuthClient>,
    pub manager: Arc<CredentialManager>,
}

impl Context {
    /// Loads `config.toml`, merges the CLI over it and wires the credential
    /// manager. Fails before any credential work when the configuration is
    /// incomplete.
    pub fn from_cli(cli: &Cli) -> AppResult<Self> {
        let file = FileConfig::load(cli.config.as_deref())?;
        let settings = Settings::resolve(cli.overrides(), file)?;
        debug!(?settings, "resolved settings");
        Self::new(settings)
    }

    pub fn new(settings: Settings) -> AppResult<Self> {
        let store = Arc::new(FileTokenStore::new(&settings.token_store_path));
        let oauth = Arc::new(
            OAuthClient::new(settings.redirect_uri.clone(), settings.request_timeout)?
                .with_callback_timeout(settings.callback_timeout)
                .with_browser(settings.open_browser),
        );
        let manager = Arc::new(CredentialManager::new(
            settings.client_credentials(),
            settings.scopes.clone(),
            Arc::clone(&store) as Arc<dyn TokenStore>,
            Arc::clone(&oauth) as Arc<dyn AuthorizationFlow>,
        ));
        Ok(Self {
            settings,
            store,
            oauth,
            manager,
        })
    }
}

/// Dispatches the parsed command line.
pub async fn run(cli: Cli) -> AppResult<()> {
    let ctx = Context::from_cli(&cli)?;
    match cli.command.unwrap_or(Command::Serve { headless: false }) {
        Command::Serve { headless } => serve::run(ctx, headless).await,
        Command::Auth { force } => auth::run(&ctx, force).await,
        Command::Status => status::run(&ctx),
        Command::Logout { revoke } => logout::run(&ctx, revoke).await,
    }
}
