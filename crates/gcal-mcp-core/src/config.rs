//! Process configuration.
//!
//! Every setting resolves in the same order: command-line flag or
//! environment variable (both arrive as [`SettingsOverrides`]), then
//! `config.toml`, then the built-in default. The client id and secret have
//! no default; when neither source provides them a Cloud Console credentials
//! file is consulted before giving up.
//!
//! ```toml
//! [google]
//! client_id = "123.apps.googleusercontent.com"
//! client_secret = "pass::google/calendar-mcp"
//! scopes = ["https://www.googleapis.com/auth/calendar"]
//!
//! [storage]
//! token_store_path = "~/.config/google-calendar-mcp"
//!
//! [calendar]
//! default_calendar_id = "primary"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::credentials::ClientCredentials;
use crate::secret;

pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/calendar";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8081";
pub const DEFAULT_CALENDAR_ID: &str = "primary";
pub const DEFAULT_USER_ID: &str = "default";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 300;

const CLIENT_ID_VAR: &str = "GOOGLE_CLIENT_ID";
const CLIENT_SECRET_VAR: &str = "GOOGLE_CLIENT_SECRET";

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration problems. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {}", .missing.join(", "))]
    MissingCredentials { missing: Vec<&'static str> },

    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: &'static str, message: String },

    #[error("failed to resolve {name}: {message}")]
    Secret { name: &'static str, message: String },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid credentials file {}: {message}", .path.display())]
    CredentialsFile { path: PathBuf, message: String },
}

// ---------------------------------------------------------------------------
// config.toml
// ---------------------------------------------------------------------------

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub google: GoogleSection,
    pub storage: StorageSection,
    pub calendar: CalendarSection,
    pub server: ServerSection,
}

/// `[google]`
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct GoogleSection {
    /// Supports `pass::` and `env::` references.
    pub client_id: Option<String>,
    /// Supports `pass::` and `env::` references.
    pub client_secret: Option<String>,
    pub credentials_file: Option<PathBuf>,
    pub redirect_uri: Option<String>,
    pub scopes: Option<Vec<String>>,
}

impl fmt::Debug for GoogleSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleSection")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("credentials_file", &self.credentials_file)
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// `[storage]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub token_store_path: Option<PathBuf>,
}

/// `[calendar]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CalendarSection {
    pub default_calendar_id: Option<String>,
}

/// `[server]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub user_id: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub callback_timeout_secs: Option<u64>,
    pub open_browser: Option<bool>,
}

impl FileConfig {
    /// Loads `path`, or the default location when `path` is `None`.
    ///
    /// An explicit path must exist. A missing file at the default location
    /// yields an empty configuration.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = Self::default_path();
                if path.is_file() {
                    Self::load_from(&path)
                } else {
                    debug!("no config file at {}", path.display());
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `<config dir>/google-calendar-mcp/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("google-calendar-mcp")
            .join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Values supplied by flags or environment variables.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub credentials_file: Option<PathBuf>,
    pub redirect_uri: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub token_store_path: Option<PathBuf>,
    pub default_calendar_id: Option<String>,
    pub user_id: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub callback_timeout_secs: Option<u64>,
    pub open_browser: Option<bool>,
}

/// Fully resolved process configuration.
#[derive(Clone)]
pub struct Settings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: Url,
    pub scopes: Vec<String>,
    pub token_store_path: PathBuf,
    pub default_calendar_id: String,
    pub user_id: String,
    pub request_timeout: Duration,
    pub callback_timeout: Duration,
    pub open_browser: bool,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri.as_str())
            .field("scopes", &self.scopes)
            .field("token_store_path", &self.token_store_path)
            .field("default_calendar_id", &self.default_calendar_id)
            .field("user_id", &self.user_id)
            .field("request_timeout", &self.request_timeout)
            .field("callback_timeout", &self.callback_timeout)
            .field("open_browser", &self.open_browser)
            .finish()
    }
}

impl Settings {
    /// Merges overrides over the file configuration and applies defaults.
    ///
    /// # Errors
    ///
    /// Fails when the client id or secret cannot be found, when a secret
    /// reference cannot be resolved, or when a value is malformed.
    pub fn resolve(overrides: SettingsOverrides, file: FileConfig) -> ConfigResult<Self> {
        let FileConfig {
            google,
            storage,
            calendar,
            server,
        } = file;

        let mut client_id = pick_secret(CLIENT_ID_VAR, overrides.client_id, google.client_id)?;
        let mut client_secret =
            pick_secret(CLIENT_SECRET_VAR, overrides.client_secret, google.client_secret)?;

        if (client_id.is_none() || client_secret.is_none())
            && let Some(path) = overrides.credentials_file.or(google.credentials_file)
        {
            let path = expand_tilde(&path);
            let creds = ClientCredentials::from_file(&path)
                .map_err(|message| ConfigError::CredentialsFile { path, message })?;
            client_id = client_id.or(Some(creds.client_id));
            client_secret = client_secret.or(Some(creds.client_secret));
        }

        let (client_id, client_secret) = match (client_id, client_secret) {
            (Some(id), Some(secret)) => (id, secret),
            (id, secret) => {
                let mut missing = Vec::new();
                if id.is_none() {
                    missing.push(CLIENT_ID_VAR);
                }
                if secret.is_none() {
                    missing.push(CLIENT_SECRET_VAR);
                }
                return Err(ConfigError::MissingCredentials { missing });
            }
        };

        let redirect_uri = non_blank(overrides.redirect_uri)
            .or_else(|| non_blank(google.redirect_uri))
            .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());
        let redirect_uri = parse_redirect_uri(&redirect_uri)?;

        let scopes = overrides
            .scopes
            .map(clean_scopes)
            .filter(|s| !s.is_empty())
            .or_else(|| google.scopes.map(clean_scopes).filter(|s| !s.is_empty()))
            .unwrap_or_else(|| vec![DEFAULT_SCOPE.to_string()]);

        let token_store_path = overrides
            .token_store_path
            .or(storage.token_store_path)
            .map(|p| expand_tilde(&p))
            .unwrap_or_else(default_token_store_path);

        let default_calendar_id = non_blank(overrides.default_calendar_id)
            .or_else(|| non_blank(calendar.default_calendar_id))
            .unwrap_or_else(|| DEFAULT_CALENDAR_ID.to_string());

        let user_id = non_blank(overrides.user_id)
            .or_else(|| non_blank(server.user_id))
            .unwrap_or_else(|| DEFAULT_USER_ID.to_string());

        let request_timeout = positive_secs(
            "request_timeout",
            overrides.request_timeout_secs.or(server.request_timeout_secs),
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;
        let callback_timeout = positive_secs(
            "callback_timeout",
            overrides.callback_timeout_secs.or(server.callback_timeout_secs),
            DEFAULT_CALLBACK_TIMEOUT_SECS,
        )?;

        let open_browser = overrides.open_browser.or(server.open_browser).unwrap_or(true);

        Ok(Self {
            client_id,
            client_secret,
            redirect_uri,
            scopes,
            token_store_path,
            default_calendar_id,
            user_id,
            request_timeout,
            callback_timeout,
            open_browser,
        })
    }

    /// The OAuth client identity as a credentials value.
    pub fn client_credentials(&self) -> ClientCredentials {
        ClientCredentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        }
    }
}

/// `~/.config/google-calendar-mcp`
pub fn default_token_store_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("google-calendar-mcp")
}

/// Replaces a leading `~` with the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Some(text) = path.to_str() else {
        return path.to_path_buf();
    };
    let rest = if text == "~" {
        ""
    } else if let Some(rest) = text.strip_prefix("~/") {
        rest
    } else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn pick_secret(
    name: &'static str,
    primary: Option<String>,
    fallback: Option<String>,
) -> ConfigResult<Option<String>> {
    let Some(raw) = non_blank(primary).or_else(|| non_blank(fallback)) else {
        return Ok(None);
    };
    let value = secret::resolve(&raw).map_err(|message| ConfigError::Secret { name, message })?;
    Ok(non_blank(Some(value)))
}

fn clean_scopes(scopes: Vec<String>) -> Vec<String> {
    scopes
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_redirect_uri(value: &str) -> ConfigResult<Url> {
    let invalid = |message: String| ConfigError::InvalidValue {
        name: "GOOGLE_REDIRECT_URI",
        message,
    };
    let url = Url::parse(value).map_err(|e| invalid(format!("{}: {}", value, e)))?;
    if url.scheme() != "http" {
        return Err(invalid(format!("{}: only http loopback redirects are supported", value)));
    }
    if url.host_str().is_none() {
        return Err(invalid(format!("{}: missing host", value)));
    }
    Ok(url)
}

fn positive_secs(name: &'static str, value: Option<u64>, default: u64) -> ConfigResult<Duration> {
    match value.unwrap_or(default) {
        0 => Err(ConfigError::InvalidValue {
            name,
            message: "must be greater than zero".to_string(),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}
