//! Settings resolution, secret references and tracing setup

pub mod config;
pub mod credentials;
pub mod secret;
pub mod tracing;

pub use config::{
    ConfigError, ConfigResult, FileConfig, Settings, SettingsOverrides, DEFAULT_CALENDAR_ID,
    DEFAULT_REDIRECT_URI, DEFAULT_SCOPE, DEFAULT_USER_ID,
};
pub use credentials::ClientCredentials;
pub use tracing::{init_tracing, level_from_name, TracingConfig, TracingError, TracingOutputFormat};
