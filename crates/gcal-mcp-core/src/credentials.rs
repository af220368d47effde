//! Google Cloud Console client credential files.

use std::fmt;
use std::path::Path;

use serde::Deserialize;

/// OAuth client id and secret as downloaded from the Cloud Console.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Accepts `{"installed": {...}}`, `{"web": {...}}` or a flat object.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<Section>,
    web: Option<Section>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Section {
    client_id: String,
    client_secret: String,
}

impl ClientCredentials {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| format!("failed to read credentials file: {}", e))?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, String> {
        let file: CredentialsFile = serde_json::from_str(json)
            .map_err(|e| format!("failed to parse credentials JSON: {}", e))?;

        if let Some(section) = file.installed.or(file.web) {
            return Ok(Self {
                client_id: section.client_id,
                client_secret: section.client_secret,
            });
        }

        match (file.client_id, file.client_secret) {
            (Some(client_id), Some(client_secret)) => Ok(Self {
                client_id,
                client_secret,
            }),
            _ => Err(
                "expected an 'installed' or 'web' section, or top-level client_id/client_secret"
                    .to_string(),
            ),
        }
    }
}
