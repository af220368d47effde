//! OAuth 2.0 authorization code flow with PKCE against Google.
//!
//! The interactive grant listens on the configured loopback redirect URI,
//! sends the user to Google's consent page and exchanges the returned code
//! for tokens. Refresh and revocation are plain form posts.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use gcal_mcp_core::ClientCredentials;
use rand::Rng as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{OAuthError, RefreshFailed};
use crate::record::{CredentialRecord, GOOGLE_TOKEN_URL};

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";

/// Port used when the redirect URI does not carry one.
pub const DEFAULT_CALLBACK_PORT: u16 = 8081;

const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);
/// How long one callback connection may take to send its request line.
const CALLBACK_READ_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_REQUEST_LINE: u64 = 8192;
const CODE_VERIFIER_BYTES: usize = 32;
const STATE_BYTES: usize = 16;

const SUCCESS_PAGE: &str = "<html><body><h1>Authorization complete</h1>\
    <p>You can close this window and return to the terminal.</p></body></html>";
const FAILURE_PAGE: &str = "<html><body><h1>Authorization failed</h1>\
    <p>You can close this window.</p></body></html>";

/// OAuth client for Google's endpoints.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    auth_endpoint: String,
    token_endpoint: String,
    revoke_endpoint: String,
    redirect_uri: Url,
    callback_timeout: Duration,
    open_browser: bool,
}

impl OAuthClient {
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(redirect_uri: Url, request_timeout: Duration) -> Result<Self, OAuthError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(OAuthError::HttpClient)?;
        Ok(Self::with_http_client(http, redirect_uri))
    }

    pub fn with_http_client(http: reqwest::Client, redirect_uri: Url) -> Self {
        Self {
            http,
            auth_endpoint: GOOGLE_AUTH_URL.to_string(),
            token_endpoint: GOOGLE_TOKEN_URL.to_string(),
            revoke_endpoint: GOOGLE_REVOKE_URL.to_string(),
            redirect_uri,
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
            open_browser: true,
        }
    }

    /// Overrides the consent page and token endpoint used for new grants.
    #[must_use]
    pub fn with_endpoints(mut self, auth: impl Into<String>, token: impl Into<String>) -> Self {
        self.auth_endpoint = auth.into();
        self.token_endpoint = token.into();
        self
    }

    #[must_use]
    pub fn with_revoke_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.revoke_endpoint = endpoint.into();
        self
    }

    #[must_use]
    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_browser(mut self, open_browser: bool) -> Self {
        self.open_browser = open_browser;
        self
    }

    /// Runs the interactive grant and returns the resulting record.
    ///
    /// Nothing is persisted here. The listener is closed when this future
    /// completes or is dropped.
    pub async fn authorize(
        &self,
        client: &ClientCredentials,
        scopes: &[String],
    ) -> Result<CredentialRecord, OAuthError> {
        let pkce = Pkce::new();
        let listener = CallbackListener::bind(&self.redirect_uri).await?;
        let redirect_uri = self.redirect_uri.as_str();
        let auth_url =
            pkce.authorization_url(&self.auth_endpoint, &client.client_id, redirect_uri, scopes);

        eprintln!("\nOpen this URL in your browser to authorize calendar access:\n\n{}\n", auth_url);
        if self.open_browser
            && let Err(e) = open::that(auth_url.as_str())
        {
            warn!("failed to open browser: {}", e);
        }

        info!("waiting for authorization callback on {}", listener.addr);
        let code = tokio::time::timeout(self.callback_timeout, listener.accept_code(&pkce.state))
            .await
            .map_err(|_| OAuthError::CallbackTimeout(self.callback_timeout))??;

        info!("received authorization code, exchanging for tokens");
        self.exchange_code(client, &code, &pkce.verifier, scopes).await
    }

    /// Exchanges an authorization code for a new record.
    pub async fn exchange_code(
        &self,
        client: &ClientCredentials,
        code: &str,
        verifier: &str,
        scopes: &[String],
    ) -> Result<CredentialRecord, OAuthError> {
        let params = [
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        let response = self.post_token_form(&self.token_endpoint, &params).await?;

        let granted = response.granted_scopes().unwrap_or_else(|| scopes.to_vec());
        Ok(CredentialRecord::new(response.access_token, response.refresh_token)
            .with_token_endpoint(self.token_endpoint.as_str())
            .with_scopes(granted)
            .expiring_in(response.expires_in))
    }

    /// Mints a new access token from the record's refresh token.
    ///
    /// The returned record keeps the old refresh token unless the authority
    /// issued a new one.
    pub async fn refresh(
        &self,
        client: &ClientCredentials,
        record: &CredentialRecord,
    ) -> Result<CredentialRecord, RefreshFailed> {
        let refresh_token = record
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(OAuthError::MissingRefreshToken)?;

        let params = [
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        let response = self.post_token_form(&record.token_endpoint, &params).await?;

        let scopes = response
            .granted_scopes()
            .unwrap_or_else(|| record.scopes.clone());
        let refresh_token = response
            .refresh_token
            .or_else(|| record.refresh_token.clone());

        info!("refreshed access token");
        Ok(CredentialRecord::new(response.access_token, refresh_token)
            .with_token_endpoint(record.token_endpoint.as_str())
            .with_scopes(scopes)
            .expiring_in(response.expires_in))
    }

    /// Asks Google to invalidate `token` and the grant behind it.
    pub async fn revoke(&self, token: &str) -> Result<(), OAuthError> {
        let endpoint = self.revoke_endpoint.as_str();
        let response = self
            .http
            .post(endpoint)
            .form(&[("token", token)])
            .send()
            .await
            .map_err(|source| OAuthError::Network {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            info!("revoked grant");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(OAuthError::Rejected {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            message: error_summary(&body),
        })
    }

    async fn post_token_form(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<TokenResponse, OAuthError> {
        let response = self
            .http
            .post(endpoint)
            .form(params)
            .send()
            .await
            .map_err(|source| OAuthError::Network {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| OAuthError::Network {
                endpoint: endpoint.to_string(),
                source,
            })?;

        if !status.is_success() {
            return Err(OAuthError::Rejected {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                message: error_summary(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| OAuthError::InvalidResponse {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }
}

/// Successful token endpoint response.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn granted_scopes(&self) -> Option<Vec<String>> {
        let scopes: Vec<String> = self
            .scope
            .as_deref()?
            .split_whitespace()
            .map(str::to_string)
            .collect();
        (!scopes.is_empty()).then_some(scopes)
    }
}

/// Condenses an OAuth error body into `error: description`.
fn error_summary(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: String,
        #[serde(default)]
        error_description: Option<String>,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            error,
            error_description: Some(description),
        }) => format!("{}: {}", error, description),
        Ok(ErrorBody { error, .. }) => error,
        Err(_) => body.chars().take(200).collect(),
    }
}

// ---------------------------------------------------------------------------
// PKCE
// ---------------------------------------------------------------------------

/// Per-grant PKCE verifier/challenge pair and CSRF state (RFC 7636).
#[derive(Debug)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
    pub state: String,
}

impl Pkce {
    pub fn new() -> Self {
        let verifier = random_token(CODE_VERIFIER_BYTES);
        let challenge = challenge_for(&verifier);
        Self {
            verifier,
            challenge,
            state: random_token(STATE_BYTES),
        }
    }

    /// Consent page URL requesting offline access.
    pub fn authorization_url(
        &self,
        auth_endpoint: &str,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
            code_challenge={}&code_challenge_method=S256&state={}&\
            access_type=offline&prompt=consent",
            auth_endpoint,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes.join(" ")),
            urlencoding::encode(&self.challenge),
            urlencoding::encode(&self.state),
        )
    }
}

impl Default for Pkce {
    fn default() -> Self {
        Self::new()
    }
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

// ---------------------------------------------------------------------------
// Loopback callback
// ---------------------------------------------------------------------------

/// What the browser sent to the listener.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum CallbackRequest {
    Authorized { code: String, state: Option<String> },
    Denied(String),
    /// Right path, but neither a code nor an error.
    Incomplete,
    /// Another path, e.g. `/favicon.ico`.
    Unrelated,
}

/// Interprets the request line of a callback request.
pub(crate) fn parse_callback_request(request_line: &str, expected_path: &str) -> CallbackRequest {
    let mut parts = request_line.split_whitespace();
    let (Some("GET"), Some(target)) = (parts.next(), parts.next()) else {
        return CallbackRequest::Unrelated;
    };
    let Ok(url) = Url::parse(&format!("http://localhost{}", target)) else {
        return CallbackRequest::Unrelated;
    };
    if url.path() != expected_path {
        return CallbackRequest::Unrelated;
    }

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    match (error, code) {
        (Some(error), _) => CallbackRequest::Denied(error),
        (None, Some(code)) if !code.is_empty() => CallbackRequest::Authorized { code, state },
        _ => CallbackRequest::Incomplete,
    }
}

struct CallbackListener {
    listener: TcpListener,
    addr: String,
    path: String,
}

impl CallbackListener {
    /// Binds the redirect URI's host and port. `localhost` binds `127.0.0.1`.
    async fn bind(redirect_uri: &Url) -> Result<Self, OAuthError> {
        let host = match redirect_uri.host_str() {
            None | Some("localhost") => "127.0.0.1",
            Some(host) => host,
        };
        let port = redirect_uri.port().unwrap_or(DEFAULT_CALLBACK_PORT);
        let addr = format!("{}:{}", host, port);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| OAuthError::Listener {
                addr: addr.clone(),
                source,
            })?;
        debug!("callback listener bound on {}", addr);

        Ok(Self {
            listener,
            addr,
            path: redirect_uri.path().to_string(),
        })
    }

    /// Serves requests until one carries the authorization result.
    ///
    /// Connections are read concurrently, so an idle one (a browser
    /// preconnect, say) cannot hold back the redirect.
    async fn accept_code(self, expected_state: &str) -> Result<String, OAuthError> {
        let mut reads = JoinSet::new();
        loop {
            let read = tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted.map_err(|source| OAuthError::Listener {
                        addr: self.addr.clone(),
                        source,
                    })?;
                    debug!("callback connection from {}", peer);
                    reads.spawn(read_request_line(stream));
                    continue;
                }
                Some(read) = reads.join_next() => read,
            };

            let (request, mut stream) = match read {
                Ok(Ok(read)) => read,
                Ok(Err(e)) => {
                    debug!("dropping unreadable callback connection: {}", e);
                    continue;
                }
                Err(e) => {
                    debug!("callback reader failed: {}", e);
                    continue;
                }
            };

            match parse_callback_request(&request, &self.path) {
                CallbackRequest::Unrelated => {
                    respond(&mut stream, "404 Not Found", "").await;
                }
                CallbackRequest::Incomplete => {
                    respond(&mut stream, "400 Bad Request", FAILURE_PAGE).await;
                }
                CallbackRequest::Denied(error) => {
                    respond(&mut stream, "400 Bad Request", FAILURE_PAGE).await;
                    return Err(OAuthError::Denied(error));
                }
                CallbackRequest::Authorized { code, state } => {
                    if state.as_deref() != Some(expected_state) {
                        respond(&mut stream, "400 Bad Request", FAILURE_PAGE).await;
                        return Err(OAuthError::StateMismatch);
                    }
                    respond(&mut stream, "200 OK", SUCCESS_PAGE).await;
                    return Ok(code);
                }
            }
        }
    }
}

/// Reads at most [`MAX_REQUEST_LINE`] bytes of the first line.
async fn read_request_line(stream: TcpStream) -> std::io::Result<(String, TcpStream)> {
    let mut reader = BufReader::new(stream.take(MAX_REQUEST_LINE));
    let mut line = String::new();
    tokio::time::timeout(CALLBACK_READ_TIMEOUT, reader.read_line(&mut line))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "no request line"))??;
    Ok((line, reader.into_inner().into_inner()))
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!("failed to answer callback request: {}", e);
    }
    let _ = stream.shutdown().await;
}
