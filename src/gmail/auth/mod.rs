
use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::GMAIL_READONLY_SCOPE;
use crate::config::Config;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Refresh this long before the recorded expiry to avoid using a token
/// that dies mid-request.
const EXPIRY_MARGIN_SECONDS: i64 = 60;

/// Contents of the `installed` key of a Google OAuth client secrets file.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: ClientSecrets,
}

/// Cached OAuth tokens, persisted as `token.json` in the config dir.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
}

impl StoredToken {
    /// Whether the access token is still safe to use.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.expiry.is_none_or(|expiry| {
            Utc::now() + ChronoDuration::seconds(EXPIRY_MARGIN_SECONDS) < expiry
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

/// Handles the OAuth installed-app dance: token cache, refresh, and the
/// one-time browser consent flow with a loopback redirect.
pub struct GmailAuthenticator {
    secrets: ClientSecrets,
    token_path: PathBuf,
    redirect_port: u16,
    agent: ureq::Agent,
}

impl GmailAuthenticator {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let secrets = load_client_secrets(&config.credentials_path())?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            secrets,
            token_path: config.token_path(),
            redirect_port: config.gmail.redirect_port,
            agent,
        })
    }

    /// Point the token endpoint elsewhere. Used by tests.
    #[inline]
    pub fn with_token_uri(mut self, token_uri: String) -> Self {
        self.secrets.token_uri = token_uri;
        self
    }

    /// Produce a usable access token: cached, refreshed, or newly minted
    /// via the consent flow.
    #[inline]
    pub fn access_token(&self) -> Result<String> {
        match self.cached_access_token() {
            Ok(token) => Ok(token),
            Err(e) => {
                warn!("Cached token unusable, starting consent flow: {:#}", e);
                let token = self.run_consent_flow()?;
                self.persist(&token)?;
                Ok(token.access_token)
            }
        }
    }

    /// Produce an access token without ever starting the interactive consent
    /// flow. Fails when no token is cached or the cached one cannot be
    /// refreshed; callers that cannot talk to a browser (the web server) use
    /// this and tell the user to run the fetch command instead.
    #[inline]
    pub fn cached_access_token(&self) -> Result<String> {
        let Some(token) = self.load_cached_token() else {
            return Err(anyhow::anyhow!(
                "No Gmail token cached. Run the fetch command once to authorize."
            ));
        };

        if token.is_valid() {
            debug!("Using cached access token");
            return Ok(token.access_token);
        }

        let refresh_token = token.refresh_token.ok_or_else(|| {
            anyhow::anyhow!(
                "Cached Gmail token expired and has no refresh token. \
                 Run the fetch command to re-authorize."
            )
        })?;

        debug!("Cached token expired, refreshing");
        let refreshed = self
            .refresh(&refresh_token)
            .context("Gmail token refresh failed. Run the fetch command to re-authorize.")?;
        self.persist(&refreshed)?;
        Ok(refreshed.access_token)
    }

    /// Whether a cached token exists at all (used by status reporting).
    #[inline]
    pub fn has_cached_token(&self) -> bool {
        self.token_path.exists()
    }

    fn load_cached_token(&self) -> Option<StoredToken> {
        let content = fs::read_to_string(&self.token_path).ok()?;
        match serde_json::from_str(&content) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!("Ignoring unreadable token cache: {}", e);
                None
            }
        }
    }

    fn persist(&self, token: &StoredToken) -> Result<()> {
        if let Some(parent) = self.token_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create token directory: {}", parent.display())
            })?;
        }

        let content =
            serde_json::to_string_pretty(token).context("Failed to serialize token cache")?;
        fs::write(&self.token_path, content).with_context(|| {
            format!("Failed to write token cache: {}", self.token_path.display())
        })?;

        debug!("Persisted token cache to {}", self.token_path.display());
        Ok(())
    }

    fn refresh(&self, refresh_token: &str) -> Result<StoredToken> {
        let response_text = self
            .agent
            .post(&self.secrets.token_uri)
            .send_form([
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.secrets.client_id.as_str()),
                ("client_secret", self.secrets.client_secret.as_str()),
            ])
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .context("Token refresh request failed")?;

        let response: TokenResponse =
            serde_json::from_str(&response_text).context("Failed to parse token response")?;

        info!("Refreshed Gmail access token");

        Ok(StoredToken {
            access_token: response.access_token,
            // Google omits the refresh token on refresh responses; keep the old one
            refresh_token: response
                .refresh_token
                .or_else(|| Some(refresh_token.to_string())),
            expiry: response
                .expires_in
                .map(|seconds| Utc::now() + ChronoDuration::seconds(seconds)),
            scopes: vec![GMAIL_READONLY_SCOPE.to_string()],
        })
    }

    fn run_consent_flow(&self) -> Result<StoredToken> {
        let redirect_uri = format!("http://127.0.0.1:{}", self.redirect_port);

        let auth_url = Url::parse_with_params(
            &self.secrets.auth_uri,
            [
                ("client_id", self.secrets.client_id.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", GMAIL_READONLY_SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .context("Failed to build authorization URL")?;

        eprintln!("Open this URL in your browser to authorize Gmail access:");
        eprintln!();
        eprintln!("  {}", auth_url);
        eprintln!();
        eprintln!("Waiting for the redirect on {} ...", redirect_uri);

        let code = wait_for_authorization_code(self.redirect_port)?;
        info!("Received authorization code, exchanging for tokens");

        self.exchange_code(&code, &redirect_uri)
    }

    fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<StoredToken> {
        let response_text = self
            .agent
            .post(&self.secrets.token_uri)
            .send_form([
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.secrets.client_id.as_str()),
                ("client_secret", self.secrets.client_secret.as_str()),
                ("redirect_uri", redirect_uri),
            ])
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .context("Authorization code exchange failed")?;

        let response: TokenResponse =
            serde_json::from_str(&response_text).context("Failed to parse token response")?;

        Ok(StoredToken {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expiry: response
                .expires_in
                .map(|seconds| Utc::now() + ChronoDuration::seconds(seconds)),
            scopes: vec![GMAIL_READONLY_SCOPE.to_string()],
        })
    }
}

fn load_client_secrets(path: &std::path::Path) -> Result<ClientSecrets> {
    let content = fs::read_to_string(path).with_context(|| {
        format!(
            "Failed to read OAuth client secrets: {} (download credentials.json from the Google Cloud console)",
            path.display()
        )
    })?;

    let file: ClientSecretsFile =
        serde_json::from_str(&content).context("Failed to parse OAuth client secrets file")?;

    Ok(file.installed)
}

/// Block on the loopback listener until Google redirects the browser back
/// with an authorization code.
fn wait_for_authorization_code(port: u16) -> Result<String> {
    let listener = TcpListener::bind(("127.0.0.1", port))
        .with_context(|| format!("Failed to bind OAuth redirect listener on port {}", port))?;

    let (mut stream, _) = listener
        .accept()
        .context("Failed to accept OAuth redirect connection")?;

    let mut reader = BufReader::new(
        stream
            .try_clone()
            .context("Failed to clone redirect stream")?,
    );
    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .context("Failed to read OAuth redirect request")?;

    let code = parse_code_from_request_line(&request_line);

    let body = match &code {
        Ok(_) => "Authorization complete. You can close this tab and return to the terminal.",
        Err(_) => "Authorization failed. Check the terminal for details.",
    };
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    stream
        .write_all(response.as_bytes())
        .context("Failed to respond to OAuth redirect")?;

    code
}

fn parse_code_from_request_line(request_line: &str) -> Result<String> {
    let path = request_line
        .split_whitespace()
        .nth(1)
        .context("Malformed OAuth redirect request")?;

    let url = Url::parse(&format!("http://127.0.0.1{}", path))
        .context("Failed to parse OAuth redirect URL")?;

    if let Some((_, error)) = url.query_pairs().find(|(k, _)| k == "error") {
        return Err(anyhow::anyhow!("Authorization was denied: {}", error));
    }

    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .context("OAuth redirect did not include an authorization code")
}
