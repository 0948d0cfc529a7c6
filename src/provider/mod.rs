//! HTTP client for the hosted identity provider. The provider owns every
//! credential check; this module only shapes requests, attaches the
//! anti-forgery header and decodes the `{ success, message, data }` envelope.
//! Token material must never be logged here.

mod endpoints;

pub use endpoints::{
    ProviderEndpoints, DEFAULT_HEALTH_PATH, DEFAULT_LOGIN_PATH, DEFAULT_LOGOUT_PATH,
    DEFAULT_REFRESH_PATH,
};

use crate::session::TokenPair;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, info_span, instrument, warn, Instrument};

/// Header carrying the anti-forgery token on state-changing auth calls.
pub const CSRF_HEADER: &str = "X-CSRF-Token";

/// Default connect timeout (TCP handshake + TLS).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default total request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of error body characters carried into error messages.
const MAX_ERROR_CHARS: usize = 200;

/// Upper bound for the readiness probe backoff.
const MAX_READY_BACKOFF_SECS: u64 = 4;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{status}: {message}")]
    Http { status: StatusCode, message: String },

    #[error("{0}")]
    Rejected(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Unavailable(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    message: Option<String>,
    data: Option<EnvelopeTokens>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeTokens {
    access_token: String,
    refresh_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LogoutRequest<'a> {
    access_token: &'a str,
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Builds the HTTP client shared by every provider call and by
/// authenticated requests.
///
/// # Errors
/// Returns an error if the TLS backend cannot be initialized.
pub fn build_client(
    connect_timeout: Duration,
    request_timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(crate::APP_USER_AGENT)
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .build()
}

#[derive(Clone)]
pub struct ProviderClient {
    http: Client,
    endpoints: ProviderEndpoints,
    csrf_token: Option<SecretString>,
}

impl ProviderClient {
    #[must_use]
    pub fn new(http: Client, endpoints: ProviderEndpoints) -> Self {
        Self {
            http,
            endpoints,
            csrf_token: None,
        }
    }

    #[must_use]
    pub fn with_csrf_token(mut self, token: Option<SecretString>) -> Self {
        self.csrf_token = token;
        self
    }

    #[must_use]
    pub const fn http(&self) -> &Client {
        &self.http
    }

    #[must_use]
    pub const fn endpoints(&self) -> &ProviderEndpoints {
        &self.endpoints
    }

    /// Exchanges a refresh token for a new pair.
    ///
    /// # Errors
    /// Returns `ProviderError` on transport failure, a non-2xx status,
    /// `success: false`, or a response without token data.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenPair, ProviderError> {
        let url = self.endpoints.refresh_url();
        let body = RefreshRequest {
            refresh_token: refresh_token.expose_secret(),
        };

        let span = info_span!("provider.refresh", http.method = "POST", url = %url);
        let response = self
            .with_csrf(self.http.post(url).json(&body))
            .send()
            .instrument(span)
            .await?;

        token_envelope(response).await
    }

    /// Signs in through the backend-proxied login endpoint.
    ///
    /// # Errors
    /// Returns `ProviderError` on transport failure or when the provider
    /// rejects the credentials.
    #[instrument(skip_all)]
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, ProviderError> {
        let url = self.endpoints.login_url();
        let body = LoginRequest { email, password };

        let span = info_span!("provider.login", http.method = "POST", url = %url);
        let response = self
            .with_csrf(self.http.post(url).json(&body))
            .send()
            .instrument(span)
            .await?;

        token_envelope(response).await
    }

    /// Revokes `pair` on the provider side.
    ///
    /// # Errors
    /// Returns `ProviderError` on transport failure or a non-2xx status.
    #[instrument(skip(self, pair))]
    pub async fn logout(&self, pair: &TokenPair) -> Result<(), ProviderError> {
        let url = self.endpoints.logout_url();
        let body = LogoutRequest {
            access_token: pair.access_token.expose_secret(),
            refresh_token: pair.refresh_token.expose_secret(),
        };

        let span = info_span!("provider.logout", http.method = "POST", url = %url);
        let response = self
            .with_csrf(self.http.post(url).json(&body))
            .send()
            .instrument(span)
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(http_error(response).await)
        }
    }

    /// Single health probe.
    ///
    /// # Errors
    /// Returns `ProviderError` unless the health endpoint answers 2xx.
    pub async fn health(&self) -> Result<(), ProviderError> {
        let response = self.http.get(self.endpoints.health_url()).send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(http_error(response).await)
        }
    }

    /// Probes the health endpoint with exponential backoff until it answers
    /// 2xx or `limit` elapses. Meant to be called once at startup.
    ///
    /// # Errors
    /// Returns `ProviderError::Unavailable` when the provider did not become
    /// ready in time.
    #[instrument(skip(self))]
    pub async fn wait_until_ready(&self, limit: Duration) -> Result<(), ProviderError> {
        let mut last_error: Option<String> = None;

        let probe = async {
            let mut attempt: u32 = 0;
            loop {
                attempt += 1;
                match self.health().await {
                    Ok(()) => return attempt,
                    Err(e) => {
                        let backoff = 2u64.saturating_pow(attempt - 1).min(MAX_READY_BACKOFF_SECS);
                        warn!(attempt, "identity provider not ready: {e}, retrying in {backoff}s");
                        last_error = Some(e.to_string());
                        sleep(Duration::from_secs(backoff)).await;
                    }
                }
            }
        };

        let outcome = timeout(limit, probe).await;

        match outcome {
            Ok(attempts) => {
                info!(attempts, "identity provider ready");
                Ok(())
            }
            Err(_) => Err(ProviderError::Unavailable(format!(
                "{} did not become ready within {}s{}",
                self.endpoints.health_url(),
                limit.as_secs(),
                last_error.map_or_else(String::new, |e| format!(" (last error: {e})"))
            ))),
        }
    }

    fn with_csrf(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.csrf_token {
            Some(token) => builder.header(CSRF_HEADER, token.expose_secret()),
            None => builder,
        }
    }
}

impl std::fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient")
            .field("endpoints", &self.endpoints)
            .field("csrf_token", &self.csrf_token.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

/// Decodes the token envelope shared by login and refresh.
async fn token_envelope(response: Response) -> Result<TokenPair, ProviderError> {
    if !response.status().is_success() {
        return Err(http_error(response).await);
    }

    let envelope: Envelope = response
        .json()
        .await
        .map_err(|e| ProviderError::InvalidResponse(format!("failed to decode response: {e}")))?;

    if !envelope.success {
        return Err(ProviderError::Rejected(
            envelope
                .message
                .unwrap_or_else(|| "request rejected by identity provider".to_string()),
        ));
    }

    let tokens = envelope
        .data
        .ok_or_else(|| ProviderError::InvalidResponse("no token data in response".to_string()))?;

    if tokens.access_token.is_empty() || tokens.refresh_token.is_empty() {
        return Err(ProviderError::InvalidResponse(
            "empty token in response".to_string(),
        ));
    }

    debug!("token envelope decoded");

    Ok(TokenPair::new(tokens.access_token, tokens.refresh_token))
}

/// Maps a non-2xx response, preferring the envelope message when present.
async fn http_error(response: Response) -> ProviderError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let message = serde_json::from_str::<Envelope>(&body)
        .ok()
        .and_then(|envelope| envelope.message)
        .unwrap_or(body);

    ProviderError::Http {
        status,
        message: sanitize_body(&message),
    }
}

fn sanitize_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "request failed".to_string()
    } else {
        trimmed.chars().take(MAX_ERROR_CHARS).collect()
    }
}
