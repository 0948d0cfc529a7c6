use super::{SessionError, TokenPair};
use secrecy::ExposeSecret;
use serde::Serialize;

/// Structured outcome of a refresh, in the shape callers of the web client
/// expect: `{ success, accessToken?, refreshToken?, error?, reason? }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl From<&Result<TokenPair, SessionError>> for RefreshReport {
    fn from(result: &Result<TokenPair, SessionError>) -> Self {
        match result {
            Ok(pair) => Self {
                success: true,
                access_token: Some(pair.access_token.expose_secret().to_string()),
                refresh_token: Some(pair.refresh_token.expose_secret().to_string()),
                error: None,
                reason: None,
            },
            Err(e) => Self {
                success: false,
                access_token: None,
                refresh_token: None,
                error: Some(e.to_string()),
                reason: Some(e.code()),
            },
        }
    }
}

impl RefreshReport {
    /// Drops the token values, keeping only the outcome.
    #[must_use]
    pub fn without_tokens(mut self) -> Self {
        self.access_token = None;
        self.refresh_token = None;
        self
    }
}
