use crate::store::StoreError;
use thiserror::Error;

/// Failures surfaced by the session manager.
///
/// `Clone` so one coalesced refresh result can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Refresh attempted with nothing in the store; the user must sign in.
    #[error("no refresh token available")]
    NoRefreshToken,

    /// The provider rejected the refresh token or the call failed. Tokens have
    /// been purged by the time this is observed.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// A request was unauthorized and the follow-up refresh failed too.
    #[error("session expired, sign in again")]
    SessionExpired,

    #[error("sign-in rejected: {0}")]
    SignInRejected(String),

    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("session store error: {0}")]
    Store(String),
}

impl SessionError {
    /// True when the only way forward is a fresh sign-in.
    #[must_use]
    pub const fn requires_sign_in(&self) -> bool {
        matches!(
            self,
            Self::NoRefreshToken | Self::RefreshFailed(_) | Self::SessionExpired
        )
    }

    /// Stable machine-readable reason.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NoRefreshToken => "no_refresh_token",
            Self::RefreshFailed(_) => "refresh_failed",
            Self::SessionExpired => "session_expired",
            Self::SignInRejected(_) => "sign_in_rejected",
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::Request(_) => "request_failed",
            Self::Store(_) => "store_error",
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        Self::Store(e.to_string())
    }
}
