//! # Sessionkeeper (client-side session lifecycle)
//!
//! `sessionkeeper` keeps an access/refresh token pair alive against a hosted
//! identity provider. Credential checks, token issuance and payments stay with
//! the hosted services; this crate only owns the lifecycle around the tokens.
//!
//! ## Session refresh
//!
//! [`session::SessionRefreshManager`] persists the current pair in a
//! [`store::KeyValueStore`] under the keys `access_token` and `refresh_token`,
//! arms a single background refresh before the access token expires, and
//! coalesces concurrent refresh requests so that only one network call is ever
//! outstanding.
//!
//! - **Single timer:** arming a refresh always cancels the previous one.
//! - **Forced sign-out:** a rejected refresh clears both tokens and disarms the
//!   timer; callers must authenticate again.
//! - **Single retry:** an authenticated request that receives `401` triggers one
//!   refresh and one retry, never more.
//!
//! ## Provider
//!
//! [`provider::ProviderClient`] wraps the identity provider's HTTP endpoints
//! (login, refresh, logout, health). Readiness is probed once with a bounded
//! timeout instead of being polled from every call site.

pub mod cli;
pub mod provider;
pub mod session;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
