use crate::store::{KeyValueStore, StoreError};
use secrecy::{ExposeSecret, SecretString};
use tracing::error;

/// Store key holding the short-lived bearer credential.
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Store key holding the credential exchanged for a new pair.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// An access/refresh token pair. Both halves always travel together.
#[derive(Clone)]
pub struct TokenPair {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            refresh_token: SecretString::from(refresh_token.into()),
        }
    }
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"***")
            .field("refresh_token", &"***")
            .finish()
    }
}

/// Reads the stored pair. A partial pair is treated as absent.
///
/// # Errors
/// Returns `StoreError` if the store cannot be read.
pub fn load_pair(store: &dyn KeyValueStore) -> Result<Option<TokenPair>, StoreError> {
    let access = store.get(ACCESS_TOKEN_KEY)?.filter(|token| !token.is_empty());
    let refresh = store.get(REFRESH_TOKEN_KEY)?.filter(|token| !token.is_empty());

    Ok(match (access, refresh) {
        (Some(access), Some(refresh)) => Some(TokenPair::new(access, refresh)),
        _ => None,
    })
}

/// # Errors
/// Returns `StoreError` if the store cannot be read.
pub fn load_refresh_token(store: &dyn KeyValueStore) -> Result<Option<SecretString>, StoreError> {
    Ok(store
        .get(REFRESH_TOKEN_KEY)?
        .filter(|token| !token.is_empty())
        .map(SecretString::from))
}

/// # Errors
/// Returns `StoreError` if the store cannot be read.
pub fn load_access_token(store: &dyn KeyValueStore) -> Result<Option<SecretString>, StoreError> {
    Ok(store
        .get(ACCESS_TOKEN_KEY)?
        .filter(|token| !token.is_empty())
        .map(SecretString::from))
}

/// Persists both halves of `pair`. If the second write fails the first one is
/// rolled back so the store never holds a partial pair.
///
/// # Errors
/// Returns `StoreError` if the store cannot be written.
pub fn save_pair(store: &dyn KeyValueStore, pair: &TokenPair) -> Result<(), StoreError> {
    store.set(ACCESS_TOKEN_KEY, pair.access_token.expose_secret())?;
    if let Err(e) = store.set(REFRESH_TOKEN_KEY, pair.refresh_token.expose_secret()) {
        if let Err(rollback) = clear_pair(store) {
            error!("failed to roll back partial token pair: {rollback}");
        }
        return Err(e);
    }
    Ok(())
}

/// # Errors
/// Returns `StoreError` if the store cannot be written.
pub fn clear_pair(store: &dyn KeyValueStore) -> Result<(), StoreError> {
    let access = store.remove(ACCESS_TOKEN_KEY);
    let refresh = store.remove(REFRESH_TOKEN_KEY);
    access.and(refresh)
}
