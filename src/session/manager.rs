//! Refresh manager for a single access/refresh token pair.
//!
//! Invariants:
//! - at most one refresh network call is outstanding; concurrent callers share
//!   its result through a `watch` channel,
//! - at most one refresh timer is armed; arming aborts the previous one,
//! - a completed refresh leaves either a full pair or nothing in the store.
//!
//! The refresh itself runs in its own task so a caller that stops waiting
//! cannot cancel work other callers depend on.

use super::token::{clear_pair, load_access_token, load_pair, load_refresh_token, save_pair};
use super::{SessionError, TokenPair};
use crate::provider::{ProviderClient, ProviderError};
use crate::store::KeyValueStore;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Refresh ten minutes ahead of a one-hour token lifetime.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(50 * 60);

type RefreshResult = Result<TokenPair, SessionError>;
type RefreshSlot = Option<watch::Receiver<Option<RefreshResult>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No timer armed and no refresh in flight.
    Idle,
    /// A refresh timer is armed.
    Scheduled,
    /// A refresh call is outstanding.
    Refreshing,
}

/// Options for [`SessionRefreshManager::make_authenticated_request`].
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            body: None,
            headers: Vec::new(),
        }
    }
}

impl RequestOptions {
    #[must_use]
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

struct Inner {
    provider: ProviderClient,
    store: Arc<dyn KeyValueStore>,
    refresh_interval: Duration,
    in_flight: Mutex<RefreshSlot>,
    timer: Mutex<TimerSlot>,
    /// Bumped by sign-in and sign-out. A refresh only commits its outcome to
    /// the store while holding this lock with the epoch it started under.
    epoch: Mutex<u64>,
}

/// The armed timer, tagged with a generation so a timer that already woke up
/// can tell whether it was superseded.
#[derive(Default)]
struct TimerSlot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl TimerSlot {
    fn disarm(&mut self) -> bool {
        self.generation = self.generation.wrapping_add(1);
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        lock(&self.timer).disarm();
    }
}

/// Keeps a valid access token available without callers reasoning about
/// expiry. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionRefreshManager {
    inner: Arc<Inner>,
}

impl SessionRefreshManager {
    #[must_use]
    pub fn new(
        provider: ProviderClient,
        store: Arc<dyn KeyValueStore>,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                store,
                refresh_interval,
                in_flight: Mutex::new(None),
                timer: Mutex::new(TimerSlot::default()),
                epoch: Mutex::new(0),
            }),
        }
    }

    #[must_use]
    pub fn provider(&self) -> &ProviderClient {
        &self.inner.provider
    }

    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        self.inner.refresh_interval
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        if lock(&self.inner.in_flight).is_some() {
            SessionState::Refreshing
        } else if self.is_refresh_scheduled() {
            SessionState::Scheduled
        } else {
            SessionState::Idle
        }
    }

    #[must_use]
    pub fn is_refresh_scheduled(&self) -> bool {
        lock(&self.inner.timer)
            .handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Returns the stored pair, or `None` if either half is missing.
    ///
    /// # Errors
    /// Returns `SessionError::Store` if the store cannot be read.
    pub fn current_tokens(&self) -> Result<Option<TokenPair>, SessionError> {
        Ok(load_pair(self.inner.store.as_ref())?)
    }

    /// # Errors
    /// Returns `SessionError::Store` if the store cannot be read.
    pub fn is_authenticated(&self) -> Result<bool, SessionError> {
        Ok(self.current_tokens()?.is_some())
    }

    /// Arms a one-shot timer that refreshes the session after the configured
    /// interval. Any previously armed timer is aborted.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule_refresh(&self) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let interval = self.inner.refresh_interval;

        let mut slot = lock(&self.inner.timer);
        slot.disarm();
        let generation = slot.generation;

        slot.handle = Some(tokio::spawn(async move {
            sleep(interval).await;

            let Some(inner) = weak.upgrade() else {
                return;
            };

            {
                let mut slot = lock(&inner.timer);
                if slot.generation != generation {
                    return;
                }
                // fired: the slot no longer holds an armed timer
                slot.handle = None;
            }

            debug!("scheduled token refresh firing");

            let manager = SessionRefreshManager { inner };
            if let Err(e) = manager.refresh_access_token().await {
                warn!("scheduled token refresh failed: {e}");
            }
        }));

        debug!(
            "token refresh scheduled in {} seconds",
            interval.as_secs()
        );
    }

    /// Disarms the refresh timer, if any. A refresh already in flight is not
    /// affected.
    pub fn cancel_scheduled_refresh(&self) {
        if lock(&self.inner.timer).disarm() {
            debug!("scheduled token refresh cancelled");
        }
    }

    /// Refreshes the token pair, joining the in-flight refresh when there is
    /// one.
    ///
    /// # Errors
    /// - `SessionError::NoRefreshToken` when nothing is stored,
    /// - `SessionError::RefreshFailed` when the provider rejected the token or
    ///   could not be reached; both tokens have been cleared,
    /// - `SessionError::Store` when the store failed.
    pub async fn refresh_access_token(&self) -> Result<TokenPair, SessionError> {
        let mut rx = {
            let mut slot = lock(&self.inner.in_flight);
            if let Some(rx) = slot.as_ref() {
                debug!("joining in-flight token refresh");
                rx.clone()
            } else {
                let (tx, rx) = watch::channel(None);
                *slot = Some(rx.clone());

                let epoch = *lock(&self.inner.epoch);
                let manager = self.clone();
                tokio::spawn(async move {
                    let result = manager.perform_token_refresh(epoch).await;
                    // Clear before publishing so the next caller starts fresh.
                    lock(&manager.inner.in_flight).take();
                    let _ = tx.send(Some(result));
                });

                rx
            }
        };

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        };

        outcome.unwrap_or_else(|| {
            Err(SessionError::RefreshFailed(
                "refresh task ended without a result".to_string(),
            ))
        })
    }

    #[instrument(skip(self))]
    async fn perform_token_refresh(&self, epoch: u64) -> RefreshResult {
        let store = self.inner.store.as_ref();

        let Some(refresh_token) = load_refresh_token(store)? else {
            let _session = self.session_guard(epoch)?;
            warn!("no refresh token stored, sign-in required");
            self.purge_session();
            return Err(SessionError::NoRefreshToken);
        };

        let outcome = self.inner.provider.refresh(&refresh_token).await;

        let _session = self.session_guard(epoch)?;

        match outcome {
            Ok(pair) => {
                if let Err(e) = save_pair(store, &pair) {
                    error!("failed to persist refreshed tokens: {e}");
                    self.purge_session();
                    return Err(e.into());
                }

                self.schedule_refresh();
                info!("access token refreshed");

                Ok(pair)
            }
            Err(e) => {
                error!("token refresh failed: {e}");
                self.purge_session();

                Err(SessionError::RefreshFailed(e.to_string()))
            }
        }
    }

    /// Locks the session epoch, failing when a sign-in or sign-out happened
    /// since `epoch` was read. Store writes by a refresh happen under this guard.
    fn session_guard(&self, epoch: u64) -> Result<MutexGuard<'_, u64>, SessionError> {
        let guard = lock(&self.inner.epoch);
        if *guard == epoch {
            Ok(guard)
        } else {
            warn!("session changed during token refresh, discarding its outcome");
            Err(SessionError::RefreshFailed(
                "session ended during refresh".to_string(),
            ))
        }
    }

    /// Locks the session epoch and starts a new one, invalidating refreshes
    /// that are still in flight.
    fn begin_session_change(&self) -> MutexGuard<'_, u64> {
        let mut guard = lock(&self.inner.epoch);
        *guard = guard.wrapping_add(1);
        guard
    }

    /// Sends `target` with the stored access token. On `401` the session is
    /// refreshed once and the request retried once; the retry's response is
    /// returned whatever its status.
    ///
    /// `target` is either an absolute URL or a path below the API base.
    ///
    /// # Errors
    /// - `SessionError::SessionExpired` when the request was unauthorized and
    ///   the refresh failed; the caller should route to sign-in,
    /// - `SessionError::Request` on transport failure,
    /// - `SessionError::Store` when the store failed.
    #[instrument(skip(self, options), fields(method = %options.method))]
    pub async fn make_authenticated_request(
        &self,
        target: &str,
        options: &RequestOptions,
    ) -> Result<Response, SessionError> {
        let url = self.inner.provider.endpoints().resolve(target);
        let access_token = load_access_token(self.inner.store.as_ref())?;

        let response = self
            .send_authenticated(&url, options, access_token.as_ref())
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        info!(url = %url, "request unauthorized, refreshing session");

        let pair = match self.refresh_access_token().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("session refresh after 401 failed: {e}");
                return Err(SessionError::SessionExpired);
            }
        };

        self.send_authenticated(&url, options, Some(&pair.access_token))
            .await
    }

    async fn send_authenticated(
        &self,
        url: &str,
        options: &RequestOptions,
        access_token: Option<&SecretString>,
    ) -> Result<Response, SessionError> {
        let mut builder = self
            .inner
            .provider
            .http()
            .request(options.method.clone(), url)
            .header(CONTENT_TYPE, "application/json");

        if let Some(token) = access_token {
            builder = builder.bearer_auth(token.expose_secret());
        }

        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = &options.body {
            builder = builder.json(body);
        }

        builder
            .send()
            .await
            .map_err(|e| SessionError::Request(format!("{url}: {e}")))
    }

    /// Waits once, bounded by `limit`, for the provider's health endpoint.
    ///
    /// # Errors
    /// Returns `SessionError::ProviderUnavailable` when it never answered.
    pub async fn wait_for_provider(&self, limit: Duration) -> Result<(), SessionError> {
        self.inner
            .provider
            .wait_until_ready(limit)
            .await
            .map_err(|e| SessionError::ProviderUnavailable(e.to_string()))
    }

    /// Arms the refresh timer when a full pair is stored. Returns whether a
    /// timer was armed.
    ///
    /// # Errors
    /// Returns `SessionError::Store` if the store cannot be read.
    pub fn initialize_token_management(&self) -> Result<bool, SessionError> {
        if self.current_tokens()?.is_some() {
            self.schedule_refresh();
            info!("stored session found, token refresh scheduled");
            Ok(true)
        } else {
            debug!("no stored session, nothing to schedule");
            Ok(false)
        }
    }

    /// Signs in through the provider, persists the pair and arms the timer.
    /// The store is untouched when the provider rejects the credentials. A
    /// refresh still in flight cannot overwrite or purge the new pair.
    ///
    /// # Errors
    /// - `SessionError::SignInRejected` when the provider refused,
    /// - `SessionError::Request` on transport failure,
    /// - `SessionError::Store` when the store failed.
    #[instrument(skip_all)]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<TokenPair, SessionError> {
        let pair = self
            .inner
            .provider
            .login(email, password)
            .await
            .map_err(|e| match e {
                ProviderError::Network(e) => SessionError::Request(format!("network error: {e}")),
                other => SessionError::SignInRejected(other.to_string()),
            })?;

        {
            let _session = self.begin_session_change();
            save_pair(self.inner.store.as_ref(), &pair)?;
            self.schedule_refresh();
        }

        info!("signed in");

        Ok(pair)
    }

    /// Notifies the provider (best effort), then clears the local session.
    /// A refresh still in flight is discarded instead of restoring the pair.
    ///
    /// # Errors
    /// Returns `SessionError::Store` only if the store itself fails.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        let store = self.inner.store.as_ref();

        drop(self.begin_session_change());

        if let Some(pair) = load_pair(store)? {
            if let Err(e) = self.inner.provider.logout(&pair).await {
                warn!("logout request failed, clearing local session anyway: {e}");
            }
        }

        {
            let _session = self.begin_session_change();
            self.cancel_scheduled_refresh();
            clear_pair(store)?;
        }

        info!("signed out");

        Ok(())
    }

    /// Forces re-authentication: drops both tokens and the timer.
    fn purge_session(&self) {
        if let Err(e) = clear_pair(self.inner.store.as_ref()) {
            error!("failed to clear stored tokens: {e}");
        }
        self.cancel_scheduled_refresh();
    }
}

impl std::fmt::Debug for SessionRefreshManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRefreshManager")
            .field("provider", &self.inner.provider)
            .field("refresh_interval", &self.inner.refresh_interval)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
