use crate::provider::{
    build_client, ProviderClient, ProviderEndpoints, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_HEALTH_PATH, DEFAULT_LOGIN_PATH, DEFAULT_LOGOUT_PATH,
    DEFAULT_REFRESH_PATH,
};
use crate::session::{SessionRefreshManager, DEFAULT_REFRESH_INTERVAL};
use crate::store::FileStore;
use anyhow::Result;
use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub api_url: Url,
    pub store_path: PathBuf,
    pub refresh_interval: Duration,
    pub csrf_token: Option<SecretString>,
    pub refresh_path: String,
    pub login_path: String,
    pub logout_path: String,
    pub health_path: String,
    pub ready_timeout: Duration,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            store_path: PathBuf::from(crate::cli::commands::provider::DEFAULT_STORE),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            csrf_token: None,
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            logout_path: DEFAULT_LOGOUT_PATH.to_string(),
            health_path: DEFAULT_HEALTH_PATH.to_string(),
            ready_timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn endpoints(&self) -> ProviderEndpoints {
        ProviderEndpoints::from_base(&self.api_url)
            .with_refresh_path(&self.refresh_path)
            .with_login_path(&self.login_path)
            .with_logout_path(&self.logout_path)
            .with_health_path(&self.health_path)
    }

    /// Builds the refresh manager backed by the on-disk token store.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn manager(&self) -> Result<SessionRefreshManager> {
        let http = build_client(DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)?;
        let provider =
            ProviderClient::new(http, self.endpoints()).with_csrf_token(self.csrf_token.clone());
        let store = Arc::new(FileStore::new(self.store_path.clone()));

        Ok(SessionRefreshManager::new(
            provider,
            store,
            self.refresh_interval,
        ))
    }
}
