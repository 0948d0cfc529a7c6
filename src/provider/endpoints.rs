use url::Url;

pub const DEFAULT_REFRESH_PATH: &str = "/api/auth/refresh";
pub const DEFAULT_LOGIN_PATH: &str = "/api/auth/login";
pub const DEFAULT_LOGOUT_PATH: &str = "/api/auth/logout";
pub const DEFAULT_HEALTH_PATH: &str = "/health";

/// Absolute URLs of the provider endpoints, resolved once from the API base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    base_url: String,
    refresh_url: String,
    login_url: String,
    logout_url: String,
    health_url: String,
}

impl ProviderEndpoints {
    #[must_use]
    pub fn from_base(base: &Url) -> Self {
        let base_url = base.as_str().trim_end_matches('/').to_string();
        Self {
            refresh_url: join(&base_url, DEFAULT_REFRESH_PATH),
            login_url: join(&base_url, DEFAULT_LOGIN_PATH),
            logout_url: join(&base_url, DEFAULT_LOGOUT_PATH),
            health_url: join(&base_url, DEFAULT_HEALTH_PATH),
            base_url,
        }
    }

    #[must_use]
    pub fn with_refresh_path(mut self, path: &str) -> Self {
        self.refresh_url = join(&self.base_url, path);
        self
    }

    #[must_use]
    pub fn with_login_path(mut self, path: &str) -> Self {
        self.login_url = join(&self.base_url, path);
        self
    }

    #[must_use]
    pub fn with_logout_path(mut self, path: &str) -> Self {
        self.logout_url = join(&self.base_url, path);
        self
    }

    #[must_use]
    pub fn with_health_path(mut self, path: &str) -> Self {
        self.health_url = join(&self.base_url, path);
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn refresh_url(&self) -> &str {
        &self.refresh_url
    }

    #[must_use]
    pub fn login_url(&self) -> &str {
        &self.login_url
    }

    #[must_use]
    pub fn logout_url(&self) -> &str {
        &self.logout_url
    }

    #[must_use]
    pub fn health_url(&self) -> &str {
        &self.health_url
    }

    /// Resolves a request target: absolute `http(s)` URLs pass through, any
    /// other value is treated as a path below the API base.
    #[must_use]
    pub fn resolve(&self, target: &str) -> String {
        let target = target.trim();
        if target.starts_with("http://") || target.starts_with("https://") {
            target.to_string()
        } else {
            join(&self.base_url, target)
        }
    }
}

fn join(base: &str, path: &str) -> String {
    let path = path.trim();

    if base.is_empty() {
        path.to_string()
    } else if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path.trim_start_matches('/'))
    }
}
