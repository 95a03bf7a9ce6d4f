//! Runtime configuration shared with handlers through `Extension`.

use url::Url;

const DEFAULT_COOKIE_TTL_SECONDS: i64 = 7 * 24 * 3600;

/// API configuration resolved from CLI flags at startup.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    base_url: Url,
    frontend_base_url: String,
    cookie_ttl_seconds: i64,
}

impl ApiConfig {
    #[must_use]
    pub fn new(base_url: Url, frontend_base_url: String) -> Self {
        Self {
            base_url,
            frontend_base_url,
            cookie_ttl_seconds: DEFAULT_COOKIE_TTL_SECONDS,
        }
    }

    #[must_use]
    pub const fn with_cookie_ttl_seconds(mut self, seconds: i64) -> Self {
        self.cookie_ttl_seconds = seconds;
        self
    }

    /// Public base URL embedded in QR payloads.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Frontend origin allowed by CORS and used for cookie attributes.
    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub const fn cookie_ttl_seconds(&self) -> i64 {
        self.cookie_ttl_seconds
    }

    /// `Secure` cookies only make sense when the frontend is served over TLS.
    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}
