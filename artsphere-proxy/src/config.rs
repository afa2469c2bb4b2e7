use url::Url;

/// Backend address used when no base URL is configured.
pub const DEFAULT_BACKEND_BASE: &str = "http://localhost:5000";

/// Environment variables consulted for the backend base URL, in order.
pub const BACKEND_BASE_ENV_VARS: [&str; 2] = ["NEXT_PUBLIC_API_BASE_URL", "API_BASE_URL"];

/// Configuration for the proxy layer
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Base address of the backend service
    pub backend_base: Url,

    /// Name of the HTTP-only cookie holding the bearer token
    pub auth_cookie: String,

    /// Name of the cookie holding the cached user snapshot
    pub user_cookie: String,

    /// Lifetime of both session cookies, in days
    pub cookie_max_age_days: i64,

    /// Mark session cookies `Secure`
    pub secure_cookies: bool,

    /// Page prefixes an authenticated user is bounced away from
    pub public_paths: Vec<String>,

    /// Page prefixes only the `admin` role may see
    pub admin_paths: Vec<String>,

    /// Page prefixes that need a session at all (empty by default)
    pub protected_paths: Vec<String>,

    /// Only image paths under this prefix are fetched
    pub image_path_prefix: String,

    /// Max characters of upstream error text echoed by the image endpoint
    pub image_error_detail_limit: usize,

    /// Upper bound on a forwarded request body, in bytes
    pub max_body_bytes: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self::new(default_backend_base())
    }
}

impl ProxyConfig {
    /// Create a new configuration with sensible defaults
    pub fn new(backend_base: impl Into<Url>) -> Self {
        Self {
            backend_base: backend_base.into(),
            auth_cookie: "auth_token".to_string(),
            user_cookie: "user_data".to_string(),
            cookie_max_age_days: 7,
            secure_cookies: false,
            public_paths: vec![
                "/login".to_string(),
                "/register".to_string(),
                "/forgot-password".to_string(),
            ],
            admin_paths: vec!["/admin".to_string()],
            protected_paths: Vec::new(),
            image_path_prefix: "/uploads/".to_string(),
            image_error_detail_limit: 300,
            max_body_bytes: 20 * 1024 * 1024,
        }
    }

    /// Build from the process environment.
    ///
    /// An unset or unparsable backend URL falls back to [`DEFAULT_BACKEND_BASE`].
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ProxyConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let raw = BACKEND_BASE_ENV_VARS
            .iter()
            .find_map(|key| lookup(key).filter(|v| !v.trim().is_empty()));

        let backend_base = match raw {
            Some(raw) => match Url::parse(raw.trim()) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(
                        "invalid backend base URL {:?} ({}), using {}",
                        raw,
                        e,
                        DEFAULT_BACKEND_BASE
                    );
                    default_backend_base()
                }
            },
            None => default_backend_base(),
        };

        let mut config = Self::new(backend_base);
        if let Some(secure) = lookup("SECURE_COOKIES") {
            config.secure_cookies = matches!(secure.trim(), "1" | "true" | "yes");
        }
        config
    }

    /// Set the backend base URL
    pub fn with_backend_base(mut self, base: Url) -> Self {
        self.backend_base = base;
        self
    }

    /// Set the cookie names
    pub fn with_cookie_names(
        mut self,
        auth_cookie: impl Into<String>,
        user_cookie: impl Into<String>,
    ) -> Self {
        self.auth_cookie = auth_cookie.into();
        self.user_cookie = user_cookie.into();
        self
    }

    /// Set session cookie lifetime in days
    pub fn with_cookie_max_age_days(mut self, days: i64) -> Self {
        self.cookie_max_age_days = days;
        self
    }

    /// Mark session cookies `Secure`
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    /// Set the page prefixes hidden from signed-in users
    pub fn with_public_paths(mut self, paths: Vec<String>) -> Self {
        self.public_paths = paths;
        self
    }

    /// Set the admin-only page prefixes
    pub fn with_admin_paths(mut self, paths: Vec<String>) -> Self {
        self.admin_paths = paths;
        self
    }

    /// Set page prefixes that require a session
    pub fn with_protected_paths(mut self, paths: Vec<String>) -> Self {
        self.protected_paths = paths;
        self
    }

    /// Set the accepted image path prefix
    pub fn with_image_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.image_path_prefix = prefix.into();
        self
    }

    /// Set the request body limit
    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    /// Base URL with any trailing slash removed, ready for path concatenation.
    pub fn backend_base_str(&self) -> &str {
        self.backend_base.as_str().trim_end_matches('/')
    }

    /// Join an absolute backend path (and optional query) onto the base URL.
    pub fn backend_url(&self, path: &str, query: Option<&str>) -> String {
        let path = path.trim_start_matches('/');
        match query.filter(|q| !q.is_empty()) {
            Some(q) => format!("{}/{}?{}", self.backend_base_str(), path, q),
            None => format!("{}/{}", self.backend_base_str(), path),
        }
    }
}

fn default_backend_base() -> Url {
    Url::parse(DEFAULT_BACKEND_BASE).expect("valid url")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn unset_backend_falls_back_to_localhost() {
        let config = ProxyConfig::from_lookup(lookup(&[]));
        assert_eq!(config.backend_base_str(), "http://localhost:5000");
    }

    #[test]
    fn invalid_backend_falls_back_to_localhost() {
        let config = ProxyConfig::from_lookup(lookup(&[("NEXT_PUBLIC_API_BASE_URL", "not a url")]));
        assert_eq!(config.backend_base_str(), "http://localhost:5000");
    }

    #[test]
    fn first_configured_variable_wins() {
        let config = ProxyConfig::from_lookup(lookup(&[
            ("NEXT_PUBLIC_API_BASE_URL", "https://api.artsphere.test/"),
            ("API_BASE_URL", "http://other:1"),
        ]));
        assert_eq!(config.backend_base_str(), "https://api.artsphere.test");

        let config = ProxyConfig::from_lookup(lookup(&[("API_BASE_URL", "http://other:1")]));
        assert_eq!(config.backend_base_str(), "http://other:1");
    }

    #[test]
    fn backend_url_joins_path_and_query() {
        let config = ProxyConfig::default();
        assert_eq!(
            config.backend_url("/api/post/posts", Some("page=2")),
            "http://localhost:5000/api/post/posts?page=2"
        );
        assert_eq!(
            config.backend_url("api/user/me", Some("")),
            "http://localhost:5000/api/user/me"
        );
    }
}
