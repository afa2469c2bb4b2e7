//! Cookie-backed credentials.
//!
//! Every request gets an explicit [`Credentials`] value built from its cookie
//! header. Nothing here validates the token: it is opaque, and only the
//! backend decides whether it is any good.

use crate::config::ProxyConfig;
use axum::http::HeaderMap;
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Role value that unlocks admin pages.
pub const ADMIN_ROLE: &str = "admin";

/// Cached identity snapshot stored next to the token.
///
/// Only `role` is required. Every other field the backend sent, ids and
/// names included, is carried untyped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserData {
    pub role: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserData {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }

    /// Backend id, from `_id` or `id`.
    pub fn id(&self) -> Option<&str> {
        self.str_field("_id").or_else(|| self.str_field("id"))
    }

    pub fn username(&self) -> Option<&str> {
        self.str_field("username")
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(serde_json::Value::as_str)
    }

    /// Parse a cookie value, accepting raw or percent-encoded JSON.
    ///
    /// Garbage yields `None`; a bad snapshot is treated as no snapshot.
    pub fn from_cookie_value(raw: &str) -> Option<Self> {
        if let Ok(user) = serde_json::from_str(raw) {
            return Some(user);
        }
        let decoded = urlencoding::decode(raw).ok()?;
        serde_json::from_str(&decoded).ok()
    }

    /// Percent-encoded JSON, safe to place in a cookie value.
    pub fn to_cookie_value(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        urlencoding::encode(&json).into_owned()
    }
}

/// Per-request credential context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    /// Bearer token, forwarded verbatim
    pub token: Option<String>,
    /// User snapshot; only read when a token is present
    pub user: Option<UserData>,
}

impl Credentials {
    pub fn from_jar(jar: &CookieJar, config: &ProxyConfig) -> Self {
        let token = jar
            .get(&config.auth_cookie)
            .map(|c| c.value().to_string())
            .filter(|t| !t.is_empty());

        let user = token.as_ref().and_then(|_| {
            jar.get(&config.user_cookie)
                .and_then(|c| UserData::from_cookie_value(c.value()))
        });

        Self { token, user }
    }

    pub fn from_headers(headers: &HeaderMap, config: &ProxyConfig) -> Self {
        Self::from_jar(&CookieJar::from_headers(headers), config)
    }

    /// The token, or the fabricated-401 error.
    pub fn require_token(&self) -> crate::Result<&str> {
        self.token.as_deref().ok_or(crate::Error::MissingToken)
    }

    /// Token and user snapshot are both present.
    pub fn session(&self) -> Option<&UserData> {
        self.token.as_ref().and(self.user.as_ref())
    }

    pub fn bearer(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {}", t))
    }
}

fn session_cookie(config: &ProxyConfig, name: String, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(config.secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(config.cookie_max_age_days))
        .build()
}

fn removal_cookie(name: String) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .build()
}

/// Store the bearer token in its HTTP-only cookie.
pub fn set_auth_token(jar: CookieJar, config: &ProxyConfig, token: &str) -> CookieJar {
    jar.add(session_cookie(
        config,
        config.auth_cookie.clone(),
        token.to_string(),
    ))
}

/// Store the user snapshot cookie.
pub fn set_user_data(jar: CookieJar, config: &ProxyConfig, user: &UserData) -> CookieJar {
    jar.add(session_cookie(
        config,
        config.user_cookie.clone(),
        user.to_cookie_value(),
    ))
}

/// Expire both session cookies, whether or not the browser sent them.
pub fn clear_session(jar: CookieJar, config: &ProxyConfig) -> CookieJar {
    jar.add(removal_cookie(config.auth_cookie.clone()))
        .add(removal_cookie(config.user_cookie.clone()))
}

pub mod axum_extractors {
    //! Axum extractor for [`Credentials`].

    use super::*;
    use axum::extract::{FromRef, FromRequestParts};
    use axum::http::request::Parts;
    use std::convert::Infallible;

    impl<S> FromRequestParts<S> for Credentials
    where
        S: Send + Sync,
        Arc<ProxyConfig>: FromRef<S>,
    {
        type Rejection = Infallible;

        async fn from_request_parts(
            parts: &mut Parts,
            state: &S,
        ) -> std::result::Result<Self, Self::Rejection> {
            let config = Arc::<ProxyConfig>::from_ref(state);
            Ok(Credentials::from_headers(&parts.headers, &config))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::{COOKIE, SET_COOKIE};
    use axum::response::IntoResponse;

    fn headers(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, cookie.parse().unwrap());
        headers
    }

    #[test]
    fn no_cookies_means_no_credentials() {
        let creds = Credentials::from_headers(&HeaderMap::new(), &ProxyConfig::default());
        assert_eq!(creds, Credentials::default());
        assert!(matches!(
            creds.require_token(),
            Err(crate::Error::MissingToken)
        ));
    }

    #[test]
    fn reads_token_and_raw_json_user() {
        let creds = Credentials::from_headers(
            &headers(r#"auth_token=T; user_data={"_id":"u1","role":"user","username":"ann"}"#),
            &ProxyConfig::default(),
        );
        assert_eq!(creds.token.as_deref(), Some("T"));
        let user = creds.session().expect("session");
        assert_eq!(user.id(), Some("u1"));
        assert_eq!(user.username(), Some("ann"));
        assert!(!user.is_admin());
        assert_eq!(creds.bearer().as_deref(), Some("Bearer T"));
    }

    #[test]
    fn reads_percent_encoded_user() {
        let encoded = urlencoding::encode(r#"{"role":"admin","bio":"hi"}"#);
        let creds = Credentials::from_headers(
            &headers(&format!("auth_token=T; user_data={}", encoded)),
            &ProxyConfig::default(),
        );
        let user = creds.session().unwrap();
        assert!(user.is_admin());
        assert_eq!(user.extra["bio"], "hi");
    }

    #[test]
    fn user_without_token_is_ignored() {
        let creds = Credentials::from_headers(
            &headers(r#"user_data={"role":"admin"}"#),
            &ProxyConfig::default(),
        );
        assert!(creds.token.is_none());
        assert!(creds.user.is_none());
        assert!(creds.session().is_none());
    }

    #[test]
    fn garbage_user_data_is_absent() {
        let creds = Credentials::from_headers(
            &headers("auth_token=T; user_data=%7Bnope"),
            &ProxyConfig::default(),
        );
        assert_eq!(creds.token.as_deref(), Some("T"));
        assert!(creds.session().is_none());

        // role is mandatory
        assert!(UserData::from_cookie_value(r#"{"username":"x"}"#).is_none());
    }

    #[test]
    fn snapshot_with_both_id_spellings_still_parses() {
        let creds = Credentials::from_headers(
            &headers(r#"auth_token=T; user_data={"_id":"u1","id":"u1","username":"ann","role":"user"}"#),
            &ProxyConfig::default(),
        );
        let user = creds.session().expect("session");
        assert_eq!(user.role, "user");
        assert_eq!(user.id(), Some("u1"));

        // Odd field types are carried, not rejected.
        let user = UserData::from_cookie_value(
            r#"{"_id":{"$oid":"abc"},"id":42,"username":null,"role":"admin"}"#,
        )
        .unwrap();
        assert!(user.is_admin());
        assert_eq!(user.id(), None);
        assert_eq!(user.username(), None);
    }

    #[test]
    fn empty_token_counts_as_missing() {
        let creds = Credentials::from_headers(&headers("auth_token="), &ProxyConfig::default());
        assert!(creds.token.is_none());
    }

    #[test]
    fn cookie_value_round_trips_through_encoding() {
        let user = UserData::from_cookie_value(r#"{"id":"7","role":"user","followers":3}"#).unwrap();
        assert_eq!(user.id(), Some("7"));
        let again = UserData::from_cookie_value(&user.to_cookie_value()).unwrap();
        assert_eq!(again, user);
    }

    #[test]
    fn set_and_clear_emit_set_cookie_headers() {
        let config = ProxyConfig::default();
        let user = UserData::from_cookie_value(r#"{"role":"user"}"#).unwrap();
        let jar = set_user_data(set_auth_token(CookieJar::new(), &config, "T"), &config, &user);
        let response = jar.into_response();
        let cookies: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(cookies.len(), 2);
        let auth = cookies.iter().find(|c| c.starts_with("auth_token=T")).unwrap();
        assert!(auth.contains("HttpOnly"));
        assert!(auth.contains("Path=/"));

        let response = clear_session(CookieJar::from_headers(&headers("auth_token=T; user_data=x")), &config)
            .into_response();
        let cleared: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(cleared.len(), 2);
        assert!(cleared.iter().any(|c| c.starts_with("auth_token=")));
        assert!(cleared.iter().any(|c| c.starts_with("user_data=")));
        assert!(cleared.iter().all(|c| c.contains("Max-Age=0")));
    }
}
