//! Endpoints that are more than a catch-all forward: session actions, the
//! current-user route and the image relay.

use crate::auth::{self, Credentials, UserData};
use crate::error::{Error, Result};
use crate::forward::{AuthPolicy, ForwardedResponse};
use crate::server::ProxyServer;
use axum::Json;
use axum::extract::{Path, Query, Request, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use serde_json::{Value, json};

pub const LOGIN_PATH: &str = "/api/user/login";
pub const REGISTER_PATH: &str = "/api/user/register";
pub const ME_PATH: &str = "/api/user/me";
pub const REQUEST_PASSWORD_RESET_PATH: &str = "/api/user/request-password-reset";
pub const RESET_PASSWORD_PATH: &str = "/api/user/reset-password";

const IMAGE_CONTENT_TYPE: &str = "application/octet-stream";

/// Shape of a login reply, as far as cookie handling needs it.
#[derive(Debug, Deserialize)]
struct LoginReply {
    #[serde(default)]
    success: bool,
    token: Option<String>,
    user: Option<Value>,
    message: Option<String>,
}

/// Log in through the backend and turn its token into session cookies.
///
/// The token is kept out of the response body.
pub async fn handle_login(
    State(server): State<ProxyServer>,
    jar: CookieJar,
    req: Request,
) -> Result<Response> {
    // Never send a stale token along with a login attempt.
    let forwarded = server
        .forwarder()
        .forward(req, LOGIN_PATH, &Credentials::default(), AuthPolicy::Optional)
        .await?;

    let reply: Option<LoginReply> = serde_json::from_slice(&forwarded.body).ok();

    match reply {
        Some(LoginReply {
            success: true,
            token: Some(token),
            user,
            ..
        }) if !token.is_empty() => {
            let config = server.config();
            let mut jar = auth::set_auth_token(jar, config, &token);

            match user
                .clone()
                .and_then(|u| serde_json::from_value::<UserData>(u).ok())
            {
                Some(snapshot) => jar = auth::set_user_data(jar, config, &snapshot),
                None => tracing::warn!("login reply carried no usable user snapshot"),
            }

            tracing::info!("login succeeded, session cookies set");
            Ok((
                jar,
                Json(json!({
                    "success": true,
                    "message": "Login Successful",
                    "data": user.unwrap_or(Value::Null),
                })),
            )
                .into_response())
        }
        other => {
            let message = other
                .and_then(|r| r.message)
                .unwrap_or_else(|| "Login Failed".to_string());
            let status = if forwarded.status.is_success() {
                StatusCode::UNAUTHORIZED
            } else {
                forwarded.status
            };
            tracing::info!("login rejected with {}", status);
            Ok((status, Json(json!({ "success": false, "message": message }))).into_response())
        }
    }
}

pub async fn handle_register(
    State(server): State<ProxyServer>,
    req: Request,
) -> Result<ForwardedResponse> {
    server
        .forwarder()
        .forward(req, REGISTER_PATH, &Credentials::default(), AuthPolicy::Optional)
        .await
}

pub async fn handle_request_password_reset(
    State(server): State<ProxyServer>,
    req: Request,
) -> Result<ForwardedResponse> {
    server
        .forwarder()
        .forward(
            req,
            REQUEST_PASSWORD_RESET_PATH,
            &Credentials::default(),
            AuthPolicy::Optional,
        )
        .await
}

pub async fn handle_reset_password(
    State(server): State<ProxyServer>,
    Path(reset_token): Path<String>,
    req: Request,
) -> Result<ForwardedResponse> {
    let backend_path = format!(
        "{}/{}",
        RESET_PASSWORD_PATH,
        urlencoding::encode(&reset_token)
    );
    server
        .forwarder()
        .forward(req, &backend_path, &Credentials::default(), AuthPolicy::Optional)
        .await
}

/// Clear both session cookies. The backend is not told.
pub async fn handle_logout(
    State(server): State<ProxyServer>,
    jar: CookieJar,
) -> (CookieJar, Json<Value>) {
    tracing::info!("logout");
    (
        auth::clear_session(jar, server.config()),
        Json(json!({ "success": true })),
    )
}

/// GET reads the profile; PATCH sends the multipart profile edit.
pub async fn handle_me(
    State(server): State<ProxyServer>,
    creds: Credentials,
    req: Request,
) -> Result<ForwardedResponse> {
    server
        .forwarder()
        .forward(req, ME_PATH, &creds, AuthPolicy::Required)
        .await
}

#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    pub path: Option<String>,
}

/// Accept only absolute paths under the upload prefix, without `..` segments.
pub fn validate_image_path<'a>(path: Option<&'a str>, prefix: &str) -> Result<&'a str> {
    let path = path.ok_or(Error::InvalidImagePath)?;
    if !path.starts_with('/') || !path.starts_with(prefix) {
        return Err(Error::InvalidImagePath);
    }
    if path.split(['/', '\\']).any(is_parent_segment) {
        return Err(Error::InvalidImagePath);
    }
    Ok(path)
}

/// `..` in any spelling URL resolution honors (`%2e%2e`, `.%2E`, ...).
fn is_parent_segment(segment: &str) -> bool {
    urlencoding::decode(segment).is_ok_and(|decoded| decoded == "..")
}

/// First `limit` characters of an upstream error body.
pub fn truncate_detail(body: &[u8], limit: usize) -> String {
    String::from_utf8_lossy(body).chars().take(limit).collect()
}

/// Relay an uploaded image, authenticated with the session token.
pub async fn handle_image(
    State(server): State<ProxyServer>,
    creds: Credentials,
    Query(query): Query<ImageQuery>,
) -> Result<Response> {
    let config = server.config();

    let path = validate_image_path(query.path.as_deref(), &config.image_path_prefix)
        .inspect_err(|_| tracing::warn!("rejected image path {:?}", query.path))?;

    if creds.token.is_none() {
        return Err(Error::NotAuthenticated);
    }

    let forwarded = server.forwarder().fetch(Method::GET, path, &creds).await?;

    if !forwarded.status.is_success() {
        let detail = truncate_detail(&forwarded.body, config.image_error_detail_limit);
        tracing::warn!("image fetch for {} failed with {}", path, forwarded.status);
        return Ok((
            forwarded.status,
            Json(json!({
                "error": "Upstream failed",
                "status": forwarded.status.as_u16(),
                "detail": detail,
            })),
        )
            .into_response());
    }

    Ok(ForwardedResponse {
        status: StatusCode::OK,
        ..forwarded
    }
    .into_response_with_default(IMAGE_CONTENT_TYPE))
}

pub async fn handle_health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_paths_must_be_absolute_upload_paths() {
        let prefix = "/uploads/";
        assert!(validate_image_path(None, prefix).is_err());
        assert!(validate_image_path(Some("uploads/post-images/x.jpg"), prefix).is_err());
        assert!(validate_image_path(Some("http://evil/x.jpg"), prefix).is_err());
        assert!(validate_image_path(Some("/etc/passwd"), prefix).is_err());
        assert!(validate_image_path(Some("/uploads/../api/admin/users"), prefix).is_err());
        for encoded in [
            "/uploads/%2e%2e/api/admin/users",
            "/uploads/%2E%2e/api/admin/users",
            "/uploads/.%2e/api/admin/users",
            "/uploads/post-images/%2e./%2e%2e/api/admin/users",
        ] {
            assert!(validate_image_path(Some(encoded), prefix).is_err(), "{}", encoded);
        }
        // dots inside a file name are fine
        assert!(validate_image_path(Some("/uploads/post-images/a..b.jpg"), prefix).is_ok());
        assert_eq!(
            validate_image_path(Some("/uploads/post-images/x.jpg"), prefix).unwrap(),
            "/uploads/post-images/x.jpg"
        );
    }

    #[test]
    fn detail_is_cut_at_the_limit() {
        let page = "x".repeat(1000);
        assert_eq!(truncate_detail(page.as_bytes(), 300).len(), 300);
        assert_eq!(truncate_detail(b"short", 300), "short");
        // counts characters, not bytes
        assert_eq!(truncate_detail("ééé".as_bytes(), 2), "éé");
    }
}
