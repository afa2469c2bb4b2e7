//! Request forwarding to the backend.
//!
//! The forwarder never parses what the backend sends back. Responses travel
//! as opaque bytes plus status and content type, so an HTML error page or a
//! truncated JSON document reaches the browser exactly as the backend wrote it.

use crate::auth::Credentials;
use crate::config::ProxyConfig;
use crate::error::{Error, Result};
use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use reqwest::multipart::{Form, Part};
use std::sync::Arc;

/// Content type reported when the backend does not send one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Whether a route may be called without a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPolicy {
    /// Short-circuit with the local 401 when no token is present.
    Required,
    /// Attach the token if there is one, otherwise forward anonymously.
    Optional,
}

/// How the inbound body is carried upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyStrategy {
    /// GET and HEAD: nothing is forwarded, whatever the browser sent.
    None,
    /// Re-encoded as a fresh multipart form with a new boundary.
    Multipart,
    /// Forwarded byte-for-byte with the inbound content type.
    Raw,
}

impl BodyStrategy {
    pub fn select(method: &Method, content_type: Option<&str>) -> Self {
        if method == Method::GET || method == Method::HEAD {
            return BodyStrategy::None;
        }
        match content_type {
            Some(ct) if ct.contains("multipart/form-data") => BodyStrategy::Multipart,
            _ => BodyStrategy::Raw,
        }
    }
}

/// A backend response, relayed without interpretation.
#[derive(Debug, Clone)]
pub struct ForwardedResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

impl ForwardedResponse {
    /// Build the browser response, using `default_content_type` when the
    /// backend did not name one.
    pub fn into_response_with_default(self, default_content_type: &'static str) -> Response {
        let content_type = self
            .content_type
            .unwrap_or_else(|| HeaderValue::from_static(default_content_type));
        (self.status, [(CONTENT_TYPE, content_type)], self.body).into_response()
    }
}

impl IntoResponse for ForwardedResponse {
    fn into_response(self) -> Response {
        self.into_response_with_default(DEFAULT_CONTENT_TYPE)
    }
}

/// Sends one outbound request per inbound request.
///
/// No retries, no timeout and no caching: a hung backend hangs the caller.
#[derive(Clone)]
pub struct Forwarder {
    config: Arc<ProxyConfig>,
    client: reqwest::Client,
}

impl Forwarder {
    pub fn new(config: Arc<ProxyConfig>, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// Forward `req` to `backend_path` on the backend, keeping its query string.
    pub async fn forward(
        &self,
        req: Request,
        backend_path: &str,
        creds: &Credentials,
        policy: AuthPolicy,
    ) -> Result<ForwardedResponse> {
        if policy == AuthPolicy::Required {
            if creds.token.is_none() {
                tracing::warn!("no token for {}, answering 401 locally", backend_path);
            }
            creds.require_token()?;
        }

        let method = req.method().clone();
        let url = self.config.backend_url(backend_path, req.uri().query());
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let strategy = BodyStrategy::select(&method, content_type.as_deref());

        tracing::info!("proxying {} {} ({:?} body)", method, backend_path, strategy);

        let mut request = self.outbound(method, &url, creds);

        match strategy {
            BodyStrategy::None => {}
            BodyStrategy::Multipart => {
                let multipart = Multipart::from_request(req, &())
                    .await
                    .map_err(|e| Error::BadRequest(e.body_text()))?;
                // reqwest writes its own Content-Type with the new boundary.
                request = request.multipart(rebuild_form(multipart).await?);
            }
            BodyStrategy::Raw => {
                let body = axum::body::to_bytes(req.into_body(), self.config.max_body_bytes)
                    .await
                    .map_err(|e| Error::BadRequest(format!("failed to read body: {}", e)))?;
                if let Some(content_type) = content_type {
                    request = request.header(CONTENT_TYPE, content_type);
                }
                request = request.body(body);
            }
        }

        self.send(request).await
    }

    /// Issue a body-less request to an absolute backend path.
    pub async fn fetch(
        &self,
        method: Method,
        backend_path: &str,
        creds: &Credentials,
    ) -> Result<ForwardedResponse> {
        let url = self.config.backend_url(backend_path, None);
        tracing::info!("fetching {} {}", method, backend_path);
        self.send(self.outbound(method, &url, creds)).await
    }

    fn outbound(&self, method: Method, url: &str, creds: &Credentials) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .request(method, url)
            .header(CACHE_CONTROL, "no-store");
        if let Some(bearer) = creds.bearer() {
            request = request.header(AUTHORIZATION, bearer);
        }
        request
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<ForwardedResponse> {
        let response = request.send().await?;

        let status = response.status();
        let content_type = response.headers().get(CONTENT_TYPE).cloned();
        let body = response.bytes().await?;

        tracing::debug!("backend answered {} ({} bytes)", status, body.len());

        Ok(ForwardedResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Copy every field of an inbound multipart body into a new outbound form.
async fn rebuild_form(mut multipart: Multipart) -> Result<Form> {
    let mut form = Form::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_owned);
        let content_type = field.content_type().map(str::to_owned);
        let data = field.bytes().await?;

        let part = match file_name {
            Some(file_name) => Part::bytes(data.to_vec()).file_name(file_name),
            None => match String::from_utf8(data.to_vec()) {
                Ok(text) => Part::text(text),
                Err(e) => Part::bytes(e.into_bytes()),
            },
        };
        let part = match content_type {
            Some(ct) => part
                .mime_str(&ct)
                .map_err(|e| Error::BadRequest(format!("bad part content type: {}", e)))?,
            None => part,
        };

        form = form.part(name, part);
    }

    Ok(form)
}
