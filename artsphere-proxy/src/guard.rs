//! Page route guard.
//!
//! Runs in front of every non-API path and decides, from cookies alone,
//! whether the request goes through or gets bounced.

use crate::auth::Credentials;
use crate::config::ProxyConfig;
use crate::server::ProxyServer;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};

/// Where signed-in users and non-admins are sent.
pub const HOME_PATH: &str = "/";

/// Where session-less visitors of protected pages are sent.
pub const LOGIN_PATH: &str = "/login";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(String),
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    public_paths: Vec<String>,
    admin_paths: Vec<String>,
    protected_paths: Vec<String>,
}

impl RouteGuard {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            public_paths: config.public_paths.clone(),
            admin_paths: config.admin_paths.clone(),
            protected_paths: config.protected_paths.clone(),
        }
    }

    /// Decide what happens to a page request. Pure; never touches the backend.
    pub fn evaluate(&self, path: &str, creds: &Credentials) -> GuardDecision {
        let session = creds.session();

        if let Some(user) = session {
            if matches_any(&self.admin_paths, path) && !user.is_admin() {
                return GuardDecision::Redirect(HOME_PATH.to_string());
            }
            if matches_any(&self.public_paths, path) {
                return GuardDecision::Redirect(HOME_PATH.to_string());
            }
        } else if matches_any(&self.protected_paths, path) {
            return GuardDecision::Redirect(LOGIN_PATH.to_string());
        }

        GuardDecision::Allow
    }
}

// Plain prefix match: "/admin" also covers "/admin/users" and "/admins".
fn matches_any(patterns: &[String], path: &str) -> bool {
    patterns.iter().any(|p| path.starts_with(p.as_str()))
}

/// Axum middleware wrapping [`RouteGuard::evaluate`]. API routes pass through.
pub async fn route_guard_middleware(
    State(server): State<ProxyServer>,
    request: Request,
    next: Next,
) -> Response {
    if request.uri().path().starts_with("/api/") {
        return next.run(request).await;
    }

    let creds = Credentials::from_headers(request.headers(), server.config());
    let decision = server.guard().evaluate(request.uri().path(), &creds);

    match decision {
        GuardDecision::Allow => next.run(request).await,
        GuardDecision::Redirect(to) => {
            tracing::debug!("route guard: {} -> {}", request.uri().path(), to);
            Redirect::temporary(&to).into_response()
        }
    }
}
