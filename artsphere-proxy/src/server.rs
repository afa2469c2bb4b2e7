use crate::{
    config::ProxyConfig,
    error::{Error, Result},
    forward::Forwarder,
    guard::{RouteGuard, route_guard_middleware},
    handlers, resource,
};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, FromRef, Request},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;

/// The proxy application: configuration, route guard and backend forwarder,
/// shared read-only by every request.
#[derive(Clone)]
pub struct ProxyServer {
    config: Arc<ProxyConfig>,
    guard: Arc<RouteGuard>,
    forwarder: Forwarder,
}

impl FromRef<ProxyServer> for Arc<ProxyConfig> {
    fn from_ref(server: &ProxyServer) -> Self {
        server.config.clone()
    }
}

impl ProxyServer {
    /// Create a new proxy server builder.
    pub fn builder() -> ProxyServerBuilder {
        ProxyServerBuilder::default()
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn guard(&self) -> &RouteGuard {
        &self.guard
    }

    pub fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    /// API routes only, without the page fallback or the route guard.
    fn api_routes(&self) -> Router {
        let mut router = Router::new()
            .route("/healthz", get(handlers::handle_health))
            .route("/api/auth/login", post(handlers::handle_login))
            .route("/api/auth/register", post(handlers::handle_register))
            .route(
                "/api/auth/request-password-reset",
                post(handlers::handle_request_password_reset),
            )
            .route(
                "/api/auth/reset-password/{token}",
                post(handlers::handle_reset_password),
            )
            .route("/api/auth/logout", post(handlers::handle_logout))
            .route(
                "/api/user/me",
                get(handlers::handle_me).patch(handlers::handle_me),
            )
            .route("/api/image", get(handlers::handle_image));

        for family in resource::FAMILIES {
            router = router.route(&family.route_path(), family.method_router());
        }

        router
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
            .with_state(self.clone())
    }

    /// Create the axum router. Unknown paths get a JSON 404, behind the guard.
    pub fn router(&self) -> Router {
        self.router_with_pages(Router::new().fallback(handle_not_found))
    }

    /// Create the axum router with `pages` serving everything that is not an
    /// API route. The route guard runs in front of both.
    pub fn router_with_pages<T>(&self, pages: T) -> Router
    where
        T: Service<Request, Error = Infallible> + Clone + Send + Sync + 'static,
        T::Response: IntoResponse,
        T::Future: Send + 'static,
    {
        self.api_routes()
            .fallback_service(pages)
            .layer(axum::middleware::from_fn_with_state(
                self.clone(),
                route_guard_middleware,
            ))
    }
}

async fn handle_not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "success": false, "message": "Not found" })),
    )
}

/// Builder for ProxyServer.
#[derive(Default)]
pub struct ProxyServerBuilder {
    config: Option<ProxyConfig>,
    http_client: Option<reqwest::Client>,
}

impl ProxyServerBuilder {
    pub fn config(mut self, config: ProxyConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a preconfigured outbound client (proxies, TLS roots, ...).
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn build(self) -> Result<ProxyServer> {
        let config = Arc::new(self.config.unwrap_or_default());

        let client = match self.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .build()
                .map_err(|e| Error::Internal(format!("failed to build HTTP client: {}", e)))?,
        };

        tracing::info!("proxying to backend at {}", config.backend_base_str());

        Ok(ProxyServer {
            guard: Arc::new(RouteGuard::new(&config)),
            forwarder: Forwarder::new(config.clone(), client),
            config,
        })
    }
}
