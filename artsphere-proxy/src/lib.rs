//! # artsphere-proxy
//!
//! The authenticated forwarding layer of the ArtSphere web front end.
//!
//! Browsers never see the bearer token: it lives in an HTTP-only cookie, and
//! this crate reads it on each request, attaches it as
//! `Authorization: Bearer <token>` and forwards the call to the backend
//! service. Backend responses are relayed untouched.
//!
//! ## Features
//!
//! - **Credential Store**: per-request [`Credentials`] read from cookies,
//!   plus cookie writers for login and logout
//! - **Request Forwarder**: body strategy per method and content type
//!   (none, raw, or re-encoded multipart), opaque response relay
//! - **Route Guard**: redirects signed-in users away from auth pages and
//!   non-admins away from admin pages
//! - **Resource Endpoints**: one catch-all registration per backend family
//!   (`user`, `post`, `challenge`, `submission`, `admin`) plus the image relay
//!
//! ## Example
//!
//! ```rust,no_run
//! use artsphere_proxy::{ProxyConfig, ProxyServer};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let proxy = ProxyServer::builder()
//!     .config(ProxyConfig::from_env())
//!     .build()?;
//!
//! let app = proxy.router();
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod forward;
pub mod guard;
pub mod handlers;
pub mod resource;
pub mod server;

pub use auth::{Credentials, UserData};
pub use config::ProxyConfig;
pub use error::{Error, Result};
pub use forward::{AuthPolicy, BodyStrategy, ForwardedResponse, Forwarder};
pub use guard::{GuardDecision, RouteGuard};
pub use resource::ResourceFamily;
pub use server::{ProxyServer, ProxyServerBuilder};
