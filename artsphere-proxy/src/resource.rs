//! Backend resource families and their catch-all proxy routes.

use crate::auth::Credentials;
use crate::error::Result;
use crate::forward::{AuthPolicy, ForwardedResponse};
use crate::server::ProxyServer;
use axum::extract::{Request, State};
use axum::routing::{MethodFilter, MethodRouter, on};

const READ_WRITE: MethodFilter = MethodFilter::GET
    .or(MethodFilter::POST)
    .or(MethodFilter::PATCH)
    .or(MethodFilter::DELETE);

/// One backend resource family exposed under a local mount point.
#[derive(Debug, Clone, Copy)]
pub struct ResourceFamily {
    /// Local path prefix, e.g. `/api/submission`
    pub mount: &'static str,
    /// Backend path prefix, e.g. `/api/submit`
    pub backend_prefix: &'static str,
    pub methods: MethodFilter,
    pub auth: AuthPolicy,
}

/// Public user lookups; the token rides along when there is one.
pub const USER: ResourceFamily = ResourceFamily {
    mount: "/api/user",
    backend_prefix: "/api/user",
    methods: MethodFilter::GET,
    auth: AuthPolicy::Optional,
};

pub const POST: ResourceFamily = ResourceFamily {
    mount: "/api/post",
    backend_prefix: "/api/post",
    methods: READ_WRITE,
    auth: AuthPolicy::Required,
};

pub const CHALLENGE: ResourceFamily = ResourceFamily {
    mount: "/api/challenge",
    backend_prefix: "/api/challenge",
    methods: READ_WRITE,
    auth: AuthPolicy::Required,
};

/// The browser says "submission", the backend says "submit".
pub const SUBMISSION: ResourceFamily = ResourceFamily {
    mount: "/api/submission",
    backend_prefix: "/api/submit",
    methods: READ_WRITE,
    auth: AuthPolicy::Required,
};

pub const ADMIN: ResourceFamily = ResourceFamily {
    mount: "/api/admin",
    backend_prefix: "/api/admin",
    methods: MethodFilter::GET.or(MethodFilter::DELETE),
    auth: AuthPolicy::Required,
};

pub const FAMILIES: [ResourceFamily; 5] = [USER, POST, CHALLENGE, SUBMISSION, ADMIN];

impl ResourceFamily {
    /// Route pattern capturing everything below the mount point.
    pub fn route_path(&self) -> String {
        format!("{}/{{*path}}", self.mount)
    }

    /// Backend path for an inbound request path under this family.
    ///
    /// The tail is taken from the raw request path so percent-encoding
    /// survives untouched.
    pub fn backend_path(&self, request_path: &str) -> String {
        let tail = request_path
            .strip_prefix(self.mount)
            .unwrap_or_default()
            .trim_start_matches('/');
        format!("{}/{}", self.backend_prefix, tail)
    }

    pub fn method_router(self) -> MethodRouter<ProxyServer> {
        on(
            self.methods,
            move |State(server): State<ProxyServer>, creds: Credentials, req: Request| async move {
                self.proxy(&server, &creds, req).await
            },
        )
    }

    async fn proxy(
        &self,
        server: &ProxyServer,
        creds: &Credentials,
        req: Request,
    ) -> Result<ForwardedResponse> {
        let backend_path = self.backend_path(req.uri().path());
        server
            .forwarder()
            .forward(req, &backend_path, creds, self.auth)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_maps_to_submit() {
        assert_eq!(
            SUBMISSION.backend_path("/api/submission/new/abc123"),
            "/api/submit/new/abc123"
        );
    }

    #[test]
    fn tail_keeps_nested_segments_and_encoding() {
        assert_eq!(
            POST.backend_path("/api/post/posts/my-posts"),
            "/api/post/posts/my-posts"
        );
        assert_eq!(
            ADMIN.backend_path("/api/admin/users/username/j%20doe"),
            "/api/admin/users/username/j%20doe"
        );
    }

    #[test]
    fn only_user_lookups_are_anonymous() {
        for family in FAMILIES {
            let expected = if family.mount == "/api/user" {
                AuthPolicy::Optional
            } else {
                AuthPolicy::Required
            };
            assert_eq!(family.auth, expected, "{}", family.mount);
        }
    }

    #[test]
    fn route_path_is_a_catch_all() {
        assert_eq!(CHALLENGE.route_path(), "/api/challenge/{*path}");
    }
}
