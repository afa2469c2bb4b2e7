use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Credential errors
    #[error("no token")]
    MissingToken,
    #[error("not authenticated")]
    NotAuthenticated,

    // Request errors
    #[error("missing or invalid image path")]
    InvalidImagePath,
    #[error("bad request: {0}")]
    BadRequest(String),

    // Backend transport failure (connect, DNS, reset mid-body)
    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Upstream(e.to_string())
    }
}

impl From<axum::extract::multipart::MultipartError> for Error {
    fn from(e: axum::extract::multipart::MultipartError) -> Self {
        Error::BadRequest(format!("invalid multipart body: {}", e.body_text()))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Error::MissingToken => (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({ "success": false, "message": "No token" }),
            ),
            // The image endpoint speaks a different error shape.
            Error::NotAuthenticated => (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({ "error": "Not authenticated" }),
            ),
            Error::InvalidImagePath => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": "Missing/invalid path" }),
            ),
            Error::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "success": false, "message": msg }),
            ),
            Error::Upstream(msg) => {
                tracing::error!("backend request failed: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    serde_json::json!({ "success": false, "message": "Backend unavailable" }),
                )
            }
            Error::Internal(msg) => {
                tracing::error!("internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "success": false, "message": "Internal error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn missing_token_is_the_fabricated_401() {
        let response = Error::MissingToken.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "success": false, "message": "No token" })
        );
    }

    #[tokio::test]
    async fn transport_failure_becomes_bad_gateway() {
        let response = Error::Upstream("connection refused".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        // Transport detail stays in the logs.
        assert_eq!(body["message"], "Backend unavailable");
    }

    #[tokio::test]
    async fn image_errors_use_error_key() {
        let response = Error::InvalidImagePath.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "error": "Missing/invalid path" })
        );
    }
}
