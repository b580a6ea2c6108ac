//! Unified error handling with Sentry integration.
//!
//! Route handlers return `Result<T, AppError>`. Every error becomes a status
//! code plus a JSON body `{"error": "...", "details": ...}`; server-side
//! failures are captured to Sentry and never leak internals to the client.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::auth::{AuthError, TokenError};
use crate::services::prediction::PredictionError;
use crate::services::products::ProductError;

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Product operation failed.
    #[error("Product error: {0}")]
    Product(#[from] ProductError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User is authenticated but lacks permission.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl ErrorBody {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            status: None,
            details: None,
        }
    }

    fn with_details(mut self, details: impl Serialize) -> Self {
        self.details = serde_json::to_value(details).ok();
        self
    }
}

const INTERNAL: &str = "Internal server error";

impl AppError {
    /// Whether this error is a server-side fault worth reporting.
    fn is_server_error(&self) -> bool {
        match self {
            Self::Database(_) | Self::Internal(_) => true,
            Self::Auth(err) => matches!(
                err,
                AuthError::Repository(_)
                    | AuthError::PasswordHash
                    | AuthError::Token(TokenError::Encode(_))
            ),
            Self::Product(err) => matches!(
                err,
                ProductError::Repository(_)
                    | ProductError::Prediction(
                        PredictionError::Unavailable(_)
                            | PredictionError::Upstream { .. }
                            | PredictionError::InvalidResponse(_)
                    )
            ),
            _ => false,
        }
    }

    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        match self {
            Self::Database(_) | Self::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorBody::new(INTERNAL))
            }
            Self::Auth(err) => auth_response(err),
            Self::Product(err) => product_response(err),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorBody::new(msg)),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, ErrorBody::new(msg)),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, ErrorBody::new(msg)),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorBody::new(msg)),
        }
    }
}

fn auth_response(err: AuthError) -> (StatusCode, ErrorBody) {
    match err {
        AuthError::MissingFields(msg) => (StatusCode::BAD_REQUEST, ErrorBody::new(msg)),
        AuthError::PasswordMismatch => (
            StatusCode::BAD_REQUEST,
            ErrorBody::new("Passwords do not match"),
        ),
        AuthError::Validation(details) => (
            StatusCode::BAD_REQUEST,
            ErrorBody::new("Validation error").with_details(details),
        ),
        AuthError::InvalidCredentials => (
            StatusCode::UNAUTHORIZED,
            ErrorBody::new("Invalid credentials"),
        ),
        AuthError::UserAlreadyExists => (
            StatusCode::CONFLICT,
            ErrorBody::new("User with this email or username already exists"),
        ),
        AuthError::UserInactive => (
            StatusCode::UNAUTHORIZED,
            ErrorBody::new("Access denied. User not found or inactive."),
        ),
        AuthError::Token(TokenError::Expired) => (
            StatusCode::UNAUTHORIZED,
            ErrorBody::new("Access denied. Token expired."),
        ),
        AuthError::Token(TokenError::Invalid) => (
            StatusCode::UNAUTHORIZED,
            ErrorBody::new("Access denied. Invalid token."),
        ),
        AuthError::Token(TokenError::Encode(_))
        | AuthError::Repository(_)
        | AuthError::PasswordHash => (StatusCode::INTERNAL_SERVER_ERROR, ErrorBody::new(INTERNAL)),
    }
}

fn product_response(err: ProductError) -> (StatusCode, ErrorBody) {
    match err {
        ProductError::NotFound => (StatusCode::NOT_FOUND, ErrorBody::new("Product not found")),
        ProductError::InvalidPattern => (
            StatusCode::BAD_REQUEST,
            ErrorBody::new("Invalid search pattern"),
        ),
        ProductError::Repository(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, ErrorBody::new(INTERNAL))
        }
        ProductError::Prediction(err) => match err {
            PredictionError::MissingFields(fields) => (
                StatusCode::BAD_REQUEST,
                ErrorBody::new("Missing required nutrition fields").with_details(fields),
            ),
            PredictionError::Unavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorBody::new("Prediction service unavailable"),
            ),
            PredictionError::Timeout => (
                StatusCode::REQUEST_TIMEOUT,
                ErrorBody::new("Prediction service timed out"),
            ),
            PredictionError::Upstream { status, detail } => {
                let mut body = ErrorBody::new("Prediction service error");
                body.status = Some(status);
                body.details = detail;
                (StatusCode::BAD_GATEWAY, body)
            }
            PredictionError::InvalidResponse(_) => (
                StatusCode::BAD_GATEWAY,
                ErrorBody::new("Invalid response from prediction service"),
            ),
        },
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context for the authenticated user.
pub fn set_sentry_user(user_id: &impl ToString, username: &str) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            username: Some(username.to_owned()),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    async fn render(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product-123".to_string());
        assert_eq!(err.to_string(), "Not found: product-123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[tokio::test]
    async fn test_json_bodies_and_statuses() {
        let (status, body) = render(AppError::BadRequest("Invalid product ID format".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid product ID format");
        assert!(body.get("details").is_none());

        let (status, body) = render(AppError::Forbidden("nope".into())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "nope");

        let (status, body) = render(AppError::Internal("secret detail".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
    }

    #[tokio::test]
    async fn test_auth_error_mapping() {
        let (status, body) = render(AuthError::Token(TokenError::Expired).into()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Access denied. Token expired.");

        let (status, body) = render(AuthError::Token(TokenError::Invalid).into()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Access denied. Invalid token.");

        let (status, _) = render(AuthError::UserAlreadyExists.into()).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) =
            render(AuthError::Validation(vec!["Username too short".into()]).into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"][0], "Username too short");
    }

    #[tokio::test]
    async fn test_rejected_search_pattern_is_bad_request() {
        let (status, body) = render(ProductError::InvalidPattern.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid search pattern");
    }

    #[tokio::test]
    async fn test_prediction_error_mapping() {
        let (status, _) = render(ProductError::from(PredictionError::Timeout).into()).await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);

        let (status, body) = render(
            ProductError::from(PredictionError::Upstream {
                status: 422,
                detail: Some(serde_json::json!("bad input")),
            })
            .into(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["status"], 422);
        assert_eq!(body["details"], "bad input");

        let (status, body) = render(
            ProductError::from(PredictionError::MissingFields(vec!["salt_100g"])).into(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"][0], "salt_100g");

        let (status, _) = render(ProductError::NotFound.into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
