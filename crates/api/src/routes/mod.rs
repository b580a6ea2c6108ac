//! HTTP route handlers for the NutriTracker API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /                              - Banner
//! GET    /health                        - Liveness
//! GET    /health/ready                  - Readiness (database)
//!
//! # Auth
//! POST   /auth/register                 - Create account, returns token
//! POST   /auth/login                    - Exchange credentials for token
//! POST   /auth/logout                   - Stateless logout
//! GET    /auth/me                       - Current user (bearer)
//!
//! # Products
//! GET    /products                      - Paginated summaries
//! GET    /products/search?name=         - Regex name search
//! GET    /products/controversial        - Additive ranking (cached)
//! GET    /products/nutriscore/range     - Score range, paginated
//! GET    /products/nutriscore/{score}   - Exact score, paginated
//! GET    /products/{id}                 - Full document
//! POST   /products                      - Predict and create (bearer)
//! DELETE /products/{id}                 - Delete (admin)
//! ```

pub mod auth;
pub mod products;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index).post(products::create))
        .route("/search", get(products::search))
        .route("/controversial", get(products::controversial))
        .route("/nutriscore/range", get(products::by_score_range))
        .route("/nutriscore/{score}", get(products::by_score))
        .route("/{id}", get(products::show).delete(products::delete))
}

/// Create all routes for the API.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(banner))
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/auth", auth_routes())
        .nest("/products", product_routes())
}

async fn banner() -> &'static str {
    "NutriTracker API is online"
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").fetch_one(state.pool()).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::test_support::test_state;

    #[tokio::test]
    async fn test_health_and_banner() {
        for (uri, expected) in [("/health", "ok"), ("/", "NutriTracker API is online")] {
            let response = crate::app(test_state())
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert_eq!(&bytes[..], expected.as_bytes());
        }
    }

    #[tokio::test]
    async fn test_responses_carry_request_id() {
        let response = crate::app(test_state())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let response = crate::app(test_state())
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
