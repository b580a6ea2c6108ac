//! NutriTracker API library.
//!
//! This crate provides the API as a library so the router can be exercised
//! in tests and reused by the CLI.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use axum::{Router, http::Request};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use state::AppState;

/// Build the application router with tracing, request ID and CORS layers.
///
/// Sentry layers are added by the binary, outermost.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::routes())
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;
    use url::Url;

    use crate::config::{ApiConfig, AuthConfig, PredictionConfig};
    use crate::services::TokenIssuer;
    use crate::services::auth::token::FixedClock;
    use crate::state::AppState;

    /// State backed by a lazy pool; any handler that reaches the database fails.
    pub fn test_state() -> AppState {
        let config = ApiConfig {
            database_url: SecretString::from("postgres://localhost/unused".to_owned()),
            host: "127.0.0.1".parse().unwrap(),
            port: 0,
            auth: AuthConfig {
                jwt_secret: SecretString::from("k3Y!p9@Lq2#Zr8$Wm5%Tx7^Vb4&Nc6*D".to_owned()),
                token_ttl: Duration::from_secs(3600),
            },
            prediction: PredictionConfig {
                base_url: Url::parse("http://127.0.0.1:9").unwrap(),
                timeout: Duration::from_millis(200),
            },
            sentry_dsn: None,
            sentry_environment: None,
        };
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        AppState::new(config, pool).unwrap()
    }

    /// A token signed with the test secret whose expiry lies in the past.
    pub fn expired_token(state: &AppState) -> String {
        TokenIssuer::with_clock(&state.config().auth, Arc::new(FixedClock(1_000)))
            .issue(nutritracker_core::UserId::new(1))
            .unwrap()
    }

    pub fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }

    async fn call(state: AppState, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = crate::app(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    pub async fn get(state: AppState, uri: &str) -> (StatusCode, serde_json::Value) {
        get_with(state, uri, None).await
    }

    pub async fn get_with(
        state: AppState,
        uri: &str,
        authorization: Option<&str>,
    ) -> (StatusCode, serde_json::Value) {
        send(state, "GET", uri, authorization, None).await
    }

    pub async fn send(
        state: AppState,
        method: &str,
        uri: &str,
        authorization: Option<&str>,
        json: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        let body = match json {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        call(state, builder.body(body).unwrap()).await
    }

    pub async fn send_raw(
        state: AppState,
        method: &str,
        uri: &str,
        raw: &'static str,
    ) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(raw))
            .unwrap();
        call(state, request).await
    }
}
