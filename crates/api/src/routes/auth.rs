//! Authentication route handlers.
//!
//! Tokens are stateless: logout only tells the client to drop its token.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::middleware::RequireAuth;
use crate::services::AuthService;
use crate::services::auth::{LoginRequest, RegisterRequest};
use crate::state::AppState;

fn json_body<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(value)| value)
        .map_err(|e| AppError::BadRequest(e.body_text()))
}

/// `POST /auth/register`
pub async fn register(
    State(state): State<AppState>,
    body: std::result::Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let request = json_body(body)?;
    let (user, token) = AuthService::new(state.pool(), state.tokens())
        .register(&request)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered successfully",
            "token": token,
            "user": user.to_safe(),
        })),
    ))
}

/// `POST /auth/login`
pub async fn login(
    State(state): State<AppState>,
    body: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let request = json_body(body)?;
    let (user, token) = AuthService::new(state.pool(), state.tokens())
        .login(&request)
        .await?;

    set_sentry_user(&user.id, &user.username);

    Ok(Json(json!({
        "message": "Login successful",
        "token": token,
        "user": user.to_safe(),
    })))
}

/// `POST /auth/logout`
pub async fn logout() -> impl IntoResponse {
    clear_sentry_user();
    Json(json!({
        "message": "Logout successful. Please remove the token from client storage."
    }))
}

/// `GET /auth/me`
pub async fn me(RequireAuth(user): RequireAuth) -> impl IntoResponse {
    Json(json!({ "user": user.to_safe() }))
}
