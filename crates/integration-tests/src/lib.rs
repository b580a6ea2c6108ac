//! Integration tests for NutriTracker.
//!
//! # Running Tests
//!
//! ```bash
//! # Start the database and the API, then
//! cargo run -p nutritracker-cli -- migrate
//! cargo run -p nutritracker-api &
//!
//! # Run integration tests
//! cargo test -p nutritracker-integration-tests -- --ignored
//! ```
//!
//! # Environment
//!
//! - `NUTRITRACKER_API_URL` - API base URL (default `http://localhost:3000`)
//! - `ADMIN_EMAIL` / `ADMIN_PASSWORD` - an existing admin account; admin-only
//!   tests are skipped when unset

use reqwest::Client;
use serde_json::{Value, json};
use uuid::Uuid;

/// Base URL of the API under test.
#[must_use]
pub fn api_base_url() -> String {
    std::env::var("NUTRITRACKER_API_URL").unwrap_or_else(|_| "http://localhost:3000".to_owned())
}

/// `{base}{path}`.
#[must_use]
pub fn url(path: &str) -> String {
    format!("{}{path}", api_base_url().trim_end_matches('/'))
}

/// A short random suffix for usernames and emails.
#[must_use]
pub fn unique_suffix() -> String {
    Uuid::new_v4().simple().to_string().chars().take(10).collect()
}

/// Admin credentials from the environment, if configured.
#[must_use]
pub fn admin_credentials() -> Option<(String, String)> {
    Some((
        std::env::var("ADMIN_EMAIL").ok()?,
        std::env::var("ADMIN_PASSWORD").ok()?,
    ))
}

/// A fresh user's registration body.
#[must_use]
pub fn registration() -> Value {
    let suffix = unique_suffix();
    json!({
        "username": format!("it_{suffix}"),
        "email": format!("it_{suffix}@example.com"),
        "password": "integration-pass",
        "confirmPassword": "integration-pass",
    })
}

/// Register a fresh user and return its token.
///
/// # Panics
///
/// Panics if registration does not succeed.
pub async fn register_user(client: &Client) -> String {
    let resp = client
        .post(url("/auth/register"))
        .json(&registration())
        .send()
        .await
        .expect("Failed to register");
    assert_eq!(resp.status(), reqwest::StatusCode::CREATED);

    let body: Value = resp.json().await.expect("Failed to read response");
    body["token"].as_str().expect("token missing").to_owned()
}

/// Log in and return the token.
///
/// # Panics
///
/// Panics if login does not succeed.
pub async fn login(client: &Client, email: &str, password: &str) -> String {
    let resp = client
        .post(url("/auth/login"))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .expect("Failed to log in");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    let body: Value = resp.json().await.expect("Failed to read response");
    body["token"].as_str().expect("token missing").to_owned()
}
