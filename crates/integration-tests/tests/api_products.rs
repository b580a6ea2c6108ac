//! Integration tests for product queries and admin deletion.
//!
//! These tests require:
//! - A migrated `PostgreSQL` database
//! - The API running (cargo run -p nutritracker-api)
//! - `ADMIN_EMAIL` / `ADMIN_PASSWORD` for the admin tests
//!
//! Run with: cargo test -p nutritracker-integration-tests -- --ignored

use std::sync::Arc;

use nutritracker_client::{CacheConfig, MemorySnapshotStore, NutriClient, SessionStore, TtlCache};
use nutritracker_core::ProductId;
use nutritracker_integration_tests::{admin_credentials, api_base_url, login, register_user, url};
use reqwest::{Client, StatusCode};
use serde_json::Value;

async fn get(path: &str) -> (StatusCode, Value) {
    let resp = Client::new()
        .get(url(path))
        .send()
        .await
        .expect("Request failed");
    let status = resp.status();
    let body = resp.json().await.unwrap_or(Value::Null);
    (status, body)
}

// ============================================================================
// Queries
// ============================================================================

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_list_respects_limit() {
    let (status, body) = get("/products?page=1&limit=5").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().expect("array").len() <= 5);
}

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_query_validation() {
    for (path, expected) in [
        ("/products/search", StatusCode::BAD_REQUEST),
        ("/products/search?name=a", StatusCode::BAD_REQUEST),
        ("/products/search?name=(", StatusCode::BAD_REQUEST),
        ("/products/search?name=%5Cp%7BL%7D", StatusCode::BAD_REQUEST),
        ("/products/nutriscore/range?min=5", StatusCode::BAD_REQUEST),
        ("/products/nutriscore/range?min=9&max=1", StatusCode::BAD_REQUEST),
        ("/products/nutriscore/abc", StatusCode::BAD_REQUEST),
        ("/products/not-an-id", StatusCode::BAD_REQUEST),
        ("/products/000000000000000000000000", StatusCode::NOT_FOUND),
    ] {
        let (status, body) = get(path).await;
        assert_eq!(status, expected, "{path}");
        assert!(body["error"].is_string(), "{path}");
    }
}

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_range_envelope() {
    let (status, body) = get("/products/nutriscore/range?min=-15&max=3&limit=10").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["products"].is_array());
    assert_eq!(body["search_criteria"]["min_nutriscore"], -15.0);
    assert_eq!(body["pagination"]["current_page"], 1);
}

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_controversial_is_ranked() {
    let (status, body) = get("/products/controversial").await;
    assert_eq!(status, StatusCode::OK);

    let scores: Vec<f64> = body
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|p| p["controversy_score"].as_f64())
        .collect();
    assert!(scores.len() <= 20);
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
}

// ============================================================================
// Deletion
// ============================================================================

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_delete_requires_admin() {
    let client = Client::new();
    let token = register_user(&client).await;

    let resp = client
        .delete(url("/products/000000000000000000000000"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Request failed");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = client
        .delete(url("/products/000000000000000000000000"))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "Requires running API server, database and ADMIN_EMAIL/ADMIN_PASSWORD"]
async fn test_admin_delete_unknown_product() {
    let Some((email, password)) = admin_credentials() else {
        return;
    };
    let client = Client::new();
    let token = login(&client, &email, &password).await;

    let resp = client
        .delete(url("/products/ffffffffffffffffffffffff"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Request failed");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "Requires running API server, database and ADMIN_EMAIL/ADMIN_PASSWORD"]
async fn test_admin_delete_malformed_id() {
    let Some((email, password)) = admin_credentials() else {
        return;
    };
    let client = Client::new();
    let token = login(&client, &email, &password).await;

    let resp = client
        .delete(url("/products/not-a-hex-id"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Request failed");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.expect("Failed to read response");
    assert_eq!(body["error"], "Invalid product ID format");
}

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_show_malformed_id() {
    let (status, body) = get("/products/not-a-hex-id").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid product ID format");
}

// ============================================================================
// Client against the live API
// ============================================================================

#[tokio::test]
#[ignore = "Requires running API server and database"]
async fn test_client_caches_live_lookups() {
    let cache = TtlCache::in_memory(CacheConfig::default());
    let session = Arc::new(SessionStore::open(Arc::new(MemorySnapshotStore::new())));
    let client = NutriClient::new(api_base_url().parse().expect("base url"), cache)
        .expect("client")
        .with_session(session);

    let first = client.search_products("", 1).await.expect("list");
    let second = client.search_products("", 1).await.expect("list");
    assert_eq!(first, second);

    let stats = client.cache_stats();
    assert_eq!(stats.hit_count, 1);
    assert_eq!(stats.miss_count, 1);

    let missing = ProductId::parse("ffffffffffffffffffffffff").expect("id");
    assert!(client.product(&missing).await.expect("lookup").is_none());
}
