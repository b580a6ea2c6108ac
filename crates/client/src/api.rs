//! Cache-backed client for the NutriTracker REST API.
//!
//! Read operations go through the [`TtlCache`] with these keys:
//!
//! | key                          | TTL    |
//! |------------------------------|--------|
//! | `search_{query}_page_{n}`    | 10 min |
//! | `product_{id}`               | 10 min |
//! | `category_{name}`            | 20 min |
//! | `all_products`               | 10 min |
//!
//! Writes (create, delete) invalidate every product key.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use nutritracker_core::ProductId;

use crate::cache::{CacheStats, TtlCache};
use crate::error::{ClientError, default_message};
use crate::models::{
    AuthResponse, Category, ControversialProduct, CreatedProduct, ProductDetail, ProductList,
    ProductStatistics, ProductSummary, Registration, UserProfile,
};
use crate::session::SessionStore;

pub const PRODUCT_TTL: Duration = Duration::from_secs(10 * 60);
pub const CATEGORY_TTL: Duration = Duration::from_secs(20 * 60);

/// Matches every key written by the product lookups.
pub const PRODUCT_CACHE_PATTERN: &str = "(search_|product_|category_|all_products).*";

const LIST_PAGE_SIZE: u32 = 20;
const BULK_PAGE_SIZE: u32 = 50;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Send `request` and decode a JSON body, turning error statuses into
/// [`ClientError::Api`] with the server's `error` message when present.
async fn fetch_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ClientError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.bytes().await?;

    if !status.is_success() {
        let message = serde_json::from_slice::<Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_owned))
            .unwrap_or_else(|| default_message(status).to_owned());
        tracing::warn!(status = status.as_u16(), %message, "API request failed");
        return Err(ClientError::Api { status, message });
    }

    Ok(serde_json::from_slice(&body)?)
}

/// Like [`fetch_json`], but a 404 is `Ok(None)`.
async fn fetch_optional<T: DeserializeOwned>(
    request: RequestBuilder,
) -> Result<Option<T>, ClientError> {
    match fetch_json(request).await {
        Ok(value) => Ok(Some(value)),
        Err(ClientError::Api { status, .. }) if status == StatusCode::NOT_FOUND => Ok(None),
        Err(e) => Err(e),
    }
}

/// API client. Clones share the HTTP connection pool, cache and session.
#[derive(Debug, Clone)]
pub struct NutriClient {
    http: reqwest::Client,
    base_url: Url,
    cache: TtlCache,
    session: Option<Arc<SessionStore>>,
}

impl NutriClient {
    /// Create a client for the API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(mut base_url: Url, cache: TtlCache) -> Result<Self, ClientError> {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url,
            cache,
            session: None,
        })
    }

    /// Attach a session store; login and registration save into it.
    #[must_use]
    pub fn with_session(mut self, session: Arc<SessionStore>) -> Self {
        self.session = Some(session);
        self
    }

    #[must_use]
    pub const fn cache(&self) -> &TtlCache {
        &self.cache
    }

    #[must_use]
    pub fn session(&self) -> Option<&SessionStore> {
        self.session.as_deref()
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(path)?)
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        let token = self
            .session
            .as_ref()
            .and_then(|s| s.token())
            .ok_or(ClientError::Unauthenticated)?;
        Ok(request.bearer_auth(token.expose_secret()))
    }

    // =========================================================================
    // Products (cached)
    // =========================================================================

    /// Search by name, or list a page of products when `query` is blank.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn search_products(
        &self,
        query: &str,
        page: u32,
    ) -> Result<Vec<ProductSummary>, ClientError> {
        let query = query.trim();
        let key = format!("search_{}_page_{page}", query.to_lowercase());

        let request = if query.is_empty() {
            self.http
                .get(self.url("products")?)
                .query(&[("page", page), ("limit", LIST_PAGE_SIZE)])
        } else {
            self.http
                .get(self.url("products/search")?)
                .query(&[("name", query)])
        };

        self.cache
            .get_or_fetch(&key, Some(PRODUCT_TTL), move || async move {
                fetch_json::<ProductList>(request)
                    .await
                    .map(ProductList::into_products)
            })
            .await
    }

    /// Fetch one product. A missing product is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails for any reason other than 404.
    pub async fn product(&self, id: &ProductId) -> Result<Option<ProductDetail>, ClientError> {
        let request = self.http.get(self.url(&format!("products/{id}"))?);

        self.cache
            .get_or_fetch(&format!("product_{id}"), Some(PRODUCT_TTL), move || {
                fetch_optional::<ProductDetail>(request)
            })
            .await
    }

    /// Products whose score falls in the category's range (first 50).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn products_by_category(
        &self,
        category: Category,
    ) -> Result<Vec<ProductSummary>, ClientError> {
        let (min, max) = category.score_range();
        let request = self
            .http
            .get(self.url("products/nutriscore/range")?)
            .query(&[("min", min), ("max", max)])
            .query(&[("page", 1), ("limit", BULK_PAGE_SIZE)]);

        self.cache
            .get_or_fetch(
                &format!("category_{}", category.as_str()),
                Some(CATEGORY_TTL),
                move || async move {
                    fetch_json::<ProductList>(request)
                        .await
                        .map(ProductList::into_products)
                },
            )
            .await
    }

    /// Every product, walking pages of 50 until a short page.
    ///
    /// # Errors
    ///
    /// Returns an error if any page fails to load.
    pub async fn all_products(&self) -> Result<Vec<ProductSummary>, ClientError> {
        let http = self.http.clone();
        let url = self.url("products")?;

        self.cache
            .get_or_fetch("all_products", Some(PRODUCT_TTL), move || async move {
                let mut all = Vec::new();
                for page in 1.. {
                    let batch = fetch_json::<ProductList>(
                        http.get(url.clone())
                            .query(&[("page", page), ("limit", BULK_PAGE_SIZE)]),
                    )
                    .await?
                    .into_products();

                    let done = batch.len() < BULK_PAGE_SIZE as usize;
                    tracing::debug!(page, count = batch.len(), "Loaded product page");
                    all.extend(batch);
                    if done {
                        break;
                    }
                }
                Ok(all)
            })
            .await
    }

    /// Counts per category and the mean score over the whole catalogue.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalogue cannot be loaded.
    pub async fn product_statistics(&self) -> Result<ProductStatistics, ClientError> {
        let products = self.all_products().await?;
        Ok(ProductStatistics::from_products(&products))
    }

    /// The controversy ranking. Not cached here; the server caches it.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn controversial(&self) -> Result<Vec<ControversialProduct>, ClientError> {
        fetch_json(self.http.get(self.url("products/controversial")?)).await
    }

    /// Drop every cached product lookup. Returns how many entries went.
    pub fn clear_product_cache(&self) -> usize {
        let removed = self
            .cache
            .invalidate_pattern(PRODUCT_CACHE_PATTERN)
            .unwrap_or_default();
        tracing::debug!(removed, "Product cache cleared");
        removed
    }

    /// Clear product lookups and reload the full catalogue.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalogue cannot be reloaded.
    pub async fn refresh_product_cache(&self) -> Result<usize, ClientError> {
        self.clear_product_cache();
        Ok(self.all_products().await?.len())
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // =========================================================================
    // Products (writes)
    // =========================================================================

    /// Create a product; the server predicts its NutriScore.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Unauthenticated`] without a session, or the
    /// server's error (400 missing fields, 503/408/502 prediction failures).
    pub async fn create_product(&self, product: &Value) -> Result<CreatedProduct, ClientError> {
        let request = self.authorized(self.http.post(self.url("products")?).json(product))?;
        let created: CreatedProduct = fetch_json(request).await?;
        self.clear_product_cache();
        Ok(created)
    }

    /// Delete a product (admin only).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Unauthenticated`] without a session, or the
    /// server's error (403 non-admin, 404 unknown id).
    pub async fn delete_product(&self, id: &ProductId) -> Result<(), ClientError> {
        let request =
            self.authorized(self.http.delete(self.url(&format!("products/{id}"))?))?;
        fetch_json::<Value>(request).await?;
        self.clear_product_cache();
        Ok(())
    }

    // =========================================================================
    // Auth
    // =========================================================================

    fn remember(&self, auth: AuthResponse) -> UserProfile {
        if let Some(session) = &self.session
            && let Err(e) = session.save(auth.token, auth.user.clone())
        {
            tracing::warn!(error = %e, "Failed to persist session");
        }
        auth.user
    }

    /// Register and start a session.
    ///
    /// # Errors
    ///
    /// Returns the server's error (400 validation, 409 duplicate).
    pub async fn register(&self, registration: &Registration<'_>) -> Result<UserProfile, ClientError> {
        let auth: AuthResponse =
            fetch_json(self.http.post(self.url("auth/register")?).json(registration)).await?;
        Ok(self.remember(auth))
    }

    /// Log in and start a session.
    ///
    /// # Errors
    ///
    /// Returns the server's error (401 invalid credentials).
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, ClientError> {
        let body = serde_json::json!({ "email": email, "password": password });
        let auth: AuthResponse =
            fetch_json(self.http.post(self.url("auth/login")?).json(&body)).await?;
        Ok(self.remember(auth))
    }

    /// End the session. The server call is a courtesy; the local session is
    /// cleared regardless of its outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored session cannot be removed.
    pub async fn logout(&self) -> Result<(), ClientError> {
        if let Err(e) = fetch_json::<Value>(self.http.post(self.url("auth/logout")?)).await {
            tracing::debug!(error = %e, "Logout request failed");
        }
        if let Some(session) = &self.session {
            session.clear()?;
        }
        Ok(())
    }

    /// The current user as seen by the server.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Unauthenticated`] without a session, or 401 if
    /// the token is expired or invalid.
    pub async fn me(&self) -> Result<UserProfile, ClientError> {
        #[derive(serde::Deserialize)]
        struct Me {
            user: UserProfile,
        }

        let request = self.authorized(self.http.get(self.url("auth/me")?))?;
        let me: Me = fetch_json(request).await?;
        Ok(me.user)
    }
}
