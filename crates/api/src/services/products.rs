//! Product service.
//!
//! Wraps [`ProductRepository`] with the predict-and-create flow and a short
//! lived `moka` cache of the controversy ranking, which is the only
//! aggregation query the API runs.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, instrument};

use nutritracker_core::{NutriGrade, PageRequest, Pagination, ProductId};

use super::prediction::{PredictionClient, PredictionError, PredictionRequest};
use crate::db::{ProductRepository, RepositoryError};
use crate::models::product::{ControversialProduct, NewProduct, Product};

/// How long a computed controversy ranking is served before recomputing.
pub const RANKING_TTL: Duration = Duration::from_secs(60);

/// Errors from product operations.
#[derive(Debug, Error)]
pub enum ProductError {
    /// No product with the requested ID.
    #[error("product not found")]
    NotFound,

    /// The prediction step failed.
    #[error(transparent)]
    Prediction(#[from] PredictionError),

    /// The search pattern is not a valid regular expression.
    #[error("invalid search pattern")]
    InvalidPattern,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Cache of the controversy ranking, cleared whenever products change.
#[derive(Clone)]
pub struct RankingCache {
    cache: Cache<(), Arc<Vec<ControversialProduct>>>,
}

impl RankingCache {
    /// Create a cache whose entry expires after `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder().max_capacity(1).time_to_live(ttl).build(),
        }
    }

    async fn get(&self) -> Option<Arc<Vec<ControversialProduct>>> {
        self.cache.get(&()).await
    }

    async fn insert(&self, ranking: Arc<Vec<ControversialProduct>>) {
        self.cache.insert((), ranking).await;
    }

    /// Drop the cached ranking.
    pub async fn invalidate(&self) {
        self.cache.invalidate(&()).await;
    }
}

impl Default for RankingCache {
    fn default() -> Self {
        Self::new(RANKING_TTL)
    }
}

/// A product created from a prediction, with the predicted score and grade.
#[derive(Debug, Clone)]
pub struct PredictedProduct {
    pub product: Product,
    pub score: f64,
    pub grade: NutriGrade,
}

/// Product operations.
pub struct ProductService<'a> {
    products: ProductRepository<'a>,
    prediction: &'a PredictionClient,
    ranking: &'a RankingCache,
}

impl<'a> ProductService<'a> {
    /// Create a new product service.
    #[must_use]
    pub const fn new(
        pool: &'a PgPool,
        prediction: &'a PredictionClient,
        ranking: &'a RankingCache,
    ) -> Self {
        Self {
            products: ProductRepository::new(pool),
            prediction,
            ranking,
        }
    }

    /// One page of products.
    ///
    /// # Errors
    ///
    /// Returns `ProductError::Repository` if the query fails.
    pub async fn list(&self, page: PageRequest) -> Result<Vec<Product>, ProductError> {
        Ok(self.products.list(page).await?)
    }

    /// Name search with an already validated regular expression.
    ///
    /// # Errors
    ///
    /// Returns `ProductError::InvalidPattern` if the database rejects the
    /// pattern, `ProductError::Repository` if the query fails.
    pub async fn search(&self, pattern: &str) -> Result<Vec<Product>, ProductError> {
        self.products
            .search_by_name(pattern)
            .await
            .map_err(|e| match e {
                RepositoryError::InvalidPattern => ProductError::InvalidPattern,
                other => ProductError::Repository(other),
            })
    }

    /// Products with a score in `[min, max]`.
    ///
    /// # Errors
    ///
    /// Returns `ProductError::Repository` if the query fails.
    pub async fn by_score_range(
        &self,
        min: f64,
        max: f64,
        page: PageRequest,
    ) -> Result<(Vec<Product>, Pagination), ProductError> {
        let (products, total) = self.products.by_score_range(min, max, page).await?;
        Ok((products, Pagination::new(page, total)))
    }

    /// Products whose score equals `score`.
    ///
    /// # Errors
    ///
    /// Returns `ProductError::Repository` if the query fails.
    pub async fn by_score(
        &self,
        score: f64,
        page: PageRequest,
    ) -> Result<(Vec<Product>, Pagination), ProductError> {
        let (products, total) = self.products.by_score(score, page).await?;
        Ok((products, Pagination::new(page, total)))
    }

    /// The controversy ranking, served from cache when fresh.
    ///
    /// # Errors
    ///
    /// Returns `ProductError::Repository` if the query fails.
    #[instrument(skip(self))]
    pub async fn controversial(&self) -> Result<Arc<Vec<ControversialProduct>>, ProductError> {
        if let Some(ranking) = self.ranking.get().await {
            debug!("Cache hit for controversy ranking");
            return Ok(ranking);
        }

        let ranking = Arc::new(self.products.controversial().await?);
        self.ranking.insert(Arc::clone(&ranking)).await;
        Ok(ranking)
    }

    /// Fetch one product.
    ///
    /// # Errors
    ///
    /// Returns `ProductError::NotFound` if no product has this ID.
    pub async fn get(&self, id: &ProductId) -> Result<Product, ProductError> {
        self.products.get(id).await?.ok_or(ProductError::NotFound)
    }

    /// Ask the prediction service for a score, then persist the product with it.
    ///
    /// Nothing is sent or stored if required nutrition inputs are missing.
    ///
    /// # Errors
    ///
    /// Returns `ProductError::Prediction` if the inputs are incomplete or the
    /// service fails, and `ProductError::Repository` if the insert fails.
    #[instrument(skip(self, product), fields(name = %product.product_name))]
    pub async fn create_with_prediction(
        &self,
        mut product: NewProduct,
    ) -> Result<PredictedProduct, ProductError> {
        let request = PredictionRequest::from_product(&product)?;
        let prediction = self.prediction.predict(&request).await?;

        let score = prediction.nutriscore;
        let grade = NutriGrade::from_score(score);
        product.nutriscore_score = Some(score);

        let product = self.products.insert(&product).await?;
        self.ranking.invalidate().await;

        tracing::info!(product_id = %product.id, score, grade = %grade, "Product created from prediction");
        Ok(PredictedProduct {
            product,
            score,
            grade,
        })
    }

    /// Delete a product, returning what was removed.
    ///
    /// # Errors
    ///
    /// Returns `ProductError::NotFound` if no product has this ID.
    pub async fn delete(&self, id: &ProductId) -> Result<Product, ProductError> {
        let deleted = self.products.delete(id).await?.ok_or(ProductError::NotFound)?;
        self.ranking.invalidate().await;
        Ok(deleted)
    }
}
