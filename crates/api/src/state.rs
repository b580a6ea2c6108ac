//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::ApiConfig;
use crate::services::prediction::{PredictionClient, PredictionClientError};
use crate::services::{RankingCache, TokenIssuer};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ApiConfig,
    pool: PgPool,
    tokens: TokenIssuer,
    prediction: PredictionClient,
    ranking: RankingCache,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the prediction client cannot be built from the
    /// configured URL.
    pub fn new(config: ApiConfig, pool: PgPool) -> Result<Self, PredictionClientError> {
        let tokens = TokenIssuer::new(&config.auth);
        Self::with_token_issuer(config, pool, tokens)
    }

    /// Create application state with an explicit token issuer.
    ///
    /// # Errors
    ///
    /// Returns an error if the prediction client cannot be built.
    pub fn with_token_issuer(
        config: ApiConfig,
        pool: PgPool,
        tokens: TokenIssuer,
    ) -> Result<Self, PredictionClientError> {
        let prediction = PredictionClient::new(&config.prediction)?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                tokens,
                prediction,
                ranking: RankingCache::default(),
            }),
        })
    }

    /// Get a reference to the API configuration.
    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the token issuer.
    #[must_use]
    pub fn tokens(&self) -> &TokenIssuer {
        &self.inner.tokens
    }

    /// Get a reference to the prediction service client.
    #[must_use]
    pub fn prediction(&self) -> &PredictionClient {
        &self.inner.prediction
    }

    /// Get a reference to the controversy ranking cache.
    #[must_use]
    pub fn ranking(&self) -> &RankingCache {
        &self.inner.ranking
    }
}
