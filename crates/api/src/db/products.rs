//! Product repository for database operations.

use sqlx::PgPool;

use nutritracker_core::{PageRequest, ProductId};

use super::{RepositoryError, conflict_on_unique, invalid_pattern};
use crate::models::product::{ControversialProduct, NewProduct, Product};

/// Maximum rows returned by a name search.
pub const SEARCH_LIMIT: i64 = 20;

/// Size of the controversy ranking.
pub const CONTROVERSIAL_LIMIT: i64 = 20;

/// Repository for product database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// One page of products in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, page: PageRequest) -> Result<Vec<Product>, RepositoryError> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT * FROM products ORDER BY id LIMIT $1 OFFSET $2",
        )
        .bind(i64::from(page.limit()))
        .bind(offset(page))
        .fetch_all(self.pool)
        .await?;

        Ok(products)
    }

    /// Case-insensitive regular-expression match on the product name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::InvalidPattern` if `PostgreSQL` cannot compile
    /// the pattern, or `RepositoryError::Database` if the query fails.
    pub async fn search_by_name(&self, pattern: &str) -> Result<Vec<Product>, RepositoryError> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE product_name ~* $1 ORDER BY product_name LIMIT $2",
        )
        .bind(pattern)
        .bind(SEARCH_LIMIT)
        .fetch_all(self.pool)
        .await
        .map_err(invalid_pattern)?;

        Ok(products)
    }

    /// Products with `min <= nutriscore_score <= max`, ordered by score then
    /// name, together with the total number of matches.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if either query fails.
    pub async fn by_score_range(
        &self,
        min: f64,
        max: f64,
        page: PageRequest,
    ) -> Result<(Vec<Product>, u64), RepositoryError> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT * FROM products \
             WHERE nutriscore_score BETWEEN $1 AND $2 \
             ORDER BY nutriscore_score, product_name \
             LIMIT $3 OFFSET $4",
        )
        .bind(min)
        .bind(max)
        .bind(i64::from(page.limit()))
        .bind(offset(page))
        .fetch_all(self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM products WHERE nutriscore_score BETWEEN $1 AND $2",
        )
        .bind(min)
        .bind(max)
        .fetch_one(self.pool)
        .await?;

        Ok((products, count(total)))
    }

    /// Products whose score equals `score`, ordered by name, with the total.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if either query fails.
    pub async fn by_score(
        &self,
        score: f64,
        page: PageRequest,
    ) -> Result<(Vec<Product>, u64), RepositoryError> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE nutriscore_score = $1 \
             ORDER BY product_name LIMIT $2 OFFSET $3",
        )
        .bind(score)
        .bind(i64::from(page.limit()))
        .bind(offset(page))
        .fetch_all(self.pool)
        .await?;

        let total =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products WHERE nutriscore_score = $1")
                .bind(score)
                .fetch_one(self.pool)
                .await?;

        Ok((products, count(total)))
    }

    /// Top products by controversy score (additive count, plus the NutriScore
    /// when it exceeds 10), highest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn controversial(&self) -> Result<Vec<ControversialProduct>, RepositoryError> {
        let rows = sqlx::query_as::<_, ControversialProduct>(
            "SELECT id, product_name AS name, brands AS brand, \
                    cardinality(additives) AS additives_count, \
                    nutriscore_score, \
                    cardinality(additives)::DOUBLE PRECISION \
                      + CASE WHEN nutriscore_score > 10 THEN nutriscore_score ELSE 0 END \
                      AS controversy_score \
             FROM products \
             ORDER BY controversy_score DESC, product_name \
             LIMIT $1",
        )
        .bind(CONTROVERSIAL_LIMIT)
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(product)
    }

    /// Insert a product under a freshly generated ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` on an ID collision.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn insert(&self, product: &NewProduct) -> Result<Product, RepositoryError> {
        let created = sqlx::query_as::<_, Product>(
            "INSERT INTO products (
                id, product_name, generic_name, quantity, brands, categories_en,
                origins_en, countries_en, traces_en,
                additives_n, additives_en, additives,
                nutriscore_score, nutrition_score_fr_100g, ecoscore_score, ecoscore_grade,
                food_groups_en, main_category_en,
                energy_kcal_100g, fat_100g, saturated_fat_100g, monounsaturated_fat_100g,
                polyunsaturated_fat_100g, trans_fat_100g, cholesterol_100g,
                carbohydrates_100g, sugars_100g, fiber_100g, proteins_100g,
                salt_100g, sodium_100g,
                vitamin_a_100g, vitamin_c_100g, potassium_100g, calcium_100g, iron_100g,
                fruits_vegetables_nuts_estimate_from_ingredients_100g
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30,
                $31, $32, $33, $34, $35, $36, $37
            )
            RETURNING *",
        )
        .bind(ProductId::generate())
        .bind(&product.product_name)
        .bind(&product.generic_name)
        .bind(&product.quantity)
        .bind(&product.brands)
        .bind(&product.categories_en)
        .bind(&product.origins_en)
        .bind(&product.countries_en)
        .bind(&product.traces_en)
        .bind(product.additives_n)
        .bind(&product.additives_en)
        .bind(&product.additives)
        .bind(product.nutriscore_score)
        .bind(product.nutrition_score_fr_100g)
        .bind(product.ecoscore_score)
        .bind(&product.ecoscore_grade)
        .bind(&product.food_groups_en)
        .bind(&product.main_category_en)
        .bind(product.energy_kcal_100g)
        .bind(product.fat_100g)
        .bind(product.saturated_fat_100g)
        .bind(product.monounsaturated_fat_100g)
        .bind(product.polyunsaturated_fat_100g)
        .bind(product.trans_fat_100g)
        .bind(product.cholesterol_100g)
        .bind(product.carbohydrates_100g)
        .bind(product.sugars_100g)
        .bind(product.fiber_100g)
        .bind(product.proteins_100g)
        .bind(product.salt_100g)
        .bind(product.sodium_100g)
        .bind(product.vitamin_a_100g)
        .bind(product.vitamin_c_100g)
        .bind(product.potassium_100g)
        .bind(product.calcium_100g)
        .bind(product.iron_100g)
        .bind(product.fruits_vegetables_nuts_estimate_from_ingredients_100g)
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "product id"))?;

        Ok(created)
    }

    /// Delete a product, returning the removed row if it existed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let deleted = sqlx::query_as::<_, Product>("DELETE FROM products WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(deleted)
    }
}

#[allow(clippy::cast_possible_wrap)] // offsets are bounded by u32 page * u32 limit
const fn offset(page: PageRequest) -> i64 {
    page.offset() as i64
}

#[allow(clippy::cast_sign_loss)] // COUNT(*) is never negative
const fn count(total: i64) -> u64 {
    total as u64
}
