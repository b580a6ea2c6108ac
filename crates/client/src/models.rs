//! Wire types consumed from the NutriTracker API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nutritracker_core::{Email, NutriGrade, ProductId, UserId, UserRole};

/// Compact product as returned by list, search and score queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub id: ProductId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub calories: Option<f64>,
    #[serde(default)]
    pub sugars: Option<f64>,
    #[serde(default)]
    pub salt: Option<f64>,
    #[serde(default)]
    pub saturated_fat: Option<f64>,
    #[serde(default)]
    pub fiber: Option<f64>,
    #[serde(default)]
    pub protein: Option<f64>,
    #[serde(default, rename = "nutriscore_score")]
    pub nutriscore_score: Option<f64>,
}

/// Full product record. Fields not modelled here are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetail {
    pub id: ProductId,
    pub product_name: String,
    #[serde(default)]
    pub brands: Option<String>,
    #[serde(default)]
    pub categories_en: Option<String>,
    #[serde(default)]
    pub nutriscore_score: Option<f64>,
    #[serde(default)]
    pub energy_kcal_100g: Option<f64>,
    #[serde(default)]
    pub fat_100g: Option<f64>,
    #[serde(default)]
    pub saturated_fat_100g: Option<f64>,
    #[serde(default)]
    pub sugars_100g: Option<f64>,
    #[serde(default)]
    pub salt_100g: Option<f64>,
    #[serde(default)]
    pub fiber_100g: Option<f64>,
    #[serde(default)]
    pub proteins_100g: Option<f64>,
    #[serde(default)]
    pub additives: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ProductDetail {
    /// Letter grade for the stored score, if there is one.
    #[must_use]
    pub fn grade(&self) -> Option<NutriGrade> {
        self.nutriscore_score.map(NutriGrade::from_score)
    }
}

/// A row of the controversy ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControversialProduct {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(rename = "additivesCount")]
    pub additives_count: i32,
    #[serde(default)]
    pub nutriscore_score: Option<f64>,
    pub controversy_score: f64,
}

/// List endpoints return either a bare array or `{products, ...}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ProductList {
    Bare(Vec<ProductSummary>),
    Wrapped { products: Vec<ProductSummary> },
}

impl ProductList {
    pub(crate) fn into_products(self) -> Vec<ProductSummary> {
        match self {
            Self::Bare(products) | Self::Wrapped { products } => products,
        }
    }
}

/// Nutrition category, each backed by a NutriScore range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Healthy,
    Moderate,
    Unhealthy,
}

impl Category {
    pub const ALL: [Self; 3] = [Self::Healthy, Self::Moderate, Self::Unhealthy];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Moderate => "moderate",
            Self::Unhealthy => "unhealthy",
        }
    }

    /// Inclusive score range queried for this category.
    #[must_use]
    pub const fn score_range(self) -> (i32, i32) {
        match self {
            Self::Healthy => (-15, 3),
            Self::Moderate => (4, 11),
            Self::Unhealthy => (12, 40),
        }
    }

    /// Category a score counts toward in statistics.
    #[must_use]
    pub fn for_score(score: f64) -> Self {
        if score <= 3.0 {
            Self::Healthy
        } else if score <= 11.0 {
            Self::Moderate
        } else {
            Self::Unhealthy
        }
    }
}

/// Per-category product counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub healthy: usize,
    pub moderate: usize,
    pub unhealthy: usize,
    pub unscored: usize,
}

/// Aggregate figures over the whole catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductStatistics {
    pub total: usize,
    pub by_category: CategoryCounts,
    /// Mean over scored products; 0 when none are scored.
    pub mean_score: f64,
}

impl ProductStatistics {
    #[must_use]
    pub fn from_products(products: &[ProductSummary]) -> Self {
        let mut by_category = CategoryCounts::default();
        let mut sum = 0.0;
        let mut scored = 0u32;

        for score in products.iter().map(|p| p.nutriscore_score) {
            let Some(score) = score else {
                by_category.unscored += 1;
                continue;
            };
            sum += score;
            scored += 1;
            match Category::for_score(score) {
                Category::Healthy => by_category.healthy += 1,
                Category::Moderate => by_category.moderate += 1,
                Category::Unhealthy => by_category.unhealthy += 1,
            }
        }

        Self {
            total: products.len(),
            by_category,
            mean_score: if scored > 0 { sum / f64::from(scored) } else { 0.0 },
        }
    }
}

/// The public user projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub email: Email,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Body of `/auth/register` and `/auth/login` responses.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub message: String,
    pub token: String,
    pub user: UserProfile,
}

/// Registration payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub confirm_password: &'a str,
}

/// Prediction returned alongside a created product.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PredictionSummary {
    pub score: f64,
    pub grade: NutriGrade,
}

/// Body of a successful `POST /products`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedProduct {
    pub product: ProductDetail,
    pub prediction: PredictionSummary,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn summary(score: Option<f64>) -> ProductSummary {
        ProductSummary {
            id: ProductId::generate(),
            name: Some("x".into()),
            brand: None,
            calories: None,
            sugars: None,
            salt: None,
            saturated_fat: None,
            fiber: None,
            protein: None,
            nutriscore_score: score,
        }
    }

    #[test]
    fn test_product_list_accepts_both_shapes() {
        let item = json!({ "id": "64b7f0c2a1b2c3d4e5f60718", "name": "Soup", "saturatedFat": 0.2, "nutriscore_score": 1.0 });

        let bare: ProductList = serde_json::from_value(json!([item.clone()])).unwrap();
        let wrapped: ProductList =
            serde_json::from_value(json!({ "products": [item], "pagination": {} })).unwrap();

        let bare = bare.into_products();
        assert_eq!(bare.len(), 1);
        assert_eq!(bare[0].saturated_fat, Some(0.2));
        assert_eq!(wrapped.into_products(), bare);
    }

    #[test]
    fn test_category_boundaries() {
        assert_eq!(Category::for_score(3.0), Category::Healthy);
        assert_eq!(Category::for_score(3.5), Category::Moderate);
        assert_eq!(Category::for_score(11.0), Category::Moderate);
        assert_eq!(Category::for_score(12.0), Category::Unhealthy);
        assert_eq!(Category::Unhealthy.score_range(), (12, 40));
    }

    #[test]
    fn test_statistics() {
        let products = [
            summary(Some(-2.0)),
            summary(Some(8.0)),
            summary(Some(20.0)),
            summary(None),
        ];
        let stats = ProductStatistics::from_products(&products);
        assert_eq!(stats.total, 4);
        assert_eq!(
            stats.by_category,
            CategoryCounts {
                healthy: 1,
                moderate: 1,
                unhealthy: 1,
                unscored: 1
            }
        );
        assert!((stats.mean_score - 26.0 / 3.0).abs() < 1e-9);

        assert_eq!(ProductStatistics::from_products(&[]).mean_score, 0.0);
    }

    #[test]
    fn test_detail_keeps_unmodelled_fields() {
        let detail: ProductDetail = serde_json::from_value(json!({
            "id": "64b7f0c2a1b2c3d4e5f60718",
            "product_name": "Soup",
            "name": "Soup",
            "nutriscore_score": -1.0,
            "iron_100g": 0.4
        }))
        .unwrap();
        assert_eq!(detail.grade(), Some(NutriGrade::APlus));
        assert_eq!(detail.extra["iron_100g"], 0.4);
    }
}
