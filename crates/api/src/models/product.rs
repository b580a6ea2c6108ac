//! Product domain types and the JSON shapes built from them.
//!
//! Only canonical field names are persisted. Legacy aliases (`name`, `brand`,
//! `categories`, `calories`, `protein_100g`) are accepted on input as
//! fallbacks and re-emitted on output by [`ProductDocument`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use nutritracker_core::ProductId;

/// Errors produced while turning a request payload into a [`NewProduct`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductInputError {
    #[error("Product name is required (product_name or name)")]
    MissingName,
}

/// A persisted product.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id: ProductId,

    pub product_name: String,
    pub generic_name: Option<String>,
    pub quantity: Option<String>,
    pub brands: Option<String>,
    pub categories_en: Option<String>,
    pub origins_en: Option<String>,
    pub countries_en: Option<String>,
    pub traces_en: Option<String>,

    pub additives_n: Option<f64>,
    pub additives_en: Option<String>,
    pub additives: Vec<String>,

    pub nutriscore_score: Option<f64>,
    pub nutrition_score_fr_100g: Option<f64>,
    pub ecoscore_score: Option<f64>,
    pub ecoscore_grade: Option<String>,

    pub food_groups_en: Option<String>,
    pub main_category_en: Option<String>,

    pub energy_kcal_100g: Option<f64>,
    pub fat_100g: Option<f64>,
    pub saturated_fat_100g: Option<f64>,
    pub monounsaturated_fat_100g: Option<f64>,
    pub polyunsaturated_fat_100g: Option<f64>,
    pub trans_fat_100g: Option<f64>,
    pub cholesterol_100g: Option<f64>,
    pub carbohydrates_100g: Option<f64>,
    pub sugars_100g: Option<f64>,
    pub fiber_100g: Option<f64>,
    pub proteins_100g: Option<f64>,
    pub salt_100g: Option<f64>,
    pub sodium_100g: Option<f64>,

    pub vitamin_a_100g: Option<f64>,
    pub vitamin_c_100g: Option<f64>,
    pub potassium_100g: Option<f64>,
    pub calcium_100g: Option<f64>,
    pub iron_100g: Option<f64>,

    pub fruits_vegetables_nuts_estimate_from_ingredients_100g: Option<f64>,

    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Full record including legacy alias fields, as returned by the detail route.
    #[must_use]
    pub fn to_document(&self) -> ProductDocument<'_> {
        ProductDocument {
            product: self,
            name: &self.product_name,
            brand: self.brands.as_deref(),
            categories: self.categories_en.as_deref(),
            calories: self.energy_kcal_100g,
            protein_100g: self.proteins_100g,
        }
    }

    /// Compact list representation.
    #[must_use]
    pub fn summary(&self) -> ProductSummary {
        ProductSummary {
            id: self.id.clone(),
            name: self.product_name.clone(),
            brand: self.brands.clone(),
            calories: self.energy_kcal_100g,
            sugars: self.sugars_100g,
            salt: self.salt_100g,
            saturated_fat: self.saturated_fat_100g,
            fiber: self.fiber_100g,
            protein: self.proteins_100g,
            nutriscore_score: self.nutriscore_score,
        }
    }
}

/// A product plus its legacy alias fields.
#[derive(Debug, Serialize)]
pub struct ProductDocument<'a> {
    #[serde(flatten)]
    product: &'a Product,
    name: &'a str,
    brand: Option<&'a str>,
    categories: Option<&'a str>,
    calories: Option<f64>,
    protein_100g: Option<f64>,
}

/// Compact product shape used by list, search and score queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub id: ProductId,
    pub name: String,
    pub brand: Option<String>,
    pub calories: Option<f64>,
    pub sugars: Option<f64>,
    pub salt: Option<f64>,
    pub saturated_fat: Option<f64>,
    pub fiber: Option<f64>,
    pub protein: Option<f64>,
    #[serde(rename = "nutriscore_score")]
    pub nutriscore_score: Option<f64>,
}

/// A row of the controversy ranking.
///
/// `controversy_score` is the number of additives plus the NutriScore when the
/// score is above 10.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ControversialProduct {
    pub id: ProductId,
    pub name: String,
    pub brand: Option<String>,
    #[serde(rename = "additivesCount")]
    pub additives_count: i32,
    pub nutriscore_score: Option<f64>,
    pub controversy_score: f64,
}

/// Validated product ready to insert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewProduct {
    pub product_name: String,
    pub generic_name: Option<String>,
    pub quantity: Option<String>,
    pub brands: Option<String>,
    pub categories_en: Option<String>,
    pub origins_en: Option<String>,
    pub countries_en: Option<String>,
    pub traces_en: Option<String>,

    pub additives_n: Option<f64>,
    pub additives_en: Option<String>,
    pub additives: Vec<String>,

    pub nutriscore_score: Option<f64>,
    pub nutrition_score_fr_100g: Option<f64>,
    pub ecoscore_score: Option<f64>,
    pub ecoscore_grade: Option<String>,

    pub food_groups_en: Option<String>,
    pub main_category_en: Option<String>,

    pub energy_kcal_100g: Option<f64>,
    pub fat_100g: Option<f64>,
    pub saturated_fat_100g: Option<f64>,
    pub monounsaturated_fat_100g: Option<f64>,
    pub polyunsaturated_fat_100g: Option<f64>,
    pub trans_fat_100g: Option<f64>,
    pub cholesterol_100g: Option<f64>,
    pub carbohydrates_100g: Option<f64>,
    pub sugars_100g: Option<f64>,
    pub fiber_100g: Option<f64>,
    pub proteins_100g: Option<f64>,
    pub salt_100g: Option<f64>,
    pub sodium_100g: Option<f64>,

    pub vitamin_a_100g: Option<f64>,
    pub vitamin_c_100g: Option<f64>,
    pub potassium_100g: Option<f64>,
    pub calcium_100g: Option<f64>,
    pub iron_100g: Option<f64>,

    pub fruits_vegetables_nuts_estimate_from_ingredients_100g: Option<f64>,
}

impl NewProduct {
    /// Whether any per-100g nutrition value is present.
    #[must_use]
    pub fn has_nutrition_data(&self) -> bool {
        [
            self.energy_kcal_100g,
            self.fat_100g,
            self.saturated_fat_100g,
            self.monounsaturated_fat_100g,
            self.polyunsaturated_fat_100g,
            self.trans_fat_100g,
            self.cholesterol_100g,
            self.carbohydrates_100g,
            self.sugars_100g,
            self.fiber_100g,
            self.proteins_100g,
            self.salt_100g,
            self.sodium_100g,
            self.nutriscore_score,
        ]
        .iter()
        .any(Option::is_some)
    }
}

/// Product creation payload.
///
/// Every field is optional; canonical names win over their legacy aliases.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProductInput {
    pub product_name: Option<String>,
    pub generic_name: Option<String>,
    pub quantity: Option<String>,
    pub brands: Option<String>,
    pub categories_en: Option<String>,
    pub origins_en: Option<String>,
    pub countries_en: Option<String>,
    pub traces_en: Option<String>,

    pub additives_n: Option<f64>,
    pub additives_en: Option<String>,
    #[serde(deserialize_with = "lenient_string_list")]
    pub additives: Vec<String>,

    pub nutriscore_score: Option<f64>,
    pub nutrition_score_fr_100g: Option<f64>,
    pub ecoscore_score: Option<f64>,
    pub ecoscore_grade: Option<String>,

    pub food_groups_en: Option<String>,
    pub main_category_en: Option<String>,

    pub energy_kcal_100g: Option<f64>,
    pub fat_100g: Option<f64>,
    pub saturated_fat_100g: Option<f64>,
    pub monounsaturated_fat_100g: Option<f64>,
    pub polyunsaturated_fat_100g: Option<f64>,
    pub trans_fat_100g: Option<f64>,
    pub cholesterol_100g: Option<f64>,
    pub carbohydrates_100g: Option<f64>,
    pub sugars_100g: Option<f64>,
    pub fiber_100g: Option<f64>,
    pub proteins_100g: Option<f64>,
    pub salt_100g: Option<f64>,
    pub sodium_100g: Option<f64>,

    pub vitamin_a_100g: Option<f64>,
    pub vitamin_c_100g: Option<f64>,
    pub potassium_100g: Option<f64>,
    pub calcium_100g: Option<f64>,
    pub iron_100g: Option<f64>,

    pub fruits_vegetables_nuts_estimate_from_ingredients_100g: Option<f64>,

    // Legacy aliases
    pub name: Option<String>,
    pub brand: Option<String>,
    pub categories: Option<String>,
    pub calories: Option<f64>,
    pub protein_100g: Option<f64>,
}

impl ProductInput {
    /// Resolve aliases and validate the payload.
    ///
    /// # Errors
    ///
    /// Returns [`ProductInputError::MissingName`] when neither `product_name`
    /// nor `name` holds a non-blank value.
    pub fn into_new_product(self) -> Result<NewProduct, ProductInputError> {
        let product_name = non_blank(self.product_name)
            .or_else(|| non_blank(self.name))
            .ok_or(ProductInputError::MissingName)?;

        Ok(NewProduct {
            product_name,
            generic_name: self.generic_name,
            quantity: self.quantity,
            brands: non_blank(self.brands).or_else(|| non_blank(self.brand)),
            categories_en: non_blank(self.categories_en).or_else(|| non_blank(self.categories)),
            origins_en: self.origins_en,
            countries_en: self.countries_en,
            traces_en: self.traces_en,
            additives_n: self.additives_n,
            additives_en: self.additives_en,
            additives: self.additives,
            nutriscore_score: self.nutriscore_score,
            nutrition_score_fr_100g: self.nutrition_score_fr_100g,
            ecoscore_score: self.ecoscore_score,
            ecoscore_grade: self.ecoscore_grade,
            food_groups_en: self.food_groups_en,
            main_category_en: self.main_category_en,
            energy_kcal_100g: self.energy_kcal_100g.or(self.calories),
            fat_100g: self.fat_100g,
            saturated_fat_100g: self.saturated_fat_100g,
            monounsaturated_fat_100g: self.monounsaturated_fat_100g,
            polyunsaturated_fat_100g: self.polyunsaturated_fat_100g,
            trans_fat_100g: self.trans_fat_100g,
            cholesterol_100g: self.cholesterol_100g,
            carbohydrates_100g: self.carbohydrates_100g,
            sugars_100g: self.sugars_100g,
            fiber_100g: self.fiber_100g,
            proteins_100g: self.proteins_100g.or(self.protein_100g),
            salt_100g: self.salt_100g,
            sodium_100g: self.sodium_100g,
            vitamin_a_100g: self.vitamin_a_100g,
            vitamin_c_100g: self.vitamin_c_100g,
            potassium_100g: self.potassium_100g,
            calcium_100g: self.calcium_100g,
            iron_100g: self.iron_100g,
            fruits_vegetables_nuts_estimate_from_ingredients_100g: self
                .fruits_vegetables_nuts_estimate_from_ingredients_100g,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Accept a JSON array of strings; anything else (null, a string, a number)
/// becomes an empty list. Non-string array items are dropped.
fn lenient_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_product() -> Product {
        Product {
            id: ProductId::parse("64b7f0c2a1b2c3d4e5f60718").unwrap(),
            product_name: "Granola".to_owned(),
            generic_name: None,
            quantity: None,
            brands: Some("Crunchy Co".to_owned()),
            categories_en: Some("Breakfast cereals".to_owned()),
            origins_en: None,
            countries_en: None,
            traces_en: None,
            additives_n: None,
            additives_en: None,
            additives: vec!["E322".to_owned()],
            nutriscore_score: Some(12.0),
            nutrition_score_fr_100g: None,
            ecoscore_score: None,
            ecoscore_grade: None,
            food_groups_en: None,
            main_category_en: None,
            energy_kcal_100g: Some(450.0),
            fat_100g: Some(18.0),
            saturated_fat_100g: Some(4.0),
            monounsaturated_fat_100g: None,
            polyunsaturated_fat_100g: None,
            trans_fat_100g: None,
            cholesterol_100g: None,
            carbohydrates_100g: None,
            sugars_100g: Some(22.0),
            fiber_100g: Some(6.0),
            proteins_100g: Some(9.0),
            salt_100g: Some(0.3),
            sodium_100g: None,
            vitamin_a_100g: None,
            vitamin_c_100g: None,
            potassium_100g: None,
            calcium_100g: None,
            iron_100g: None,
            fruits_vegetables_nuts_estimate_from_ingredients_100g: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_aliases_fill_missing_canonical_fields() {
        let input: ProductInput = serde_json::from_value(serde_json::json!({
            "name": "Oat bar",
            "brand": "Acme",
            "categories": "Snacks",
            "calories": 380.0,
            "protein_100g": 7.5
        }))
        .unwrap();

        let product = input.into_new_product().unwrap();
        assert_eq!(product.product_name, "Oat bar");
        assert_eq!(product.brands.as_deref(), Some("Acme"));
        assert_eq!(product.categories_en.as_deref(), Some("Snacks"));
        assert_eq!(product.energy_kcal_100g, Some(380.0));
        assert_eq!(product.proteins_100g, Some(7.5));
        assert!(product.additives.is_empty());
    }

    #[test]
    fn test_canonical_fields_win_over_aliases() {
        let input: ProductInput = serde_json::from_value(serde_json::json!({
            "product_name": "Canonical",
            "name": "Legacy",
            "energy_kcal_100g": 100.0,
            "calories": 999.0
        }))
        .unwrap();

        let product = input.into_new_product().unwrap();
        assert_eq!(product.product_name, "Canonical");
        assert_eq!(product.energy_kcal_100g, Some(100.0));
    }

    #[test]
    fn test_name_is_required() {
        let input: ProductInput =
            serde_json::from_value(serde_json::json!({ "product_name": "   " })).unwrap();
        assert_eq!(
            input.into_new_product(),
            Err(ProductInputError::MissingName)
        );
    }

    #[test]
    fn test_non_array_additives_become_empty() {
        let input: ProductInput = serde_json::from_value(serde_json::json!({
            "name": "x",
            "additives": "E330"
        }))
        .unwrap();
        assert!(input.additives.is_empty());

        let input: ProductInput = serde_json::from_value(serde_json::json!({
            "name": "x",
            "additives": ["E330", 4, "E322"]
        }))
        .unwrap();
        assert_eq!(input.additives, vec!["E330", "E322"]);
    }

    #[test]
    fn test_has_nutrition_data() {
        let mut product = NewProduct {
            product_name: "Water".to_owned(),
            ..NewProduct::default()
        };
        assert!(!product.has_nutrition_data());
        product.salt_100g = Some(0.0);
        assert!(product.has_nutrition_data());
    }

    #[test]
    fn test_document_emits_aliases() {
        let product = sample_product();
        let json = serde_json::to_value(product.to_document()).unwrap();

        assert_eq!(json["id"], "64b7f0c2a1b2c3d4e5f60718");
        assert_eq!(json["product_name"], "Granola");
        assert_eq!(json["name"], "Granola");
        assert_eq!(json["brand"], "Crunchy Co");
        assert_eq!(json["calories"], 450.0);
        assert_eq!(json["protein_100g"], 9.0);
        assert_eq!(json["additives"][0], "E322");
    }

    #[test]
    fn test_summary_field_names() {
        let json = serde_json::to_value(sample_product().summary()).unwrap();
        assert_eq!(json["name"], "Granola");
        assert_eq!(json["saturatedFat"], 4.0);
        assert_eq!(json["protein"], 9.0);
        assert_eq!(json["nutriscore_score"], 12.0);
    }
}
