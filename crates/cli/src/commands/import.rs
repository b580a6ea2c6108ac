//! Bulk product import from an Open Food Facts style CSV export.
//!
//! # Usage
//!
//! ```bash
//! nt-cli import data/food_data.csv
//! ```
//!
//! Recognized columns (others are ignored): `product_name`, `brands`,
//! `categories_en`, `energy-kcal_100g`, `saturated-fat_100g`, `sugars_100g`,
//! `salt_100g`, `fiber_100g`, `proteins_100g`, `nutriscore_score`,
//! `additives_en`.
//!
//! Rows without a single nutrition value are rejected, as are rows that fail
//! to parse or insert. Each row is independent; one bad row never aborts the
//! run.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use nutritracker_api::db::{ProductRepository, create_pool};
use nutritracker_api::models::product::NewProduct;

const DEFAULT_NAME: &str = "Unnamed";
const DEFAULT_BRAND: &str = "Unknown";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Cannot open {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Counts reported at the end of an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub rejected: usize,
}

/// One CSV record. Every column is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CsvRow {
    product_name: Option<String>,
    brands: Option<String>,
    categories_en: Option<String>,
    #[serde(rename = "energy-kcal_100g")]
    energy_kcal_100g: Option<String>,
    #[serde(rename = "saturated-fat_100g")]
    saturated_fat_100g: Option<String>,
    sugars_100g: Option<String>,
    salt_100g: Option<String>,
    fiber_100g: Option<String>,
    proteins_100g: Option<String>,
    nutriscore_score: Option<String>,
    additives_en: Option<String>,
}

/// Empty or unparseable cells are absent.
fn number(cell: Option<&str>) -> Option<f64> {
    cell.and_then(|c| c.trim().parse::<f64>().ok())
        .filter(|n| n.is_finite())
}

fn text(cell: Option<String>) -> Option<String> {
    cell.map(|c| c.trim().to_owned()).filter(|c| !c.is_empty())
}

fn split_additives(cell: Option<&str>) -> Vec<String> {
    cell.map(|c| {
        c.split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_owned)
            .collect()
    })
    .unwrap_or_default()
}

impl CsvRow {
    /// Build the product, or `None` when the row carries no nutrition data.
    fn into_new_product(self) -> Option<NewProduct> {
        let product = NewProduct {
            energy_kcal_100g: number(self.energy_kcal_100g.as_deref()),
            saturated_fat_100g: number(self.saturated_fat_100g.as_deref()),
            sugars_100g: number(self.sugars_100g.as_deref()),
            salt_100g: number(self.salt_100g.as_deref()),
            fiber_100g: number(self.fiber_100g.as_deref()),
            proteins_100g: number(self.proteins_100g.as_deref()),
            nutriscore_score: number(self.nutriscore_score.as_deref()),
            additives: split_additives(self.additives_en.as_deref()),
            additives_en: text(self.additives_en),
            product_name: text(self.product_name).unwrap_or_else(|| DEFAULT_NAME.to_owned()),
            brands: Some(text(self.brands).unwrap_or_else(|| DEFAULT_BRAND.to_owned())),
            categories_en: text(self.categories_en),
            ..NewProduct::default()
        };

        product.has_nutrition_data().then_some(product)
    }
}

/// Parse every row of `source`, yielding the product or `None` for rejects.
fn parse_rows<R: Read>(source: R) -> impl Iterator<Item = Result<Option<NewProduct>, csv::Error>> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(source)
        .into_deserialize::<CsvRow>()
        .map(|row| row.map(CsvRow::into_new_product))
}

fn open(path: &Path) -> Result<File, ImportError> {
    File::open(path).map_err(|source| ImportError::Open {
        path: path.display().to_string(),
        source,
    })
}

/// Count what an import would insert and reject, without a database.
pub fn dry_run(path: &Path) -> Result<ImportSummary, ImportError> {
    let mut summary = ImportSummary::default();
    for (index, row) in parse_rows(open(path)?).enumerate() {
        match row {
            Ok(Some(_)) => summary.inserted += 1,
            Ok(None) => summary.rejected += 1,
            Err(e) => {
                tracing::warn!(line = index + 2, error = %e, "Unreadable row");
                summary.rejected += 1;
            }
        }
    }
    Ok(summary)
}

/// Import every row of the file at `path`.
pub async fn run(path: &Path) -> Result<ImportSummary, ImportError> {
    dotenvy::dotenv().ok();

    let file = open(path)?;
    let database_url =
        super::database_url().ok_or(ImportError::MissingEnvVar("NUTRITRACKER_DATABASE_URL"))?;

    tracing::info!("Connecting to database...");
    let pool = create_pool(&database_url).await?;
    let products = ProductRepository::new(&pool);

    tracing::info!(path = %path.display(), "Importing products");
    let mut summary = ImportSummary::default();

    for (index, row) in parse_rows(file).enumerate() {
        let line = index + 2;
        let product = match row {
            Ok(Some(product)) => product,
            Ok(None) => {
                tracing::debug!(line, "No nutrition data, skipping");
                summary.rejected += 1;
                continue;
            }
            Err(e) => {
                tracing::warn!(line, error = %e, "Unreadable row");
                summary.rejected += 1;
                continue;
            }
        };

        match products.insert(&product).await {
            Ok(_) => summary.inserted += 1,
            Err(e) => {
                tracing::warn!(line, name = %product.product_name, error = %e, "Insert failed");
                summary.rejected += 1;
            }
        }

        if summary.inserted > 0 && summary.inserted % 1000 == 0 {
            tracing::info!(inserted = summary.inserted, "Import progress");
        }
    }

    Ok(summary)
}
