//! Product route handlers.

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use nutritracker_core::{NutriGrade, PageRequest, Pagination, ProductId};

use crate::error::{AppError, Result};
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::models::product::{ProductInput, ProductSummary};
use crate::services::ProductService;
use crate::state::AppState;

/// Shortest accepted search query, after trimming.
pub const MIN_SEARCH_LENGTH: usize = 2;

/// Page parameters, parsed leniently: anything unparsable falls back to the default.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    page: Option<String>,
    limit: Option<String>,
}

impl PageQuery {
    fn to_request(&self) -> PageRequest {
        let parse = |v: &Option<String>| v.as_deref().and_then(|s| s.trim().parse::<u32>().ok());
        PageRequest::new(parse(&self.page), parse(&self.limit))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    min: Option<String>,
    max: Option<String>,
    #[serde(flatten)]
    page: PageQuery,
}

#[derive(Debug, Serialize)]
struct SearchCriteria {
    min_nutriscore: f64,
    max_nutriscore: f64,
}

#[derive(Debug, Serialize)]
struct ScorePage {
    products: Vec<ProductSummary>,
    pagination: Pagination,
    #[serde(skip_serializing_if = "Option::is_none")]
    search_criteria: Option<SearchCriteria>,
}

#[derive(Debug, Serialize)]
struct PredictionSummary {
    score: f64,
    grade: NutriGrade,
}

fn service(state: &AppState) -> ProductService<'_> {
    ProductService::new(state.pool(), state.prediction(), state.ranking())
}

fn parse_score(raw: Option<&str>) -> Option<f64> {
    raw?.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_id(raw: &str) -> Result<ProductId> {
    ProductId::parse(raw).map_err(|_| AppError::BadRequest("Invalid product ID format".into()))
}

/// `GET /products?page=&limit=`
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<ProductSummary>>> {
    let products = service(&state).list(query.to_request()).await?;
    Ok(Json(products.iter().map(|p| p.summary()).collect()))
}

/// `GET /products/search?name=`
///
/// The query is a case-insensitive regular expression over product names.
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<ProductSummary>>> {
    let name = query
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing query ?name=".into()))?;

    if name.chars().count() < MIN_SEARCH_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Search query must be at least {MIN_SEARCH_LENGTH} characters"
        )));
    }
    if regex::Regex::new(name).is_err() {
        return Err(AppError::BadRequest("Invalid search pattern".into()));
    }

    let products = service(&state).search(name).await?;
    Ok(Json(products.iter().map(|p| p.summary()).collect()))
}

/// `GET /products/controversial`
pub async fn controversial(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let ranking = service(&state).controversial().await?;
    Ok(Json(ranking.as_ref().clone()))
}

/// `GET /products/nutriscore/range?min=&max=&page=&limit=`
pub async fn by_score_range(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> Result<impl IntoResponse> {
    let (Some(min), Some(max)) = (
        parse_score(query.min.as_deref()),
        parse_score(query.max.as_deref()),
    ) else {
        return Err(AppError::BadRequest(
            "Invalid score range. Use ?min=X&max=Y".into(),
        ));
    };
    if min > max {
        return Err(AppError::BadRequest(
            "Min score cannot be greater than max score".into(),
        ));
    }

    let (products, pagination) = service(&state)
        .by_score_range(min, max, query.page.to_request())
        .await?;

    Ok(Json(ScorePage {
        products: products.iter().map(|p| p.summary()).collect(),
        pagination,
        search_criteria: Some(SearchCriteria {
            min_nutriscore: min,
            max_nutriscore: max,
        }),
    }))
}

/// `GET /products/nutriscore/{score}?page=&limit=`
pub async fn by_score(
    State(state): State<AppState>,
    Path(score): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse> {
    let score = parse_score(Some(&score))
        .ok_or_else(|| AppError::BadRequest("Invalid nutriscore score".into()))?;

    let (products, pagination) = service(&state)
        .by_score(score, query.to_request())
        .await?;

    Ok(Json(ScorePage {
        products: products.iter().map(|p| p.summary()).collect(),
        pagination,
        search_criteria: None,
    }))
}

/// `GET /products/{id}`
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let id = parse_id(&id)?;
    let product = service(&state).get(&id).await?;
    Ok(Json(serde_json::to_value(product.to_document()).map_err(|e| {
        AppError::Internal(format!("failed to serialize product: {e}"))
    })?))
}

/// `POST /products`
///
/// Predicts the NutriScore through the external service, then stores the
/// product with the predicted score.
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    body: std::result::Result<Json<ProductInput>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(input) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let product = input
        .into_new_product()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let created = service(&state).create_with_prediction(product).await?;
    tracing::info!(user_id = %user.id, product_id = %created.product.id, "Product added");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Product created successfully",
            "product": created.product.to_document(),
            "prediction": PredictionSummary {
                score: created.score,
                grade: created.grade,
            },
        })),
    ))
}

/// `DELETE /products/{id}` (admin only)
pub async fn delete(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let id = parse_id(&id)?;
    let product = service(&state).delete(&id).await?;

    tracing::info!(
        product_id = %product.id,
        name = %product.product_name,
        deleted_by = %admin.username,
        admin_email = %admin.email,
        "Product deleted by admin"
    );

    Ok(Json(json!({
        "message": "Product deleted successfully",
        "deletedProduct": {
            "id": product.id,
            "name": product.product_name,
            "brand": product.brands,
            "deletedAt": Utc::now().to_rfc3339(),
            "deletedBy": admin.username,
        },
    })))
}
