//! Client for the external NutriScore prediction service.
//!
//! One `POST {base}/predict/nutriscore` per product creation, with a fixed
//! timeout and no retry.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::config::PredictionConfig;
use crate::models::product::NewProduct;

const PREDICT_PATH: &str = "predict/nutriscore";

/// Prediction failures, each mapping to a distinct HTTP status.
#[derive(Debug, Error)]
pub enum PredictionError {
    /// Required nutrition inputs are absent; nothing was sent.
    #[error("missing required nutrition fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    /// The service could not be reached.
    #[error("prediction service unavailable: {0}")]
    Unavailable(#[source] reqwest::Error),

    /// The service did not answer within the timeout.
    #[error("prediction service timed out")]
    Timeout,

    /// The service answered with a non-success status.
    #[error("prediction service returned {status}")]
    Upstream {
        status: u16,
        detail: Option<serde_json::Value>,
    },

    /// The service answered 2xx with an unexpected body.
    #[error("invalid prediction response: {0}")]
    InvalidResponse(String),
}

/// Body sent to the prediction service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRequest {
    pub name: String,
    pub energy_100g: f64,
    pub fat_100g: f64,
    pub saturated_fat_100g: f64,
    pub sugars_100g: f64,
    pub salt_100g: f64,
    pub fiber_100g: f64,
    pub proteins_100g: f64,
    pub fruits_vegetables_nuts_100g: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
}

impl PredictionRequest {
    /// Build a request from a product, listing every missing required input.
    ///
    /// # Errors
    ///
    /// Returns [`PredictionError::MissingFields`] naming the absent fields.
    pub fn from_product(product: &NewProduct) -> Result<Self, PredictionError> {
        let mut missing = Vec::new();
        let mut require = |value: Option<f64>, field: &'static str| {
            if value.is_none() {
                missing.push(field);
            }
            value.unwrap_or_default()
        };

        let request = Self {
            name: product.product_name.clone(),
            energy_100g: require(product.energy_kcal_100g, "energy_kcal_100g"),
            fat_100g: require(product.fat_100g, "fat_100g"),
            saturated_fat_100g: require(product.saturated_fat_100g, "saturated_fat_100g"),
            sugars_100g: require(product.sugars_100g, "sugars_100g"),
            salt_100g: require(product.salt_100g, "salt_100g"),
            fiber_100g: require(product.fiber_100g, "fiber_100g"),
            proteins_100g: require(product.proteins_100g, "proteins_100g"),
            fruits_vegetables_nuts_100g: product
                .fruits_vegetables_nuts_estimate_from_ingredients_100g
                .unwrap_or(0.0),
            category: product.categories_en.clone(),
            brand: product.brands.clone(),
        };

        if missing.is_empty() {
            Ok(request)
        } else {
            Err(PredictionError::MissingFields(missing))
        }
    }
}

/// Body returned by the prediction service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PredictionResponse {
    pub nutriscore: f64,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// HTTP client for the prediction service.
#[derive(Debug, Clone)]
pub struct PredictionClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl PredictionClient {
    /// Create a client for the configured service.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot be extended or the HTTP client
    /// cannot be built.
    pub fn new(config: &PredictionConfig) -> Result<Self, PredictionClientError> {
        let mut base = config.base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join(PREDICT_PATH)?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self { http, endpoint })
    }

    /// The full prediction URL.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Ask the service for a NutriScore.
    ///
    /// # Errors
    ///
    /// See [`PredictionError`] for the failure modes.
    pub async fn predict(
        &self,
        request: &PredictionRequest,
    ) -> Result<PredictionResponse, PredictionError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .map(|v| v.get("detail").cloned().unwrap_or(v))
                .or_else(|| (!body.is_empty()).then(|| serde_json::Value::String(body)));

            tracing::warn!(status = status.as_u16(), "Prediction service returned an error");
            return Err(PredictionError::Upstream {
                status: status.as_u16(),
                detail,
            });
        }

        response
            .json::<PredictionResponse>()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PredictionError::Timeout
                } else {
                    PredictionError::InvalidResponse(e.to_string())
                }
            })
    }
}

/// Failure constructing a [`PredictionClient`].
#[derive(Debug, Error)]
pub enum PredictionClientError {
    #[error("invalid prediction URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

fn classify(err: reqwest::Error) -> PredictionError {
    if err.is_timeout() {
        PredictionError::Timeout
    } else {
        PredictionError::Unavailable(err)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn complete_product() -> NewProduct {
        NewProduct {
            product_name: "Lentil soup".to_owned(),
            brands: Some("Soupy".to_owned()),
            energy_kcal_100g: Some(60.0),
            fat_100g: Some(1.0),
            saturated_fat_100g: Some(0.2),
            sugars_100g: Some(1.5),
            salt_100g: Some(0.6),
            fiber_100g: Some(3.0),
            proteins_100g: Some(4.0),
            ..NewProduct::default()
        }
    }

    fn client_for(base: &str, timeout: Duration) -> PredictionClient {
        PredictionClient::new(&PredictionConfig {
            base_url: Url::parse(base).unwrap(),
            timeout,
        })
        .unwrap()
    }

    #[test]
    fn test_missing_fields_are_listed() {
        let product = NewProduct {
            product_name: "Mystery".to_owned(),
            fat_100g: Some(1.0),
            ..NewProduct::default()
        };
        let Err(PredictionError::MissingFields(missing)) = PredictionRequest::from_product(&product)
        else {
            panic!("expected missing fields");
        };
        assert_eq!(
            missing,
            vec![
                "energy_kcal_100g",
                "saturated_fat_100g",
                "sugars_100g",
                "salt_100g",
                "fiber_100g",
                "proteins_100g"
            ]
        );
    }

    #[test]
    fn test_fruit_estimate_defaults_to_zero() {
        let request = PredictionRequest::from_product(&complete_product()).unwrap();
        assert!((request.fruits_vegetables_nuts_100g - 0.0).abs() < f64::EPSILON);
        assert_eq!(request.energy_100g, 60.0);
        assert_eq!(request.brand.as_deref(), Some("Soupy"));
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = client_for("http://ml.internal/api", Duration::from_secs(1));
        assert_eq!(
            client.endpoint().as_str(),
            "http://ml.internal/api/predict/nutriscore"
        );

        let client = client_for("http://localhost:8000", Duration::from_secs(1));
        assert_eq!(
            client.endpoint().as_str(),
            "http://localhost:8000/predict/nutriscore"
        );
    }

    #[tokio::test]
    async fn test_successful_prediction() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/predict/nutriscore"))
            .and(body_partial_json(serde_json::json!({
                "name": "Lentil soup",
                "energy_100g": 60.0,
                "fruits_vegetables_nuts_100g": 0.0
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "abc",
                "name": "Lentil soup",
                "nutriscore": -2.5,
                "created_at": "2026-01-01T00:00:00"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), Duration::from_secs(5));
        let request = PredictionRequest::from_product(&complete_product()).unwrap();
        let response = client.predict(&request).await.unwrap();

        assert!((response.nutriscore - -2.5).abs() < f64::EPSILON);
        assert_eq!(response.id.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_upstream_error_carries_status_and_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/predict/nutriscore"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(serde_json::json!({ "detail": "model not loaded" })),
            )
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), Duration::from_secs(5));
        let request = PredictionRequest::from_product(&complete_product()).unwrap();
        let err = client.predict(&request).await.unwrap_err();

        let PredictionError::Upstream { status, detail } = err else {
            panic!("expected upstream error, got {err:?}");
        };
        assert_eq!(status, 500);
        assert_eq!(detail, Some(serde_json::json!("model not loaded")));
    }

    #[tokio::test]
    async fn test_slow_service_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(2))
                    .set_body_json(serde_json::json!({ "nutriscore": 1.0 })),
            )
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), Duration::from_millis(100));
        let request = PredictionRequest::from_product(&complete_product()).unwrap();
        let err = client.predict(&request).await.unwrap_err();
        assert!(matches!(err, PredictionError::Timeout), "got {err:?}");
    }

    #[tokio::test]
    async fn test_refused_connection_is_unavailable() {
        // Grab a free port, then release it so nothing is listening there
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let client = client_for(&format!("http://127.0.0.1:{port}"), Duration::from_secs(2));
        let request = PredictionRequest::from_product(&complete_product()).unwrap();
        let err = client.predict(&request).await.unwrap_err();
        assert!(matches!(err, PredictionError::Unavailable(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_malformed_success_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), Duration::from_secs(5));
        let request = PredictionRequest::from_product(&complete_product()).unwrap();
        let err = client.predict(&request).await.unwrap_err();
        assert!(matches!(err, PredictionError::InvalidResponse(_)));
    }
}
