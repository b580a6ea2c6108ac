//! Business logic services for the API.
//!
//! # Services
//!
//! - `auth` - Registration, login, admin seeding and bearer token resolution
//! - `prediction` - Outbound client for the NutriScore prediction service
//! - `products` - Product queries, predict-and-create and deletion

pub mod auth;
pub mod prediction;
pub mod products;

pub use auth::{AuthError, AuthService, TokenIssuer};
pub use prediction::{PredictionClient, PredictionError};
pub use products::{ProductError, ProductService, RankingCache};
