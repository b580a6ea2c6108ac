//! Domain models for the API.

pub mod product;
pub mod user;

pub use product::{
    ControversialProduct, NewProduct, Product, ProductDocument, ProductInput, ProductInputError,
    ProductSummary,
};
pub use user::{SafeUser, User};
