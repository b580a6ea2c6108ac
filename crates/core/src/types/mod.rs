//! Core types for NutriTracker.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod grade;
pub mod id;
pub mod pagination;
pub mod role;

pub use email::{Email, EmailError};
pub use grade::NutriGrade;
pub use id::*;
pub use pagination::{PageRequest, Pagination};
pub use role::UserRole;
