//! NutriTracker Core - Shared types library.
//!
//! This crate provides common types used across all NutriTracker components:
//! - `api` - REST API server
//! - `client` - API client with the local TTL cache
//! - `cli` - Command-line tools for migrations, admin seeding and imports
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. This keeps it lightweight and allows it to be used
//! anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, emails, roles, grades and pagination

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
