//! NutriTracker client layer.
//!
//! Everything a front end needs to talk to the API without hammering it:
//!
//! - [`cache`] - bounded TTL cache with snapshot persistence and request
//!   coalescing
//! - [`api`] - [`NutriClient`], whose product lookups go through the cache
//! - [`session`] - the logged-in user's token and profile
//! - [`likes`] - liked products
//! - [`search`] - debounced, switch-to-latest live search
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use nutritracker_client::{
//!     CacheConfig, FileSnapshotStore, NutriClient, SessionStore, SystemClock, TtlCache,
//! };
//!
//! # async fn demo() -> Result<(), nutritracker_client::ClientError> {
//! let cache = TtlCache::new(
//!     CacheConfig::default(),
//!     Arc::new(FileSnapshotStore::new("data/cache.json")),
//!     Arc::new(SystemClock),
//! );
//! let _maintenance = cache.spawn_maintenance();
//!
//! let session = Arc::new(SessionStore::open(Arc::new(FileSnapshotStore::new(
//!     "data/session.json",
//! ))));
//! let client = NutriClient::new("http://localhost:3000".parse()?, cache)?.with_session(session);
//!
//! for product in client.search_products("yogurt", 1).await? {
//!     println!("{:?} {:?}", product.name, product.nutriscore_score);
//! }
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cache;
pub mod clock;
pub mod error;
pub mod likes;
pub mod models;
pub mod search;
pub mod session;

pub use api::NutriClient;
pub use cache::{
    CacheConfig, CacheStats, FileSnapshotStore, MaintenanceHandle, MemorySnapshotStore,
    SnapshotStore, TtlCache,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ClientError, PersistError};
pub use likes::LikeStore;
pub use models::{
    Category, ControversialProduct, ProductDetail, ProductStatistics, ProductSummary,
    Registration, UserProfile,
};
pub use search::{DEFAULT_DEBOUNCE, LiveSearch, SearchOutcome};
pub use session::SessionStore;
