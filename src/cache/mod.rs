//! Folio cache layer
//!
//! Derived, best-effort views over the relational stores:
//!
//! - **Content cache**: author first page (abstracts), draft detail, published detail
//! - **Interaction cache**: read/like/collect counter hashes with conditional increments
//!
//! Both sit on a [`KvStore`]. Every caller treats a cache error like a miss.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! ttl_seconds = 900
//! abstract_chars = 128
//! first_page_limit = 100
//! precache_enabled = true
//! # ... see config.rs for all options
//! ```

mod config;
mod content;
mod interactions;
pub mod keys;
mod kv;
pub(crate) mod lock;

pub use config::CacheConfig;
pub use content::{CACHE_DETAIL, CACHE_FIRST_PAGE, CACHE_PUBLISHED, ContentCache};
pub use interactions::{CACHE_INTERACTIVE, InteractionCache};
pub use kv::{CacheError, IncrOutcome, KvStore, MemoryKvStore};
