//! # scholar-harvest
//!
//! Incrementally harvests author/publication records from Google Scholar
//! profiles, merges each session's observations into a persistent dataset
//! without losing previously collected detail, and survives an adversarial
//! anti-automation environment (rate limiting, CAPTCHA interstitials,
//! transient blocking) by saving partial results before aborting a blocked
//! run.
//!
//! ## Architecture
//!
//! - [`models`]: Author, publication and coauthor records
//! - [`normalize`]: Title canonicalization for publication identity
//! - [`merge`]: Non-destructive field-level record merging
//! - [`dedup`]: First-seen-wins title deduplication
//! - [`freshness`]: Staleness-driven re-scrape scheduling
//! - [`crawler`]: Sequential, block-aware crawl controller
//! - [`store`]: Atomic load/merge/save dataset persistence
//! - [`session`]: Session cookie cache and capability traits
//! - [`fetch`]: The fetch collaborator boundary and implementations
//! - [`config`]: Configuration management

pub mod config;
pub mod crawler;
pub mod dedup;
pub mod fetch;
pub mod freshness;
pub mod merge;
pub mod models;
pub mod normalize;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use crawler::{CrawlController, CrawlError, CrawlReport};
pub use fetch::{AuthorFetcher, FetchError, ScholarFetcher};
pub use models::{AuthorRecord, CoauthorRecord, PublicationRecord};
pub use store::DatasetStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
