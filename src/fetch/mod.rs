//! The fetch collaborator boundary.
//!
//! The crawl core consumes exactly one capability: fetch an author record by
//! id. [`ScholarFetcher`] is the real reqwest-backed collaborator;
//! [`MockFetcher`] scripts responses for tests. Anti-bot signals surface
//! either as the typed [`FetchError::Challenge`] or as block-indicating
//! phrases inside an otherwise generic error, so classification lives here
//! too.

pub mod mock;
mod scholar;

pub use mock::MockFetcher;
pub use scholar::ScholarFetcher;

use async_trait::async_trait;
use std::collections::HashSet;

use crate::models::AuthorRecord;

/// Case-insensitive phrases that mark an anti-automation response.
const BLOCK_KEYWORDS: &[&str] = &[
    "captcha",
    "unusual traffic",
    "not a robot",
    "verify you",
    "blocked",
];

/// Whether an error message reads like an anti-bot challenge.
pub fn looks_like_block(message: &str) -> bool {
    let lower = message.to_lowercase();
    BLOCK_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Errors from the fetch collaborator.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// An anti-automation challenge was detected. Never retried; aborts the
    /// whole run.
    #[error("Challenge detected: {0}")]
    Challenge(String),

    /// Network or HTTP transport error.
    #[error("Network error: {0}")]
    Network(String),

    /// The response could not be parsed into an author record.
    #[error("Parse error: {0}")]
    Parse(String),

    /// No profile exists for the requested id.
    #[error("Author not found: {0}")]
    NotFound(String),

    /// Unexpected response from the service.
    #[error("Service error: {0}")]
    Api(String),

    /// IO error (session cache, local files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Classify as a block: either the typed challenge variant or a generic
    /// error whose text carries a block-indicating phrase.
    pub fn is_challenge(&self) -> bool {
        match self {
            FetchError::Challenge(_) => true,
            other => looks_like_block(&other.to_string()),
        }
    }

    /// Whether a retry with a rotated identity is worth attempting.
    pub fn is_transient(&self) -> bool {
        if self.is_challenge() {
            return false;
        }
        matches!(self, FetchError::Network(_) | FetchError::Api(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Parse(format!("JSON: {}", err))
    }
}

/// Capability interface the crawl core consumes.
///
/// `skip_pub_ids` is a hint: the collaborator may use it to avoid expensive
/// per-publication detail fetches for publications that are already fresh in
/// the dataset.
#[async_trait]
pub trait AuthorFetcher: Send + Sync {
    async fn fetch_author(
        &self,
        scholar_id: &str,
        skip_pub_ids: &HashSet<String>,
    ) -> Result<AuthorRecord, FetchError>;

    /// Request a fresh outbound identity (user agent, proxy, session) before
    /// the next attempt. Default is a no-op.
    async fn rotate_identity(&self) {}
}
