//! Staleness-driven re-scrape scheduling.
//!
//! Inspects `last_scraped` stamps in the merged dataset to decide which
//! authors the next run should fetch and which publications that fetch may
//! treat as fresh (the cheap-fetch hint). This module is the sole authority
//! for the crawl's input set when no explicit id list is configured.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Utc};

use crate::models::AuthorRecord;

/// A stamp that fails to parse is treated as stale: re-fetching wastes a
/// request, while trusting a corrupt stamp can strand a record forever.
pub const FAIL_OPEN_ON_UNPARSEABLE_STAMP: bool = true;

fn parse_stamp(stamp: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(stamp)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn is_fresh(stamp: &str, now: DateTime<Utc>, threshold: Duration) -> bool {
    match parse_stamp(stamp) {
        Some(scraped_at) => now.signed_duration_since(scraped_at) <= threshold,
        None => {
            tracing::warn!(stamp, "unparseable last_scraped stamp");
            !FAIL_OPEN_ON_UNPARSEABLE_STAMP
        }
    }
}

/// Whether an author must be re-fetched.
///
/// True when the author has no publications at all, or any publication has
/// no `last_scraped`, an unparseable stamp, or a stamp older than
/// `threshold_days`.
pub fn needs_refresh(author: &AuthorRecord, threshold_days: u32) -> bool {
    needs_refresh_at(author, threshold_days, Utc::now())
}

pub(crate) fn needs_refresh_at(author: &AuthorRecord, threshold_days: u32, now: DateTime<Utc>) -> bool {
    if author.publications.is_empty() {
        return true;
    }

    let threshold = Duration::days(i64::from(threshold_days));
    author.publications.iter().any(|p| match &p.last_scraped {
        Some(stamp) => !is_fresh(stamp, now, threshold),
        None => true,
    })
}

/// Ids of publications fresh enough to skip during the next fetch.
///
/// Returns the `author_pub_id` of every publication whose stamp is present,
/// parseable and within the threshold. Used as a hint so the fetch
/// collaborator can avoid redundant per-publication detail requests.
pub fn skippable_publication_ids(author: &AuthorRecord, threshold_days: u32) -> HashSet<String> {
    skippable_publication_ids_at(author, threshold_days, Utc::now())
}

pub(crate) fn skippable_publication_ids_at(
    author: &AuthorRecord,
    threshold_days: u32,
    now: DateTime<Utc>,
) -> HashSet<String> {
    let threshold = Duration::days(i64::from(threshold_days));

    author
        .publications
        .iter()
        .filter(|p| p.has_pub_id())
        .filter(|p| {
            p.last_scraped
                .as_deref()
                .is_some_and(|stamp| is_fresh(stamp, now, threshold))
        })
        .map(|p| p.author_pub_id.clone())
        .collect()
}

/// Select the next run's targets from the merged dataset, in dataset order.
pub fn select_targets(dataset: &BTreeMap<String, AuthorRecord>, threshold_days: u32) -> Vec<String> {
    let now = Utc::now();
    dataset
        .values()
        .filter(|author| needs_refresh_at(author, threshold_days, now))
        .map(|author| author.scholar_id.clone())
        .collect()
}

/// Skip hints pooled across the whole dataset for one run.
pub fn dataset_skip_ids(dataset: &BTreeMap<String, AuthorRecord>, threshold_days: u32) -> HashSet<String> {
    let now = Utc::now();
    dataset
        .values()
        .flat_map(|author| skippable_publication_ids_at(author, threshold_days, now))
        .collect()
}
