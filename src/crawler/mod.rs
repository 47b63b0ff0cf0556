//! Crawl orchestration: one author at a time, paced, block-aware.
//!
//! The controller drives the fetch collaborator through a small state
//! machine per target identity (Success, SoftFailure, HardAbort). Transient
//! errors retry with capped exponential backoff and a rotated outbound
//! identity; anything classified as an anti-bot block aborts the whole run
//! after a defensive partial save, because a block is session-wide state and
//! hammering a service that already flagged the traffic only digs the hole
//! deeper.

use std::collections::HashSet;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};

use crate::fetch::AuthorFetcher;
use crate::models::AuthorRecord;
use crate::store::DatasetStore;

/// Tunables for one crawl run.
#[derive(Debug, Clone, Copy)]
pub struct CrawlConfig {
    /// Fetch attempts per author, including the first.
    pub max_retries_per_author: u32,
    /// Wall-clock budget per author. The fetch is expected to be fast, so
    /// blowing this budget is read as "likely stuck on a challenge" rather
    /// than an ordinary timeout.
    pub max_time_per_author: Duration,
    /// First backoff interval.
    pub backoff_base: Duration,
    /// Backoff cap.
    pub backoff_ceiling: Duration,
    /// Pause between consecutive authors.
    pub pace: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_retries_per_author: 3,
            max_time_per_author: Duration::from_secs(30),
            backoff_base: Duration::from_secs(1),
            backoff_ceiling: Duration::from_secs(60),
            pace: Duration::from_secs(3),
        }
    }
}

/// Exponential backoff before the attempt after `attempt` (1-based), capped
/// at the configured ceiling.
pub fn backoff_delay(config: &CrawlConfig, attempt: u32) -> Duration {
    let exp = config.backoff_base.as_secs_f64() * 2f64.powi(attempt.saturating_sub(1) as i32);
    Duration::from_secs_f64(exp.min(config.backoff_ceiling.as_secs_f64()))
}

/// What a finished run collected.
#[derive(Debug, Default)]
pub struct CrawlReport {
    /// Successfully fetched records, in attempt order.
    pub fetched: Vec<AuthorRecord>,
    /// Identities that exhausted their retries without a block. Their prior
    /// data is left untouched in the dataset.
    pub soft_failures: Vec<String>,
}

/// Run-aborting crawl failure.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    /// An anti-bot block was detected. Partial results were saved (or the
    /// save failure was logged) before this surfaced.
    #[error("run aborted by anti-bot block while processing {scholar_id}: {reason}")]
    Blocked { scholar_id: String, reason: String },
}

enum AuthorOutcome {
    Fetched(AuthorRecord),
    SoftFailure,
    Blocked(String),
}

/// Sequential crawl driver. One request in flight, ever: the external
/// service penalizes burst traffic, so correctness here is "one in flight,
/// paced", not throughput.
pub struct CrawlController<'a, F: AuthorFetcher> {
    fetcher: &'a F,
    store: &'a DatasetStore,
    config: CrawlConfig,
}

impl<'a, F: AuthorFetcher> CrawlController<'a, F> {
    pub fn new(fetcher: &'a F, store: &'a DatasetStore, config: CrawlConfig) -> Self {
        Self { fetcher, store, config }
    }

    /// Crawl `targets` in the order supplied.
    ///
    /// On a block, everything collected so far is merged and saved before
    /// the error surfaces, so an abort never loses completed work; the
    /// persisted dataset then reflects exactly the prefix of identities that
    /// completed.
    pub async fn run(
        &self,
        targets: &[String],
        skip_pub_ids: &HashSet<String>,
    ) -> Result<CrawlReport, CrawlError> {
        let mut report = CrawlReport::default();

        for (index, scholar_id) in targets.iter().enumerate() {
            if index > 0 && !self.config.pace.is_zero() {
                sleep(self.config.pace).await;
            }

            match self.crawl_one(scholar_id, skip_pub_ids).await {
                AuthorOutcome::Fetched(author) => {
                    tracing::info!(scholar_id, publications = author.publications.len(), "author fetched");
                    report.fetched.push(author);
                }
                AuthorOutcome::SoftFailure => {
                    tracing::warn!(scholar_id, "retries exhausted, continuing with next author");
                    report.soft_failures.push(scholar_id.clone());
                }
                AuthorOutcome::Blocked(reason) => {
                    tracing::error!(scholar_id, %reason, "block detected, aborting run");
                    self.save_partial(&report.fetched);
                    return Err(CrawlError::Blocked {
                        scholar_id: scholar_id.clone(),
                        reason,
                    });
                }
            }
        }

        Ok(report)
    }

    /// Best-effort defensive save of everything collected so far. A failure
    /// here is logged, not raised: the block is the error the caller needs
    /// to see.
    fn save_partial(&self, fetched: &[AuthorRecord]) {
        if fetched.is_empty() {
            tracing::warn!("no partial results to save on abort");
            return;
        }
        match self.store.merge_and_save(fetched) {
            Ok(_) => tracing::info!(authors = fetched.len(), "partial results saved before abort"),
            Err(err) => tracing::error!(%err, "failed to save partial results on abort"),
        }
    }

    async fn crawl_one(&self, scholar_id: &str, skip_pub_ids: &HashSet<String>) -> AuthorOutcome {
        let started = Instant::now();

        for attempt in 1..=self.config.max_retries_per_author {
            let Some(remaining) = self.config.max_time_per_author.checked_sub(started.elapsed())
            else {
                return AuthorOutcome::Blocked(format!(
                    "time budget of {:?} exhausted after {} attempt(s), likely stuck on a challenge",
                    self.config.max_time_per_author, attempt - 1
                ));
            };

            match timeout(remaining, self.fetcher.fetch_author(scholar_id, skip_pub_ids)).await {
                Ok(Ok(author)) => return AuthorOutcome::Fetched(author),
                Ok(Err(err)) if err.is_challenge() => {
                    return AuthorOutcome::Blocked(err.to_string());
                }
                Ok(Err(err)) => {
                    // A deterministic failure (missing profile, unparseable
                    // page) will not get better with a new identity.
                    if !err.is_transient() {
                        tracing::warn!(scholar_id, %err, "non-retryable fetch error");
                        return AuthorOutcome::SoftFailure;
                    }
                    tracing::warn!(
                        scholar_id,
                        attempt,
                        max = self.config.max_retries_per_author,
                        %err,
                        "fetch attempt failed"
                    );
                    if attempt < self.config.max_retries_per_author {
                        let delay = backoff_delay(&self.config, attempt);
                        tracing::debug!(?delay, "backing off before retry");
                        sleep(delay).await;
                        self.fetcher.rotate_identity().await;
                    }
                }
                Err(_) => {
                    // The attempt outlived the per-author budget. An
                    // otherwise-fast fetch hanging this long reads as a live
                    // challenge page, not an ordinary timeout.
                    return AuthorOutcome::Blocked(format!(
                        "no response within the {:?} per-author budget, likely stuck on a challenge",
                        self.config.max_time_per_author
                    ));
                }
            }
        }

        AuthorOutcome::SoftFailure
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::mock::{make_author, MockFetcher, MockStep};
    use crate::fetch::FetchError;

    fn fast_config() -> CrawlConfig {
        CrawlConfig {
            max_retries_per_author: 3,
            max_time_per_author: Duration::from_millis(200),
            backoff_base: Duration::from_millis(5),
            backoff_ceiling: Duration::from_millis(10),
            pace: Duration::ZERO,
        }
    }

    fn store_in(dir: &tempfile::TempDir) -> DatasetStore {
        DatasetStore::new(dir.path().join("results.json"))
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_success_path_collects_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let fetcher = MockFetcher::new();
        fetcher.script("A", vec![MockStep::Ok(make_author("A", &["Alpha"]))]);
        fetcher.script("B", vec![MockStep::Ok(make_author("B", &["Beta"]))]);

        let controller = CrawlController::new(&fetcher, &store, fast_config());
        let report = controller.run(&ids(&["A", "B"]), &HashSet::new()).await.unwrap();

        assert_eq!(report.fetched.len(), 2);
        assert_eq!(report.fetched[0].scholar_id, "A");
        assert_eq!(report.fetched[1].scholar_id, "B");
        assert!(report.soft_failures.is_empty());
    }

    #[tokio::test]
    async fn test_transient_error_retries_with_rotated_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let fetcher = MockFetcher::new();
        fetcher.script(
            "A",
            vec![
                MockStep::Err(FetchError::Network("connection reset".into())),
                MockStep::Ok(make_author("A", &["Alpha"])),
            ],
        );

        let controller = CrawlController::new(&fetcher, &store, fast_config());
        let report = controller.run(&ids(&["A"]), &HashSet::new()).await.unwrap();

        assert_eq!(report.fetched.len(), 1);
        assert_eq!(fetcher.attempts_for("A"), 2);
        assert_eq!(fetcher.rotations(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_become_soft_failure_and_run_continues() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let fetcher = MockFetcher::new();
        fetcher.script(
            "A",
            vec![
                MockStep::Err(FetchError::Network("reset".into())),
                MockStep::Err(FetchError::Network("reset".into())),
                MockStep::Err(FetchError::Network("reset".into())),
            ],
        );
        fetcher.script("B", vec![MockStep::Ok(make_author("B", &["Beta"]))]);

        let controller = CrawlController::new(&fetcher, &store, fast_config());
        let report = controller.run(&ids(&["A", "B"]), &HashSet::new()).await.unwrap();

        assert_eq!(report.soft_failures, vec!["A"]);
        assert_eq!(report.fetched.len(), 1);
        assert_eq!(report.fetched[0].scholar_id, "B");
    }

    #[tokio::test]
    async fn test_backoff_bound_exactly_max_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let fetcher = MockFetcher::new();
        fetcher.script(
            "A",
            vec![
                MockStep::Err(FetchError::Api("HTTP 503".into())),
                MockStep::Err(FetchError::Api("HTTP 503".into())),
                MockStep::Err(FetchError::Api("HTTP 503".into())),
                // A fourth attempt would succeed; it must never happen.
                MockStep::Ok(make_author("A", &["Alpha"])),
            ],
        );

        let config = fast_config();
        let controller = CrawlController::new(&fetcher, &store, config);
        let report = controller.run(&ids(&["A"]), &HashSet::new()).await.unwrap();

        assert_eq!(fetcher.attempts_for("A"), 3);
        assert_eq!(report.soft_failures, vec!["A"]);
    }

    #[test]
    fn test_backoff_delay_doubles_and_caps_at_ceiling() {
        let config = CrawlConfig {
            backoff_base: Duration::from_secs(1),
            backoff_ceiling: Duration::from_secs(60),
            ..CrawlConfig::default()
        };

        assert_eq!(backoff_delay(&config, 1), Duration::from_secs(1));
        assert_eq!(backoff_delay(&config, 2), Duration::from_secs(2));
        assert_eq!(backoff_delay(&config, 3), Duration::from_secs(4));
        // Every step is bounded by the ceiling.
        assert_eq!(backoff_delay(&config, 10), Duration::from_secs(60));
        assert_eq!(backoff_delay(&config, 30), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_challenge_aborts_and_saves_partial_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let fetcher = MockFetcher::new();
        fetcher.script("A", vec![MockStep::Ok(make_author("A", &["Alpha"]))]);
        fetcher.script("B", vec![MockStep::Ok(make_author("B", &["Beta"]))]);
        fetcher.script(
            "C",
            vec![MockStep::Err(FetchError::Challenge("served a captcha page".into()))],
        );
        fetcher.script("D", vec![MockStep::Ok(make_author("D", &["Delta"]))]);
        fetcher.script("E", vec![MockStep::Ok(make_author("E", &["Epsilon"]))]);

        let controller = CrawlController::new(&fetcher, &store, fast_config());
        let err = controller
            .run(&ids(&["A", "B", "C", "D", "E"]), &HashSet::new())
            .await
            .unwrap_err();

        // The error is the block classification, not a generic failure.
        let CrawlError::Blocked { scholar_id, .. } = &err;
        assert_eq!(scholar_id, "C");

        // Exactly the prefix completed before the block is durable.
        let dataset = store.load();
        assert_eq!(dataset.len(), 2);
        assert!(dataset.contains_key("A"));
        assert!(dataset.contains_key("B"));

        // Nothing after the block was attempted.
        assert!(!fetcher.attempts().contains(&"D".to_string()));
    }

    #[tokio::test]
    async fn test_block_dressed_as_generic_error_still_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let fetcher = MockFetcher::new();
        fetcher.script(
            "A",
            vec![MockStep::Err(FetchError::Api("unusual traffic from your network".into()))],
        );

        let controller = CrawlController::new(&fetcher, &store, fast_config());
        let err = controller.run(&ids(&["A"]), &HashSet::new()).await.unwrap_err();
        assert!(matches!(err, CrawlError::Blocked { .. }));
        // No retries against a live challenge.
        assert_eq!(fetcher.attempts_for("A"), 1);
    }

    #[tokio::test]
    async fn test_hung_fetch_blows_budget_and_classifies_as_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let fetcher = MockFetcher::new();
        fetcher.script("A", vec![MockStep::Ok(make_author("A", &["Alpha"]))]);
        fetcher.script("B", vec![MockStep::Hang]);

        let config = CrawlConfig {
            max_time_per_author: Duration::from_millis(50),
            ..fast_config()
        };
        let controller = CrawlController::new(&fetcher, &store, config);
        let err = controller.run(&ids(&["A", "B"]), &HashSet::new()).await.unwrap_err();

        let CrawlError::Blocked { scholar_id, reason } = &err;
        assert_eq!(scholar_id, "B");
        assert!(reason.contains("budget"));

        // The fetched prefix survived the abort.
        assert!(store.load().contains_key("A"));
    }

    #[tokio::test]
    async fn test_deterministic_failure_skips_retries() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let fetcher = MockFetcher::new();
        fetcher.script("A", vec![MockStep::Err(FetchError::NotFound("A".into()))]);
        fetcher.script("B", vec![MockStep::Ok(make_author("B", &["Beta"]))]);

        let controller = CrawlController::new(&fetcher, &store, fast_config());
        let report = controller.run(&ids(&["A", "B"]), &HashSet::new()).await.unwrap();

        // A missing profile is a soft failure after a single attempt, with
        // no identity rotation and no effect on the rest of the run.
        assert_eq!(report.soft_failures, vec!["A".to_string()]);
        assert_eq!(fetcher.attempts_for("A"), 1);
        assert_eq!(fetcher.rotations(), 0);
        assert_eq!(report.fetched.len(), 1);
    }

    #[tokio::test]
    async fn test_skip_hint_reaches_the_fetcher() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let fetcher = MockFetcher::new();
        fetcher.script("A", vec![MockStep::Ok(make_author("A", &["Alpha"]))]);

        let skip: HashSet<String> = ["A:0".to_string()].into_iter().collect();
        let controller = CrawlController::new(&fetcher, &store, fast_config());
        controller.run(&ids(&["A"]), &skip).await.unwrap();

        assert_eq!(fetcher.skip_ids_seen(), vec![skip]);
    }
}
