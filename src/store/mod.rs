//! Dataset persistence: atomic load/merge/save cycle.
//!
//! The on-disk dataset is a JSON array of author records, written with
//! 2-space indentation and sorted by `scholar_id` so diffs stay readable.
//! Loads degrade to an empty dataset; saves are atomic (temp file + rename)
//! and never silently swallowed — data collected but not persisted is data
//! lost.

use chrono::{SecondsFormat, Utc};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::dedup::dedup_publications;
use crate::merge::merge_author;
use crate::models::AuthorRecord;

/// Errors from the persistence gateway. Only the save path raises them; load
/// failures degrade to an empty dataset.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to write dataset to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize dataset: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// In-memory dataset, keyed by `scholar_id`. BTreeMap keeps iteration (and
/// thus the persisted array and the dedupe scan) deterministic.
pub type Dataset = BTreeMap<String, AuthorRecord>;

/// File-backed store for the merged author dataset.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    path: PathBuf,
}

impl DatasetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the current dataset. A missing or corrupt file yields an empty
    /// dataset and a log line, never an error: the caller must always be
    /// able to start a run.
    pub fn load(&self) -> Dataset {
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "dataset file does not exist, starting fresh");
            return Dataset::new();
        }

        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::error!(path = %self.path.display(), %err, "failed to read dataset, starting fresh");
                return Dataset::new();
            }
        };

        match serde_json::from_str::<Vec<AuthorRecord>>(&raw) {
            Ok(authors) => {
                let mut dataset = Dataset::new();
                for author in authors {
                    if author.has_identity() {
                        dataset.insert(author.scholar_id.clone(), author);
                    }
                }
                tracing::info!(authors = dataset.len(), path = %self.path.display(), "loaded dataset");
                dataset
            }
            Err(err) => {
                tracing::error!(path = %self.path.display(), %err, "invalid dataset file, starting fresh");
                Dataset::new()
            }
        }
    }

    /// Merge freshly scraped records into the persisted dataset and write it
    /// back atomically.
    ///
    /// Sequence: load current -> merge each record by `scholar_id` (records
    /// without an identity are dropped and counted) -> stamp publications
    /// missing `last_scraped` with the current UTC time -> dedupe
    /// publications per author over one dataset-wide seen-set -> write temp
    /// file -> rename over the destination. A crash mid-write leaves the old
    /// file intact.
    pub fn merge_and_save(&self, new_records: &[AuthorRecord]) -> Result<Dataset, StoreError> {
        let mut dataset = self.load();

        let mut skipped = 0usize;
        for incoming in new_records {
            if !incoming.has_identity() {
                skipped += 1;
                continue;
            }
            let merged = merge_author(dataset.get(&incoming.scholar_id), incoming);
            dataset.insert(merged.scholar_id.clone(), merged);
        }
        if skipped > 0 {
            tracing::warn!(skipped, "dropped records without a scholar_id at the merge boundary");
        }

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        for author in dataset.values_mut() {
            for publication in &mut author.publications {
                if publication.last_scraped.as_deref().unwrap_or("").is_empty() {
                    publication.last_scraped = Some(now.clone());
                }
            }
        }

        // One seen-set across all authors: the title key is dataset-wide.
        // Merged-with-history records enter the scan before anything else
        // because the whole dataset was merged above, so first-seen-wins
        // keeps the richer entry.
        let mut seen = HashSet::new();
        for author in dataset.values_mut() {
            let publications = std::mem::take(&mut author.publications);
            author.publications = dedup_publications(publications, &mut seen);
        }

        self.write_atomic(&dataset)?;
        tracing::info!(authors = dataset.len(), path = %self.path.display(), "dataset saved");
        Ok(dataset)
    }

    fn write_atomic(&self, dataset: &Dataset) -> Result<(), StoreError> {
        let authors: Vec<&AuthorRecord> = dataset.values().collect();
        let json = serde_json::to_string_pretty(&authors)?;

        let dir = self.path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(dir) = dir {
            fs::create_dir_all(dir).map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        }

        // Temp file in the destination directory so the rename stays on one
        // filesystem and is atomic.
        let mut tmp = tempfile::NamedTempFile::new_in(dir.unwrap_or(Path::new(".")))
            .map_err(|source| StoreError::Write { path: self.path.clone(), source })?;
        tmp.write_all(json.as_bytes())
            .and_then(|_| tmp.flush())
            .map_err(|source| StoreError::Write { path: self.path.clone(), source })?;
        tmp.persist(&self.path).map_err(|err| StoreError::Write {
            path: self.path.clone(),
            source: err.error,
        })?;
        Ok(())
    }
}
