//! Scripted fetcher for tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::models::AuthorRecord;

use super::{AuthorFetcher, FetchError};

/// A scripted response step.
pub enum MockStep {
    Ok(AuthorRecord),
    Err(FetchError),
    /// Never completes; exercises the per-author time budget.
    Hang,
}

/// A fetcher that replays scripted responses per scholar id.
///
/// Each call pops the next step scripted for that id. Running out of steps is
/// a test bug and surfaces as [`FetchError::Api`].
#[derive(Default)]
pub struct MockFetcher {
    scripts: Mutex<HashMap<String, Vec<MockStep>>>,
    attempts: Mutex<Vec<String>>,
    rotations: Mutex<u32>,
    skip_ids_seen: Mutex<Vec<HashSet<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next responses for an id, in call order.
    pub fn script(&self, scholar_id: &str, steps: Vec<MockStep>) {
        let mut scripts = self.scripts.lock().unwrap();
        let entry = scripts.entry(scholar_id.to_string()).or_default();
        // Steps are popped from the back.
        for step in steps.into_iter().rev() {
            entry.push(step);
        }
    }

    /// Ids attempted so far, one entry per fetch call.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempts_for(&self, scholar_id: &str) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|id| id.as_str() == scholar_id)
            .count()
    }

    pub fn rotations(&self) -> u32 {
        *self.rotations.lock().unwrap()
    }

    /// The skip hint passed to each fetch call.
    pub fn skip_ids_seen(&self) -> Vec<HashSet<String>> {
        self.skip_ids_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuthorFetcher for MockFetcher {
    async fn fetch_author(
        &self,
        scholar_id: &str,
        skip_pub_ids: &HashSet<String>,
    ) -> Result<AuthorRecord, FetchError> {
        self.attempts.lock().unwrap().push(scholar_id.to_string());
        self.skip_ids_seen.lock().unwrap().push(skip_pub_ids.clone());

        let step = {
            let mut scripts = self.scripts.lock().unwrap();
            scripts.get_mut(scholar_id).and_then(|steps| steps.pop())
        };

        match step {
            Some(MockStep::Ok(author)) => Ok(author),
            Some(MockStep::Err(err)) => Err(err),
            Some(MockStep::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            None => Err(FetchError::Api(format!("no scripted response for {}", scholar_id))),
        }
    }

    async fn rotate_identity(&self) {
        *self.rotations.lock().unwrap() += 1;
    }
}

/// Minimal author record for tests.
pub fn make_author(scholar_id: &str, titles: &[&str]) -> AuthorRecord {
    let mut author = AuthorRecord::new(scholar_id);
    author.name = Some(format!("Author {}", scholar_id));
    author.publications = titles
        .iter()
        .enumerate()
        .map(|(i, title)| {
            crate::models::PublicationBuilder::new(format!("{}:{}", scholar_id, i))
                .title(*title)
                .build()
        })
        .collect();
    author
}
