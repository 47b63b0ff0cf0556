//! Session persistence and the narrow session capability surface.
//!
//! A human clears a challenge out-of-band (see [`ChallengeSolver`]); the
//! resulting cookie set is cached on disk and injected into the fetch
//! collaborator through [`SessionStore`] on the next run. The core never
//! drives the interactive solve and never reaches into collaborator
//! internals.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::fetch::FetchError;

/// One browser cookie captured from a solved session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    #[serde(default = "default_cookie_path")]
    pub path: String,

    /// Unix expiry, where the browser reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

/// A solved session: cookies plus any local storage the solver captured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CachedSession {
    #[serde(default)]
    pub cookies: Vec<SessionCookie>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub local_storage: HashMap<String, String>,
}

impl CachedSession {
    /// A session with no cookies cannot help; treat it as absent.
    pub fn is_usable(&self) -> bool {
        !self.cookies.is_empty()
    }
}

/// File-backed cache of the last known-good session.
///
/// Absence of the file is the normal first-run state, never an error.
#[derive(Debug, Clone)]
pub struct SessionCache {
    path: PathBuf,
}

impl SessionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached session, if a usable one exists.
    pub fn load(&self) -> Option<CachedSession> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "no cached session");
            return None;
        }

        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "failed to read session cache");
                return None;
            }
        };

        match serde_json::from_str::<CachedSession>(&raw) {
            Ok(session) if session.is_usable() => {
                tracing::info!(cookies = session.cookies.len(), "loaded cached session");
                Some(session)
            }
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "corrupt session cache ignored");
                None
            }
        }
    }

    pub fn save(&self, session: &CachedSession) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(session)?;
        fs::write(&self.path, json)
    }

    /// Drop a session that failed validation so the next run starts clean.
    pub fn remove(&self) {
        if self.path.exists() {
            if let Err(err) = fs::remove_file(&self.path) {
                tracing::warn!(path = %self.path.display(), %err, "could not remove stale session cache");
            } else {
                tracing::info!(path = %self.path.display(), "removed session cache after failed validation");
            }
        }
    }
}

/// The only session surface the core calls on the fetch collaborator.
#[async_trait]
pub trait SessionStore {
    /// Replace the outbound header set used for subsequent requests.
    fn set_headers(&self, headers: Vec<(String, String)>);

    /// Inject cookies from a solved session.
    fn inject_cookies(&self, cookies: &[SessionCookie]);

    /// Probe the service with the current session. `Ok(true)` means the
    /// session passes; `Ok(false)` means the service still serves a
    /// challenge.
    async fn validate(&self) -> Result<bool, FetchError>;
}

/// Out-of-band interactive challenge solving. The core only consumes the
/// resulting session; driving a browser is someone else's job.
#[async_trait]
pub trait ChallengeSolver {
    async fn solve_challenge(&self, url: &str) -> Result<CachedSession, FetchError>;
}
