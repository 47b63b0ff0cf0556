//! Author and publication records as harvested from a scholar profile.
//!
//! Every field the profile service exposes is modeled explicitly; records are
//! sparse by nature, so almost everything is optional. An empty string is
//! treated as absent during merges (see [`crate::merge`]).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One author profile, keyed by its stable `scholar_id`.
///
/// The persisted dataset holds exactly one record per `scholar_id`. Records
/// with an empty id are rejected at the merge boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorRecord {
    /// Stable profile identity. Primary key of the dataset.
    #[serde(default)]
    pub scholar_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,

    /// Opaque organization id from the profile page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<i64>,

    /// Total citations across all publications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citedby: Option<u64>,

    /// Declared fields of interest, in profile order.
    #[serde(default)]
    pub interests: Vec<String>,

    /// Citations to all publications, broken down by year.
    #[serde(default)]
    pub cites_per_year: BTreeMap<i32, u64>,

    /// Publication list. Order is not significant after a merge; the list is
    /// logically a set keyed by publication identity.
    #[serde(default)]
    pub publications: Vec<PublicationRecord>,

    /// Coauthors have no independent lifecycle: fully replaced on each
    /// refresh of this author, never merged.
    #[serde(default)]
    pub coauthors: Vec<CoauthorRecord>,
}

impl AuthorRecord {
    pub fn new(scholar_id: impl Into<String>) -> Self {
        Self {
            scholar_id: scholar_id.into(),
            ..Self::default()
        }
    }

    /// Whether this record carries a usable identity.
    pub fn has_identity(&self) -> bool {
        !self.scholar_id.trim().is_empty()
    }
}

/// One publication sighting under an author profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublicationRecord {
    /// Identity of this publication within its author's profile page. May be
    /// empty for sparse entries, in which case the normalized title is the
    /// only cross-record identity signal.
    #[serde(default)]
    pub author_pub_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    // Bib-sourced fields, lifted to the record root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#abstract: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pub_year: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pub_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bib_id: Option<String>,

    /// Formatted citation string (journal name, volume, pages).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_citations: Option<u64>,

    #[serde(default)]
    pub cites_per_year: BTreeMap<i32, u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pub_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_related_articles: Option<String>,

    /// Profile ids of the contributing authors, where known.
    #[serde(default)]
    pub author_id: Vec<String>,

    /// When this publication was last harvested. RFC 3339 with an explicit
    /// UTC marker. Set once by the store and preserved by every merge; kept
    /// as a string so an unparseable stamp degrades to a re-fetch instead of
    /// failing dataset deserialization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scraped: Option<String>,
}

impl PublicationRecord {
    /// Whether this record carries a profile-scoped identity.
    pub fn has_pub_id(&self) -> bool {
        !self.author_pub_id.trim().is_empty()
    }
}

/// Lightweight coauthor entry nested under an [`AuthorRecord`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoauthorRecord {
    #[serde(default)]
    pub scholar_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
}

/// Builder for constructing publication records in tests and parsers.
#[derive(Debug, Clone, Default)]
pub struct PublicationBuilder {
    record: PublicationRecord,
}

impl PublicationBuilder {
    pub fn new(author_pub_id: impl Into<String>) -> Self {
        Self {
            record: PublicationRecord {
                author_pub_id: author_pub_id.into(),
                ..PublicationRecord::default()
            },
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.record.title = Some(title.into());
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.record.author = Some(author.into());
        self
    }

    pub fn journal(mut self, journal: impl Into<String>) -> Self {
        self.record.journal = Some(journal.into());
        self
    }

    pub fn pages(mut self, pages: impl Into<String>) -> Self {
        self.record.pages = Some(pages.into());
        self
    }

    pub fn pub_year(mut self, year: impl Into<String>) -> Self {
        self.record.pub_year = Some(year.into());
        self
    }

    pub fn num_citations(mut self, count: u64) -> Self {
        self.record.num_citations = Some(count);
        self
    }

    pub fn pub_url(mut self, url: impl Into<String>) -> Self {
        self.record.pub_url = Some(url.into());
        self
    }

    pub fn last_scraped(mut self, stamp: impl Into<String>) -> Self {
        self.record.last_scraped = Some(stamp.into());
        self
    }

    pub fn build(self) -> PublicationRecord {
        self.record
    }
}
