//! Non-destructive reconciliation of author records across sessions.
//!
//! A fresh scrape is authoritative for scalar author metadata (citation
//! counts, affiliation, interests drift and the newest sighting wins) but a
//! sparse scrape must never erase publication detail collected earlier.
//! Publications merge field-by-field keyed by `author_pub_id`.

use std::collections::BTreeMap;

use crate::models::{AuthorRecord, PublicationRecord};

/// Overlay an incoming string field on an existing one.
///
/// A field missing or empty on the incoming side keeps the previously
/// recorded value; anything else overwrites.
fn overlay(existing: Option<String>, incoming: &Option<String>) -> Option<String> {
    match incoming {
        Some(v) if !v.is_empty() => Some(v.clone()),
        _ => existing,
    }
}

/// Field-level union of two sightings of the same publication.
///
/// The prior record's fields are overlaid by every field present on the
/// incoming record. `last_scraped`, once set, survives unless the incoming
/// side explicitly carries a newer stamp.
pub fn merge_publication(prior: &PublicationRecord, incoming: &PublicationRecord) -> PublicationRecord {
    PublicationRecord {
        author_pub_id: if incoming.has_pub_id() {
            incoming.author_pub_id.clone()
        } else {
            prior.author_pub_id.clone()
        },
        title: overlay(prior.title.clone(), &incoming.title),
        author: overlay(prior.author.clone(), &incoming.author),
        r#abstract: overlay(prior.r#abstract.clone(), &incoming.r#abstract),
        journal: overlay(prior.journal.clone(), &incoming.journal),
        venue: overlay(prior.venue.clone(), &incoming.venue),
        volume: overlay(prior.volume.clone(), &incoming.volume),
        number: overlay(prior.number.clone(), &incoming.number),
        pages: overlay(prior.pages.clone(), &incoming.pages),
        publisher: overlay(prior.publisher.clone(), &incoming.publisher),
        pub_year: overlay(prior.pub_year.clone(), &incoming.pub_year),
        pub_type: overlay(prior.pub_type.clone(), &incoming.pub_type),
        bib_id: overlay(prior.bib_id.clone(), &incoming.bib_id),
        citation: overlay(prior.citation.clone(), &incoming.citation),
        num_citations: incoming.num_citations.or(prior.num_citations),
        cites_per_year: if incoming.cites_per_year.is_empty() {
            prior.cites_per_year.clone()
        } else {
            incoming.cites_per_year.clone()
        },
        pub_url: overlay(prior.pub_url.clone(), &incoming.pub_url),
        url_related_articles: overlay(prior.url_related_articles.clone(), &incoming.url_related_articles),
        author_id: if incoming.author_id.is_empty() {
            prior.author_id.clone()
        } else {
            incoming.author_id.clone()
        },
        last_scraped: overlay(prior.last_scraped.clone(), &incoming.last_scraped),
    }
}

/// Merge one freshly scraped author record into its prior state.
///
/// With no prior record the incoming one is taken verbatim. Otherwise the
/// merged record is the incoming record (scalars, interests, coauthors all
/// from the newest session) with its publication list unioned against the
/// prior list by `author_pub_id`. Incoming publications without an id cannot
/// be matched and are always inserted as new.
///
/// This step never shrinks the set of known publications; pruning is the
/// deduplicator's job in a separate pass.
pub fn merge_author(prior: Option<&AuthorRecord>, incoming: &AuthorRecord) -> AuthorRecord {
    let prior = match prior {
        Some(p) => p,
        None => return incoming.clone(),
    };

    let mut by_id: BTreeMap<String, PublicationRecord> = BTreeMap::new();
    let mut id_less: Vec<PublicationRecord> = Vec::new();

    for pub_rec in &prior.publications {
        if pub_rec.has_pub_id() {
            by_id.insert(pub_rec.author_pub_id.clone(), pub_rec.clone());
        } else {
            id_less.push(pub_rec.clone());
        }
    }

    for incoming_pub in &incoming.publications {
        if incoming_pub.has_pub_id() {
            let merged = match by_id.get(&incoming_pub.author_pub_id) {
                Some(existing) => merge_publication(existing, incoming_pub),
                None => incoming_pub.clone(),
            };
            by_id.insert(merged.author_pub_id.clone(), merged);
        } else {
            id_less.push(incoming_pub.clone());
        }
    }

    let mut merged = incoming.clone();
    merged.publications = by_id.into_values().chain(id_less).collect();
    merged
}
