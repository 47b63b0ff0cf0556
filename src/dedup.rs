//! Title-based publication deduplication.
//!
//! Collapses near-identical publication entries onto one canonical record per
//! normalized title key. First-seen wins: callers must feed merged-with-
//! history records before fresh sparse duplicates, or the poorer record
//! survives. The save path satisfies this by merging the whole dataset
//! before deduplicating it.

use std::collections::HashSet;

use crate::models::PublicationRecord;
use crate::normalize::dedupe_key;

/// Drop publications whose dedupe key was already seen.
///
/// `seen` is caller-owned so one pass can span several authors: the save
/// path shares a single set across the whole dataset, making the title key
/// dataset-wide. First occurrence wins; the losing duplicate is discarded.
pub fn dedup_publications(
    publications: Vec<PublicationRecord>,
    seen: &mut HashSet<String>,
) -> Vec<PublicationRecord> {
    let mut kept = Vec::with_capacity(publications.len());

    for publication in publications {
        let key = dedupe_key(publication.title.as_deref(), &publication.author_pub_id);
        if seen.contains(&key) {
            tracing::debug!(
                author_pub_id = %publication.author_pub_id,
                key = %key,
                "dropping duplicate publication"
            );
            continue;
        }
        seen.insert(key);
        kept.push(publication);
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PublicationBuilder;

    #[test]
    fn test_title_variants_collapse_to_first_seen() {
        let pubs = vec![
            PublicationBuilder::new("SID:1").title("Deep Learning!").pages("1-9").build(),
            PublicationBuilder::new("SID:2").title("deep   learning").build(),
        ];

        let mut seen = HashSet::new();
        let kept = dedup_publications(pubs, &mut seen);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].author_pub_id, "SID:1");
        assert_eq!(kept[0].pages.as_deref(), Some("1-9"));
    }

    #[test]
    fn test_missing_id_still_dedupes_by_title() {
        let pubs = vec![
            PublicationBuilder::new("SID:1").title("Deep Learning!").build(),
            PublicationBuilder::new("").title("Deep Learning").build(),
        ];

        let mut seen = HashSet::new();
        assert_eq!(dedup_publications(pubs, &mut seen).len(), 1);
    }

    #[test]
    fn test_untitled_records_fall_back_to_id_key() {
        let pubs = vec![
            PublicationBuilder::new("SID:1").build(),
            PublicationBuilder::new("SID:1").build(),
            PublicationBuilder::new("SID:2").build(),
        ];

        let mut seen = HashSet::new();
        let kept = dedup_publications(pubs, &mut seen);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_seen_set_spans_calls() {
        let mut seen = HashSet::new();

        let first = dedup_publications(
            vec![PublicationBuilder::new("A:1").title("Shared Title").build()],
            &mut seen,
        );
        assert_eq!(first.len(), 1);

        // Same title under a different author in the same save pass.
        let second = dedup_publications(
            vec![PublicationBuilder::new("B:1").title("Shared Title").build()],
            &mut seen,
        );
        assert!(second.is_empty());
    }

    #[test]
    fn test_distinct_titles_all_kept() {
        let pubs = vec![
            PublicationBuilder::new("SID:1").title("Alpha").build(),
            PublicationBuilder::new("SID:2").title("Beta").build(),
            PublicationBuilder::new("SID:3").title("Gamma").build(),
        ];

        let mut seen = HashSet::new();
        assert_eq!(dedup_publications(pubs, &mut seen).len(), 3);
    }
}
