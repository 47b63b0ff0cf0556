//! Title canonicalization for publication identity.
//!
//! Two sightings of the same publication rarely agree byte-for-byte on the
//! title: accents get dropped, punctuation varies, whitespace differs. The
//! normalized key is the sole cross-record identity signal for publications
//! that lack a stable `author_pub_id`.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Canonicalize a publication title into a dedupe key.
///
/// NFKD-decomposes, strips combining (diacritical) marks, replaces every
/// character that is not a word character or whitespace with a space,
/// collapses whitespace runs, trims and lowercases. Deterministic and total:
/// empty or punctuation-only input yields the empty string.
pub fn title_key(title: &str) -> String {
    let stripped: String = title
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Dedupe key for a publication: the normalized title, or an id-derived
/// fallback when the title normalizes to nothing.
pub fn dedupe_key(title: Option<&str>, author_pub_id: &str) -> String {
    let key = title_key(title.unwrap_or_default());
    if key.is_empty() {
        format!("__id__:{}", author_pub_id)
    } else {
        key
    }
}
