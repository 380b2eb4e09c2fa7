//! Candidate quality screen.
//!
//! A precision filter, not a correctness filter: it keeps the curation
//! model's input small and clean, and the model still re-validates what it
//! selects.  Blocklisted domains and URL duplicates are removed here again
//! even though the gateway already handles them; this stage is also fed
//! directly in tests.

use std::collections::HashSet;

use crate::credibility::is_blocklisted;
use crate::search::{normalize_url, Candidate};

const MIN_TITLE_CHARS: usize = 10;
const MIN_DESCRIPTION_CHARS: usize = 20;

/// Drop blocklisted, duplicate, and low-signal candidates, then re-sort by
/// credibility descending.
pub fn screen(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut seen_titles: HashSet<String> = HashSet::new();

    let mut kept: Vec<Candidate> = candidates
        .into_iter()
        .filter(|candidate| {
            if is_blocklisted(&candidate.url) {
                return false;
            }
            if candidate.title.trim().chars().count() < MIN_TITLE_CHARS {
                return false;
            }
            if candidate.description.trim().chars().count() < MIN_DESCRIPTION_CHARS {
                return false;
            }
            if !seen_urls.insert(normalize_url(&candidate.url)) {
                return false;
            }
            seen_titles.insert(candidate.title.trim().to_lowercase())
        })
        .collect();

    kept.sort_by(|a, b| {
        b.credibility
            .total_cmp(&a.credibility)
            .then_with(|| a.title.cmp(&b.title))
    });
    kept
}
