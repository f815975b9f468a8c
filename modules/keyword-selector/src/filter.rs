//! Strips generic filler from raw terms and computes the canonical key.

use std::sync::LazyLock;

use regex::Regex;

use keyword_common::normalize_keyword_term;

use crate::candidate::TermCandidate;

/// Rank and proximity words that add nothing to a content search.
static GENERIC_MODIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:best|top|good|great|favorites?|popular|near|nearby|around|closest|close)\b")
        .unwrap()
});

/// Bare object words. A term made only of these is too broad to search.
const GENERIC_OBJECT_WORDS: [&str; 7] = [
    "food",
    "dish",
    "dishes",
    "restaurant",
    "restaurants",
    "place",
    "places",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermVerdict {
    Keep { term: String, normalized: String },
    Empty,
    AllGeneric,
    Unnormalizable,
}

/// Clean one raw term. `"best taco"` keeps `"taco"`; `"best restaurant"` is all generic.
pub fn clean_term(raw: &str) -> TermVerdict {
    let stripped = GENERIC_MODIFIER_RE.replace_all(raw, " ");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let cleaned = collapsed.trim_matches(|c: char| !c.is_alphanumeric());
    if cleaned.is_empty() {
        return TermVerdict::Empty;
    }

    let tokens: Vec<String> = cleaned
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect();
    if !tokens.is_empty()
        && tokens
            .iter()
            .all(|t| GENERIC_OBJECT_WORDS.contains(&t.as_str()))
    {
        return TermVerdict::AllGeneric;
    }

    let normalized = normalize_keyword_term(cleaned);
    if normalized.is_empty() {
        return TermVerdict::Unnormalizable;
    }
    TermVerdict::Keep {
        term: cleaned.to_string(),
        normalized,
    }
}

/// Returns the surviving candidates (load order preserved) and how many were invalid.
pub fn filter_candidates(candidates: Vec<TermCandidate>) -> (Vec<TermCandidate>, usize) {
    let total = candidates.len();
    let kept: Vec<TermCandidate> = candidates
        .into_iter()
        .filter_map(|candidate| match clean_term(&candidate.term) {
            TermVerdict::Keep { term, normalized } => Some(candidate.with_terms(term, normalized)),
            TermVerdict::Empty | TermVerdict::AllGeneric | TermVerdict::Unnormalizable => None,
        })
        .collect();
    let invalid = total - kept.len();
    (kept, invalid)
}
