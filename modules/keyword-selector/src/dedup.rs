use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use keyword_common::{PerSlice, Slice};

use crate::candidate::TermCandidate;

/// Score descending, then load order. Never relies on sort stability.
pub fn by_score(a: &TermCandidate, b: &TermCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.load_rank.cmp(&b.load_rank))
}

pub fn sort_by_score(candidates: &mut [TermCandidate]) {
    candidates.sort_by(by_score);
}

/// Collapse repeated normalized terms within one slice, keeping the highest
/// score (earliest loaded on a tie). Returns the sorted survivors and the
/// number collapsed.
pub fn dedup_within_slice(candidates: Vec<TermCandidate>) -> (Vec<TermCandidate>, usize) {
    let total = candidates.len();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<TermCandidate> = Vec::with_capacity(total);

    for candidate in candidates {
        match index.get(&candidate.normalized_term) {
            Some(&at) => {
                if by_score(&candidate, &kept[at]) == Ordering::Less {
                    kept[at] = candidate;
                }
            }
            None => {
                index.insert(candidate.normalized_term.clone(), kept.len());
                kept.push(candidate);
            }
        }
    }

    let collapsed = total - kept.len();
    sort_by_score(&mut kept);
    (kept, collapsed)
}

/// Walk slices in priority order and keep each normalized term only where it
/// first appears. Per-slice order is preserved. Returns survivors and the
/// number of later duplicates dropped.
pub fn dedup_across_slices(
    slices: PerSlice<Vec<TermCandidate>>,
) -> (PerSlice<Vec<TermCandidate>>, usize) {
    let mut seen: HashSet<String> = HashSet::new();
    let mut dropped = 0usize;

    let survivors = slices.map(|_slice: Slice, candidates| {
        candidates
            .into_iter()
            .filter(|candidate| {
                let first = seen.insert(candidate.normalized_term.clone());
                if !first {
                    dropped += 1;
                }
                first
            })
            .collect::<Vec<_>>()
    });

    (survivors, dropped)
}
