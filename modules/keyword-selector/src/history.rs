//! Attempt-history adjustment: cooldown suppression and history-aware rescoring.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use keyword_common::{AttemptHistoryRecord, AttemptOutcome, SelectorConfig};

use crate::candidate::{ExploreComponents, Origin, TermCandidate};
use crate::dedup::sort_by_score;
use crate::scoring::{days_since, explore_score, explore_trend, local_specialization, novelty};

/// Attempt history for one coverage area, keyed by normalized term.
#[derive(Debug, Default)]
pub struct HistoryIndex {
    by_term: HashMap<String, AttemptHistoryRecord>,
}

impl HistoryIndex {
    pub fn new(records: Vec<AttemptHistoryRecord>) -> Self {
        Self {
            by_term: records
                .into_iter()
                .map(|record| (record.normalized_term.clone(), record))
                .collect(),
        }
    }

    pub fn get(&self, normalized_term: &str) -> Option<&AttemptHistoryRecord> {
        self.by_term.get(normalized_term)
    }
}

/// Drop candidates in cooldown and rescore the rest. Returns the re-sorted
/// survivors and the number dropped for cooldown.
pub fn adjust_slice(
    candidates: Vec<TermCandidate>,
    history: &HistoryIndex,
    config: &SelectorConfig,
    now: DateTime<Utc>,
) -> (Vec<TermCandidate>, usize) {
    let total = candidates.len();
    let mut adjusted: Vec<TermCandidate> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let record = history.get(&candidate.normalized_term);
            if record.is_some_and(|r| r.in_cooldown(now)) {
                return None;
            }
            Some(rescore(candidate, record, config, now))
        })
        .collect();
    let cooled = total - adjusted.len();
    sort_by_score(&mut adjusted);
    (adjusted, cooled)
}

fn rescore(
    candidate: TermCandidate,
    record: Option<&AttemptHistoryRecord>,
    config: &SelectorConfig,
    now: DateTime<Utc>,
) -> TermCandidate {
    let days_since_attempt = record
        .and_then(|r| r.last_attempt_at)
        .map(|at| days_since(at, now));

    match candidate.origin.clone() {
        Origin::Unmet {
            reason,
            distinct_users,
            last_seen_at,
            demand_factor,
            recency_boost,
            ..
        } => {
            let recently_empty = record.is_some_and(|r| r.last_outcome == Some(AttemptOutcome::NoResults))
                && days_since_attempt.is_some_and(|days| days <= config.soft_suppress_days as f64);
            if !recently_empty {
                return candidate;
            }
            let score = candidate.score * config.soft_suppress_factor;
            candidate.with_score(score).with_origin(Origin::Unmet {
                reason,
                distinct_users,
                last_seen_at,
                demand_factor,
                recency_boost,
                soft_suppressed: true,
            })
        }
        Origin::Explore(mut signals) => {
            let components = ExploreComponents {
                novelty: novelty(days_since_attempt, config.novelty_window_days),
                local_specialization: local_specialization(
                    signals.local_query_users,
                    signals.global_query_users,
                ),
                trend: explore_trend(signals.query_users_7d, signals.query_users_prev_7d),
                days_since_last_attempt: days_since_attempt,
            };
            let score = explore_score(
                components.novelty,
                components.local_specialization,
                components.trend,
            );
            signals.components = Some(components);
            candidate
                .with_score(score)
                .with_origin(Origin::Explore(signals))
        }
        Origin::Refresh { .. } | Origin::Demand { .. } => candidate,
    }
}
