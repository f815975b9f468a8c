use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use keyword_common::{Slice, UnmetReason};

/// A scored term competing for a slot in this cycle's search budget.
///
/// Candidates are built by exactly one loader and rebuilt (never edited in
/// place) by each pipeline stage. `score` is only comparable within a slice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermCandidate {
    /// Display text. Rewritten by the filter to the cleaned form.
    pub term: String,
    /// Canonical key. Empty until the filter runs.
    pub normalized_term: String,
    pub slice: Slice,
    pub score: f64,
    pub entity_type: Option<String>,
    pub origin: Origin,
    /// Position in the loader's output; the tie-break after score.
    pub load_rank: usize,
}

impl TermCandidate {
    /// The slice is derived from the origin so the two can never disagree.
    pub fn new(
        term: impl Into<String>,
        score: f64,
        entity_type: Option<String>,
        origin: Origin,
        load_rank: usize,
    ) -> Self {
        Self {
            term: term.into(),
            normalized_term: String::new(),
            slice: origin.slice(),
            score,
            entity_type,
            origin,
            load_rank,
        }
    }

    pub fn with_terms(self, term: String, normalized_term: String) -> Self {
        Self {
            term,
            normalized_term,
            ..self
        }
    }

    pub fn with_score(self, score: f64) -> Self {
        Self { score, ..self }
    }

    pub fn with_origin(self, origin: Origin) -> Self {
        debug_assert_eq!(origin.slice(), self.slice);
        Self { origin, ..self }
    }
}

/// Where a candidate came from, with the raw signals behind its score.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Origin {
    Unmet {
        reason: UnmetReason,
        distinct_users: i64,
        last_seen_at: DateTime<Utc>,
        demand_factor: f64,
        recency_boost: f64,
        soft_suppressed: bool,
    },
    Refresh {
        last_attempt_at: Option<DateTime<Utc>>,
        last_success_at: Option<DateTime<Utc>>,
        staleness_days: f64,
    },
    Demand {
        entity_id: Uuid,
        favorite_users: i64,
        view_users: i64,
        autocomplete_users: i64,
        query_users_primary: i64,
    },
    Explore(ExploreSignals),
}

impl Origin {
    pub fn slice(&self) -> Slice {
        match self {
            Origin::Unmet { .. } => Slice::Unmet,
            Origin::Refresh { .. } => Slice::Refresh,
            Origin::Demand { .. } => Slice::Demand,
            Origin::Explore(_) => Slice::Explore,
        }
    }
}

/// Raw explore signals captured at load time. Scoring waits for attempt history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExploreSignals {
    pub entity_id: Uuid,
    pub favorite_users: i64,
    pub view_users: i64,
    pub autocomplete_users: i64,
    pub unmet_distinct_users: i64,
    pub local_query_users: i64,
    pub global_query_users: i64,
    pub query_users_7d: i64,
    pub query_users_prev_7d: i64,
    /// Filled in once history is known.
    pub components: Option<ExploreComponents>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExploreComponents {
    pub novelty: f64,
    pub local_specialization: f64,
    pub trend: f64,
    pub days_since_last_attempt: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_follows_origin() {
        let candidate = TermCandidate::new(
            "ramen",
            0.5,
            None,
            Origin::Refresh {
                last_attempt_at: None,
                last_success_at: None,
                staleness_days: 45.0,
            },
            0,
        );
        assert_eq!(candidate.slice, Slice::Refresh);
        assert!(candidate.normalized_term.is_empty());
    }

    #[test]
    fn origin_serializes_as_tagged_map() {
        let origin = Origin::Demand {
            entity_id: Uuid::nil(),
            favorite_users: 3,
            view_users: 0,
            autocomplete_users: 1,
            query_users_primary: 9,
        };
        let value = serde_json::to_value(&origin).unwrap();
        assert_eq!(value["source"], "demand");
        assert_eq!(value["query_users_primary"], 9);
    }
}
