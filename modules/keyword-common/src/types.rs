use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Slices
// =============================================================================

/// One of the four competing term sources. Declaration order is priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slice {
    /// Searches users ran that came back empty or thin.
    Unmet,
    /// Previously attempted terms that have gone stale.
    Refresh,
    /// Entities with aggregated engagement (favorites, views, queries).
    Demand,
    /// Low-volume entities worth a speculative look.
    Explore,
}

impl Slice {
    /// All slices, highest priority first.
    pub const PRIORITY: [Slice; 4] = [Slice::Unmet, Slice::Refresh, Slice::Demand, Slice::Explore];

    pub fn as_str(&self) -> &'static str {
        match self {
            Slice::Unmet => "unmet",
            Slice::Refresh => "refresh",
            Slice::Demand => "demand",
            Slice::Explore => "explore",
        }
    }
}

impl std::fmt::Display for Slice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value held for each slice. Iteration always follows slice priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerSlice<T> {
    pub unmet: T,
    pub refresh: T,
    pub demand: T,
    pub explore: T,
}

impl<T> PerSlice<T> {
    pub fn get(&self, slice: Slice) -> &T {
        match slice {
            Slice::Unmet => &self.unmet,
            Slice::Refresh => &self.refresh,
            Slice::Demand => &self.demand,
            Slice::Explore => &self.explore,
        }
    }

    pub fn get_mut(&mut self, slice: Slice) -> &mut T {
        match slice {
            Slice::Unmet => &mut self.unmet,
            Slice::Refresh => &mut self.refresh,
            Slice::Demand => &mut self.demand,
            Slice::Explore => &mut self.explore,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Slice, &T)> {
        Slice::PRIORITY.into_iter().map(move |s| (s, self.get(s)))
    }

    pub fn into_entries(self) -> [(Slice, T); 4] {
        [
            (Slice::Unmet, self.unmet),
            (Slice::Refresh, self.refresh),
            (Slice::Demand, self.demand),
            (Slice::Explore, self.explore),
        ]
    }

    pub fn map<U>(self, mut f: impl FnMut(Slice, T) -> U) -> PerSlice<U> {
        PerSlice {
            unmet: f(Slice::Unmet, self.unmet),
            refresh: f(Slice::Refresh, self.refresh),
            demand: f(Slice::Demand, self.demand),
            explore: f(Slice::Explore, self.explore),
        }
    }
}

impl PerSlice<usize> {
    pub fn total(&self) -> usize {
        self.unmet + self.refresh + self.demand + self.explore
    }
}

// =============================================================================
// Attempt history
// =============================================================================

/// Outcome of the most recent collection attempt for a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    NoResults,
    Failed,
    Other,
}

impl AttemptOutcome {
    /// Unknown outcome strings map to `Other` rather than failing the load.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "success" => AttemptOutcome::Success,
            "no_results" => AttemptOutcome::NoResults,
            "failed" | "error" => AttemptOutcome::Failed,
            _ => AttemptOutcome::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::NoResults => "no_results",
            AttemptOutcome::Failed => "failed",
            AttemptOutcome::Other => "other",
        }
    }
}

/// Prior attempt state for one (coverage area, normalized term) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptHistoryRecord {
    pub collection_coverage_key: String,
    pub normalized_term: String,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<AttemptOutcome>,
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl AttemptHistoryRecord {
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }
}

// =============================================================================
// Unmet requests
// =============================================================================

/// Why a user-facing search was recorded as unmet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmetReason {
    /// No results at all.
    Unresolved,
    /// Some results, but too few to be useful.
    LowResult,
}

impl UnmetReason {
    pub const ALL: [UnmetReason; 2] = [UnmetReason::Unresolved, UnmetReason::LowResult];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unresolved" => Some(UnmetReason::Unresolved),
            "low_result" => Some(UnmetReason::LowResult),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UnmetReason::Unresolved => "unresolved",
            UnmetReason::LowResult => "low_result",
        }
    }

    /// Score multiplier: an empty result page hurts more than a thin one.
    pub fn severity(&self) -> f64 {
        match self {
            UnmetReason::Unresolved => 1.0,
            UnmetReason::LowResult => 0.8,
        }
    }
}

/// A user search that found nothing (or too little), aggregated per term and location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmetRequestRecord {
    pub term: String,
    pub entity_type: Option<String>,
    pub reason: UnmetReason,
    pub distinct_user_count: i64,
    pub last_seen_at: DateTime<Utc>,
    pub location_key: String,
}

// =============================================================================
// Entity demand
// =============================================================================

/// Aggregated engagement for one entity inside the demand window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDemandRow {
    pub entity_id: Uuid,
    pub entity_type: String,
    pub name: String,
    pub favorite_users: i64,
    pub view_users: i64,
    pub autocomplete_users: i64,
    /// Distinct users whose search resolved to this entity as the primary match.
    pub query_users_primary: i64,
}

/// Query-user counts for the last 7 days and the 7 days before that.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendCounts {
    pub query_users_7d: i64,
    pub query_users_prev_7d: i64,
}

/// Key into the global query-count map: `entity_type:lowercased name`.
pub fn global_count_key(entity_type: &str, name: &str) -> String {
    format!("{}:{}", entity_type, name.trim().to_lowercase())
}

// =============================================================================
// Coverage areas
// =============================================================================

/// Stored configuration for a monitored area. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageAreaConfig {
    pub coverage_key: Option<String>,
    pub name: Option<String>,
    pub safe_interval_days: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn priority_order_matches_declaration() {
        let mut sorted = Slice::PRIORITY;
        sorted.sort();
        assert_eq!(sorted, Slice::PRIORITY);
        assert_eq!(Slice::PRIORITY[0], Slice::Unmet);
        assert_eq!(Slice::PRIORITY[3], Slice::Explore);
    }

    #[test]
    fn per_slice_iterates_in_priority_order() {
        let quotas = PerSlice {
            unmet: 5,
            refresh: 10,
            demand: 8,
            explore: 2,
        };
        let order: Vec<Slice> = quotas.iter().map(|(s, _)| s).collect();
        assert_eq!(order, Slice::PRIORITY.to_vec());
        assert_eq!(quotas.total(), 25);
        assert_eq!(*quotas.get(Slice::Demand), 8);
    }

    #[test]
    fn outcome_parse_is_lenient() {
        assert_eq!(AttemptOutcome::parse("no_results"), AttemptOutcome::NoResults);
        assert_eq!(AttemptOutcome::parse(" SUCCESS "), AttemptOutcome::Success);
        assert_eq!(AttemptOutcome::parse("rate_limited"), AttemptOutcome::Other);
    }

    #[test]
    fn unmet_reason_severity() {
        assert_eq!(UnmetReason::parse("unresolved"), Some(UnmetReason::Unresolved));
        assert_eq!(UnmetReason::parse("bogus"), None);
        assert_eq!(UnmetReason::Unresolved.severity(), 1.0);
        assert_eq!(UnmetReason::LowResult.severity(), 0.8);
    }

    #[test]
    fn cooldown_is_strictly_after_now() {
        let now = Utc::now();
        let mut record = AttemptHistoryRecord {
            collection_coverage_key: "austin".into(),
            normalized_term: "ramen".into(),
            last_attempt_at: None,
            last_success_at: None,
            last_outcome: None,
            cooldown_until: Some(now),
        };
        assert!(!record.in_cooldown(now));
        record.cooldown_until = Some(now + Duration::seconds(1));
        assert!(record.in_cooldown(now));
        record.cooldown_until = None;
        assert!(!record.in_cooldown(now));
    }

    #[test]
    fn global_count_key_lowercases_name() {
        assert_eq!(global_count_key("food", " Birria Tacos "), "food:birria tacos");
    }
}
