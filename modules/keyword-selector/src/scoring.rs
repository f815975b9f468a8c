//! Scoring math shared by the loaders and the history adjuster.
//!
//! Every function is pure. Scores are slice-local: an unmet score of 0.5 and a
//! refresh score of 0.5 mean unrelated things.

use chrono::{DateTime, Utc};

use keyword_common::EntityDemandRow;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Days between a past timestamp and `now`, clamped at zero.
pub fn days_since(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    ((now - then).num_milliseconds() as f64 / MILLIS_PER_DAY).max(0.0)
}

pub fn clamp01(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

/// Log-scaled count in [0, 1]; reaches 1.0 at `cap`.
pub fn normalize_log(x: f64, cap: f64) -> f64 {
    if cap <= 0.0 {
        return 0.0;
    }
    clamp01((1.0 + x.max(0.0)).ln() / (1.0 + cap).ln())
}

/// Bounded in [0.7, 1.0], decaying with a 7-day time constant.
pub fn recency_boost(days: f64) -> f64 {
    0.7 + 0.3 * (-days.max(0.0) / 7.0).exp()
}

// =============================================================================
// Refresh
// =============================================================================

/// Age of the anchor timestamp, capped at `max_days`. No anchor counts as maximally stale.
pub fn staleness_days(anchor: Option<DateTime<Utc>>, now: DateTime<Utc>, max_days: f64) -> f64 {
    match anchor {
        Some(at) => days_since(at, now).min(max_days),
        None => max_days,
    }
}

pub fn refresh_score(staleness_days: f64, saturation_days: f64) -> f64 {
    clamp01(staleness_days / saturation_days)
}

// =============================================================================
// Demand
// =============================================================================

const FAVORITE_WEIGHT: f64 = 0.35;
const VIEW_WEIGHT: f64 = 0.20;
const AUTOCOMPLETE_WEIGHT: f64 = 0.15;
const QUERY_WEIGHT: f64 = 0.30;

const FAVORITE_CAP: f64 = 10.0;
const VIEW_CAP: f64 = 25.0;
const AUTOCOMPLETE_CAP: f64 = 25.0;
const QUERY_CAP: f64 = 50.0;

/// Weighted blend of the four engagement signals. Favorites weigh most.
pub fn demand_score(row: &EntityDemandRow) -> f64 {
    FAVORITE_WEIGHT * normalize_log(row.favorite_users as f64, FAVORITE_CAP)
        + VIEW_WEIGHT * normalize_log(row.view_users as f64, VIEW_CAP)
        + AUTOCOMPLETE_WEIGHT * normalize_log(row.autocomplete_users as f64, AUTOCOMPLETE_CAP)
        + QUERY_WEIGHT * normalize_log(row.query_users_primary as f64, QUERY_CAP)
}

// =============================================================================
// Explore
// =============================================================================

const NOVELTY_WEIGHT: f64 = 0.45;
const SPECIALIZATION_WEIGHT: f64 = 0.35;
const TREND_WEIGHT: f64 = 0.20;

/// Relative growth of query users week over week, clamped to [0, 1].
pub fn explore_trend(query_users_7d: i64, query_users_prev_7d: i64) -> f64 {
    let prev = query_users_prev_7d as f64;
    clamp01((query_users_7d as f64 - prev) / prev.max(1.0))
}

/// How local an entity's interest is. Saturates at 3x the out-of-area interest.
pub fn local_specialization(local_query_users: i64, global_query_users: i64) -> f64 {
    let local = local_query_users.max(0) as f64;
    let other = (global_query_users as f64 - local).max(0.0);
    clamp01((local + 1.0) / (other + 1.0) / 3.0)
}

/// 1.0 for never-attempted terms, otherwise ramps up over `window_days`.
pub fn novelty(days_since_last_attempt: Option<f64>, window_days: f64) -> f64 {
    match days_since_last_attempt {
        None => 1.0,
        Some(days) => clamp01(days / window_days),
    }
}

pub fn explore_score(novelty: f64, local_specialization: f64, trend: f64) -> f64 {
    NOVELTY_WEIGHT * novelty + SPECIALIZATION_WEIGHT * local_specialization + TREND_WEIGHT * trend
}
