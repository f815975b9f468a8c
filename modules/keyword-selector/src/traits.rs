// Read-only boundary between the selector and the stores holding raw signals.
//
// One method per query shape. The selector never writes; attempt outcomes are
// recorded by whoever executes the searches. `MockSignalReader` in `testing`
// implements the same contract in memory.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use keyword_common::{
    AttemptHistoryRecord, CoverageAreaConfig, EntityDemandRow, TrendCounts, UnmetReason,
    UnmetRequestRecord,
};

/// Which attempt-history rows to read for a coverage area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryScope<'a> {
    /// Whole area, least recently successful first, then least recently attempted.
    Stalest { limit: usize },
    /// Only rows for these normalized terms.
    Terms(&'a [String]),
}

#[async_trait]
pub trait SignalReader: Send + Sync {
    /// Unmet search requests for a location seen since `since`, ordered by
    /// distinct users desc then `last_seen_at` desc, capped at `limit`.
    async fn find_unmet_requests(
        &self,
        location_key: &str,
        min_distinct_users: i64,
        since: DateTime<Utc>,
        reasons: &[UnmetReason],
        limit: usize,
    ) -> Result<Vec<UnmetRequestRecord>>;

    async fn find_attempt_history(
        &self,
        coverage_key: &str,
        scope: HistoryScope<'_>,
    ) -> Result<Vec<AttemptHistoryRecord>>;

    /// Union of the top `per_signal_limit` entities by each engagement signal
    /// (queries, autocomplete picks, views, favorites) since `since`.
    /// Restaurants and foods are scoped to the area; attributes are not.
    async fn find_entity_demand_signals(
        &self,
        coverage_key: &str,
        since: DateTime<Utc>,
        per_signal_limit: usize,
    ) -> Result<Vec<EntityDemandRow>>;

    /// Query users in `[trend_since, now)` and `[since, trend_since)` per entity.
    async fn find_trend_counts(
        &self,
        coverage_key: &str,
        entity_ids: &[Uuid],
        since: DateTime<Utc>,
        trend_since: DateTime<Utc>,
    ) -> Result<HashMap<Uuid, TrendCounts>>;

    /// Area-unscoped query users keyed by `entity_type:lowercased name`.
    async fn find_global_query_counts(
        &self,
        since: DateTime<Utc>,
        term_keys: &[String],
        entity_types: &[String],
    ) -> Result<HashMap<String, i64>>;

    /// Case-insensitive exact match on the area's name.
    async fn resolve_coverage_area(&self, name: &str) -> Result<Option<CoverageAreaConfig>>;
}
