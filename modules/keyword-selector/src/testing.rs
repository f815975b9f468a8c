// In-memory SignalReader for tests.
//
// MockSignalReader applies the same filtering, ordering and limits the
// Postgres reader pushes into SQL, so selector tests exercise realistic
// loader output without a database. Every call is recorded for
// assertions about read order.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use keyword_common::{
    global_count_key, AttemptHistoryRecord, AttemptOutcome, CoverageAreaConfig, EntityDemandRow,
    TrendCounts, UnmetReason, UnmetRequestRecord,
};

use crate::traits::{HistoryScope, SignalReader};

// ---------------------------------------------------------------------------
// Test constants
// ---------------------------------------------------------------------------

/// Area name used by most tests.
pub const TEST_AREA: &str = "Austin";
/// Coverage key `TEST_AREA` resolves to when nothing is configured.
pub const TEST_KEY: &str = "austin";

// ---------------------------------------------------------------------------
// MockSignalReader
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockSignalReaderInner {
    unmet: Vec<UnmetRequestRecord>,
    history: Vec<AttemptHistoryRecord>,
    demand: HashMap<String, Vec<EntityDemandRow>>,
    trends: HashMap<Uuid, TrendCounts>,
    global_counts: HashMap<String, i64>,
    areas: HashMap<String, CoverageAreaConfig>,
    failing: Vec<&'static str>,
    calls: Vec<String>,
}

/// Builder pattern: `.with_unmet()`, `.with_history()`, `.with_demand_row()`,
/// `.with_trend()`, `.with_global_count()`, `.with_area()`, `.failing()`.
#[derive(Default)]
pub struct MockSignalReader {
    inner: Mutex<MockSignalReaderInner>,
}

impl MockSignalReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unmet(self, record: UnmetRequestRecord) -> Self {
        self.inner.lock().unwrap().unmet.push(record);
        self
    }

    pub fn with_history(self, record: AttemptHistoryRecord) -> Self {
        self.inner.lock().unwrap().history.push(record);
        self
    }

    /// Rows are returned in registration order for their coverage key.
    pub fn with_demand_row(self, coverage_key: &str, row: EntityDemandRow) -> Self {
        self.inner
            .lock()
            .unwrap()
            .demand
            .entry(coverage_key.to_string())
            .or_default()
            .push(row);
        self
    }

    pub fn with_trend(self, entity_id: Uuid, query_users_7d: i64, query_users_prev_7d: i64) -> Self {
        self.inner.lock().unwrap().trends.insert(
            entity_id,
            TrendCounts {
                query_users_7d,
                query_users_prev_7d,
            },
        );
        self
    }

    pub fn with_global_count(self, entity_type: &str, name: &str, users: i64) -> Self {
        self.inner
            .lock()
            .unwrap()
            .global_counts
            .insert(global_count_key(entity_type, name), users);
        self
    }

    /// Register area configuration under a case-insensitive name.
    pub fn with_area(self, name: &str, config: CoverageAreaConfig) -> Self {
        self.inner
            .lock()
            .unwrap()
            .areas
            .insert(name.to_lowercase(), config);
        self
    }

    /// Make the named trait method return an error on every call.
    pub fn failing(self, method: &'static str) -> Self {
        self.inner.lock().unwrap().failing.push(method);
        self
    }

    // --- Assertion helpers ---

    /// Method names in call order. History reads carry their scope,
    /// e.g. `find_attempt_history:terms`.
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.as_str() == method)
            .count()
    }

    fn record(&self, method: &'static str, label: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(label.to_string());
        if inner.failing.contains(&method) {
            bail!("MockSignalReader: {method} configured to fail");
        }
        Ok(())
    }
}

#[async_trait]
impl SignalReader for MockSignalReader {
    async fn find_unmet_requests(
        &self,
        location_key: &str,
        min_distinct_users: i64,
        since: DateTime<Utc>,
        reasons: &[UnmetReason],
        limit: usize,
    ) -> Result<Vec<UnmetRequestRecord>> {
        self.record("find_unmet_requests", "find_unmet_requests")?;
        let inner = self.inner.lock().unwrap();
        let mut records: Vec<UnmetRequestRecord> = inner
            .unmet
            .iter()
            .filter(|r| r.location_key == location_key)
            .filter(|r| r.distinct_user_count >= min_distinct_users)
            .filter(|r| r.last_seen_at >= since)
            .filter(|r| reasons.contains(&r.reason))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.distinct_user_count
                .cmp(&a.distinct_user_count)
                .then_with(|| b.last_seen_at.cmp(&a.last_seen_at))
        });
        records.truncate(limit);
        Ok(records)
    }

    async fn find_attempt_history(
        &self,
        coverage_key: &str,
        scope: HistoryScope<'_>,
    ) -> Result<Vec<AttemptHistoryRecord>> {
        let label = match scope {
            HistoryScope::Stalest { .. } => "find_attempt_history:stalest",
            HistoryScope::Terms(_) => "find_attempt_history:terms",
        };
        self.record("find_attempt_history", label)?;
        let inner = self.inner.lock().unwrap();
        let in_area = inner
            .history
            .iter()
            .filter(|r| r.collection_coverage_key == coverage_key);
        match scope {
            HistoryScope::Stalest { limit } => {
                let mut records: Vec<AttemptHistoryRecord> = in_area.cloned().collect();
                // None sorts first, matching NULLS FIRST.
                records.sort_by(|a, b| {
                    a.last_success_at
                        .cmp(&b.last_success_at)
                        .then_with(|| a.last_attempt_at.cmp(&b.last_attempt_at))
                        .then_with(|| a.normalized_term.cmp(&b.normalized_term))
                });
                records.truncate(limit);
                Ok(records)
            }
            HistoryScope::Terms(terms) => Ok(in_area
                .filter(|r| terms.contains(&r.normalized_term))
                .cloned()
                .collect()),
        }
    }

    async fn find_entity_demand_signals(
        &self,
        coverage_key: &str,
        _since: DateTime<Utc>,
        _per_signal_limit: usize,
    ) -> Result<Vec<EntityDemandRow>> {
        self.record("find_entity_demand_signals", "find_entity_demand_signals")?;
        let inner = self.inner.lock().unwrap();
        Ok(inner.demand.get(coverage_key).cloned().unwrap_or_default())
    }

    async fn find_trend_counts(
        &self,
        _coverage_key: &str,
        entity_ids: &[Uuid],
        _since: DateTime<Utc>,
        _trend_since: DateTime<Utc>,
    ) -> Result<HashMap<Uuid, TrendCounts>> {
        self.record("find_trend_counts", "find_trend_counts")?;
        let inner = self.inner.lock().unwrap();
        Ok(entity_ids
            .iter()
            .filter_map(|id| inner.trends.get(id).map(|t| (*id, *t)))
            .collect())
    }

    async fn find_global_query_counts(
        &self,
        _since: DateTime<Utc>,
        term_keys: &[String],
        entity_types: &[String],
    ) -> Result<HashMap<String, i64>> {
        self.record("find_global_query_counts", "find_global_query_counts")?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .global_counts
            .iter()
            .filter(|(key, _)| {
                key.split_once(':').is_some_and(|(entity_type, name)| {
                    entity_types.iter().any(|t| t == entity_type)
                        && term_keys.iter().any(|k| k == name)
                })
            })
            .map(|(key, users)| (key.clone(), *users))
            .collect())
    }

    async fn resolve_coverage_area(&self, name: &str) -> Result<Option<CoverageAreaConfig>> {
        self.record("resolve_coverage_area", "resolve_coverage_area")?;
        let inner = self.inner.lock().unwrap();
        Ok(inner.areas.get(&name.to_lowercase()).cloned())
    }
}

// ---------------------------------------------------------------------------
// Record helpers
// ---------------------------------------------------------------------------

pub fn unmet_request(
    term: &str,
    reason: UnmetReason,
    distinct_user_count: i64,
    last_seen_at: DateTime<Utc>,
) -> UnmetRequestRecord {
    UnmetRequestRecord {
        term: term.to_string(),
        entity_type: None,
        reason,
        distinct_user_count,
        last_seen_at,
        location_key: TEST_KEY.to_string(),
    }
}

pub fn attempt(
    normalized_term: &str,
    last_attempt_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
    last_outcome: Option<AttemptOutcome>,
) -> AttemptHistoryRecord {
    AttemptHistoryRecord {
        collection_coverage_key: TEST_KEY.to_string(),
        normalized_term: normalized_term.to_string(),
        last_attempt_at,
        last_success_at,
        last_outcome,
        cooldown_until: None,
    }
}

/// A term attempted at `last_attempt_at` and blocked until `cooldown_until`.
pub fn cooling(
    normalized_term: &str,
    last_attempt_at: DateTime<Utc>,
    cooldown_until: DateTime<Utc>,
) -> AttemptHistoryRecord {
    AttemptHistoryRecord {
        cooldown_until: Some(cooldown_until),
        ..attempt(
            normalized_term,
            Some(last_attempt_at),
            Some(last_attempt_at),
            Some(AttemptOutcome::Success),
        )
    }
}

pub fn demand_row(
    entity_type: &str,
    name: &str,
    favorite_users: i64,
    view_users: i64,
    autocomplete_users: i64,
    query_users_primary: i64,
) -> EntityDemandRow {
    EntityDemandRow {
        entity_id: Uuid::new_v4(),
        entity_type: entity_type.to_string(),
        name: name.to_string(),
        favorite_users,
        view_users,
        autocomplete_users,
        query_users_primary,
    }
}
