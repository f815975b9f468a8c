//! Postgres-backed `SignalReader`.
//!
//! Tables read (all owned by other services):
//! - `search_unmet_requests`: one row per (term, reason, location) with distinct user counts
//! - `keyword_attempt_history`: one row per (coverage key, normalized term)
//! - `entities`: restaurants, foods, and attributes; restaurants and foods carry a `location_key`
//! - `search_logs`, `autocomplete_selections`, `entity_views`, `user_favorites`: raw engagement
//! - `coverage_areas`: per-area collection settings

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use keyword_common::{
    global_count_key, AttemptHistoryRecord, AttemptOutcome, CoverageAreaConfig, EntityDemandRow,
    KeywordError, TrendCounts, UnmetReason, UnmetRequestRecord,
};

use crate::traits::{HistoryScope, SignalReader};

/// Entity types whose signals are scoped to the coverage area. Everything else
/// (attributes) is counted regardless of where the user was.
const LOCATION_SCOPED_TYPES: [&str; 2] = ["restaurant", "food"];

#[derive(Clone)]
pub struct PgSignalReader {
    pool: PgPool,
}

impl PgSignalReader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_error(query: &'static str) -> impl FnOnce(sqlx::Error) -> KeywordError {
    move |e| KeywordError::Database(format!("{query}: {e}"))
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct UnmetRequestRow {
    term: String,
    entity_type: Option<String>,
    reason: String,
    distinct_user_count: i64,
    last_seen_at: DateTime<Utc>,
    location_key: String,
}

impl TryFrom<UnmetRequestRow> for UnmetRequestRecord {
    type Error = KeywordError;

    fn try_from(row: UnmetRequestRow) -> Result<Self, Self::Error> {
        let reason = UnmetReason::parse(&row.reason).ok_or_else(|| {
            KeywordError::Validation(format!(
                "unknown unmet reason {:?} for term {:?}",
                row.reason, row.term
            ))
        })?;
        Ok(Self {
            term: row.term,
            entity_type: row.entity_type,
            reason,
            distinct_user_count: row.distinct_user_count,
            last_seen_at: row.last_seen_at,
            location_key: row.location_key,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AttemptHistoryRow {
    collection_coverage_key: String,
    normalized_term: String,
    last_attempt_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
    last_outcome: Option<String>,
    cooldown_until: Option<DateTime<Utc>>,
}

impl From<AttemptHistoryRow> for AttemptHistoryRecord {
    fn from(row: AttemptHistoryRow) -> Self {
        Self {
            collection_coverage_key: row.collection_coverage_key,
            normalized_term: row.normalized_term,
            last_attempt_at: row.last_attempt_at,
            last_success_at: row.last_success_at,
            last_outcome: row.last_outcome.as_deref().map(AttemptOutcome::parse),
            cooldown_until: row.cooldown_until,
        }
    }
}

#[derive(sqlx::FromRow)]
struct EntityDemandSqlRow {
    entity_id: Uuid,
    entity_type: String,
    name: String,
    favorite_users: i64,
    view_users: i64,
    autocomplete_users: i64,
    query_users_primary: i64,
}

impl From<EntityDemandSqlRow> for EntityDemandRow {
    fn from(row: EntityDemandSqlRow) -> Self {
        Self {
            entity_id: row.entity_id,
            entity_type: row.entity_type,
            name: row.name,
            favorite_users: row.favorite_users,
            view_users: row.view_users,
            autocomplete_users: row.autocomplete_users,
            query_users_primary: row.query_users_primary,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TrendRow {
    entity_id: Uuid,
    query_users_7d: i64,
    query_users_prev_7d: i64,
}

#[derive(sqlx::FromRow)]
struct GlobalCountRow {
    entity_type: String,
    term_key: String,
    query_users: i64,
}

#[derive(sqlx::FromRow)]
struct CoverageAreaRow {
    coverage_key: Option<String>,
    name: Option<String>,
    safe_interval_days: Option<i32>,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Per-signal distinct-user counts, a top-N pick per signal, then the union
/// joined back to entity metadata with the full counts.
const ENTITY_DEMAND_SQL: &str = r#"
WITH scoped_entities AS (
    SELECT e.id, e.entity_type, e.name
    FROM entities e
    WHERE e.entity_type <> ALL($4) OR e.location_key = $1
),
query_counts AS (
    SELECT sl.primary_entity_id AS entity_id, COUNT(DISTINCT sl.user_id) AS users
    FROM search_logs sl
    JOIN scoped_entities se ON se.id = sl.primary_entity_id
    WHERE sl.location_key = $1 AND sl.created_at >= $2
    GROUP BY sl.primary_entity_id
),
autocomplete_counts AS (
    SELECT ac.entity_id, COUNT(DISTINCT ac.user_id) AS users
    FROM autocomplete_selections ac
    JOIN scoped_entities se ON se.id = ac.entity_id
    WHERE ac.location_key = $1 AND ac.created_at >= $2
    GROUP BY ac.entity_id
),
view_counts AS (
    SELECT v.entity_id, COUNT(DISTINCT v.user_id) AS users
    FROM entity_views v
    JOIN scoped_entities se ON se.id = v.entity_id
    WHERE v.created_at >= $2
    GROUP BY v.entity_id
),
favorite_counts AS (
    SELECT f.entity_id, COUNT(DISTINCT f.user_id) AS users
    FROM user_favorites f
    JOIN scoped_entities se ON se.id = f.entity_id
    WHERE f.created_at >= $2
    GROUP BY f.entity_id
),
candidates AS (
    (SELECT entity_id FROM query_counts ORDER BY users DESC, entity_id LIMIT $3)
    UNION
    (SELECT entity_id FROM autocomplete_counts ORDER BY users DESC, entity_id LIMIT $3)
    UNION
    (SELECT entity_id FROM view_counts ORDER BY users DESC, entity_id LIMIT $3)
    UNION
    (SELECT entity_id FROM favorite_counts ORDER BY users DESC, entity_id LIMIT $3)
)
SELECT
    se.id AS entity_id,
    se.entity_type,
    se.name,
    COALESCE(fc.users, 0) AS favorite_users,
    COALESCE(vc.users, 0) AS view_users,
    COALESCE(ac.users, 0) AS autocomplete_users,
    COALESCE(qc.users, 0) AS query_users_primary
FROM candidates c
JOIN scoped_entities se ON se.id = c.entity_id
LEFT JOIN favorite_counts fc ON fc.entity_id = c.entity_id
LEFT JOIN view_counts vc ON vc.entity_id = c.entity_id
LEFT JOIN autocomplete_counts ac ON ac.entity_id = c.entity_id
LEFT JOIN query_counts qc ON qc.entity_id = c.entity_id
ORDER BY query_users_primary DESC, favorite_users DESC, view_users DESC, se.id
"#;

#[async_trait]
impl SignalReader for PgSignalReader {
    async fn find_unmet_requests(
        &self,
        location_key: &str,
        min_distinct_users: i64,
        since: DateTime<Utc>,
        reasons: &[UnmetReason],
        limit: usize,
    ) -> Result<Vec<UnmetRequestRecord>> {
        let reasons: Vec<String> = reasons.iter().map(|r| r.as_str().to_string()).collect();
        let rows = sqlx::query_as::<_, UnmetRequestRow>(
            r#"
            SELECT term, entity_type, reason, distinct_user_count, last_seen_at, location_key
            FROM search_unmet_requests
            WHERE location_key = $1
              AND distinct_user_count >= $2
              AND last_seen_at >= $3
              AND reason = ANY($4)
            ORDER BY distinct_user_count DESC, last_seen_at DESC
            LIMIT $5
            "#,
        )
        .bind(location_key)
        .bind(min_distinct_users)
        .bind(since)
        .bind(&reasons)
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("find_unmet_requests"))?;

        let records = rows
            .into_iter()
            .map(UnmetRequestRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    async fn find_attempt_history(
        &self,
        coverage_key: &str,
        scope: HistoryScope<'_>,
    ) -> Result<Vec<AttemptHistoryRecord>> {
        let mut qb: sqlx::QueryBuilder<'_, sqlx::Postgres> = sqlx::QueryBuilder::new(
            "SELECT collection_coverage_key, normalized_term, last_attempt_at, last_success_at, \
             last_outcome, cooldown_until \
             FROM keyword_attempt_history \
             WHERE collection_coverage_key = ",
        );
        qb.push_bind(coverage_key.to_string());

        match scope {
            HistoryScope::Stalest { limit } => {
                qb.push(
                    " ORDER BY last_success_at ASC NULLS FIRST, \
                     last_attempt_at ASC NULLS FIRST, normalized_term ASC LIMIT ",
                );
                qb.push_bind(limit_param(limit));
            }
            HistoryScope::Terms(terms) => {
                if terms.is_empty() {
                    return Ok(Vec::new());
                }
                qb.push(" AND normalized_term = ANY(");
                qb.push_bind(terms.to_vec());
                qb.push(")");
            }
        }

        let rows = qb
            .build_query_as::<AttemptHistoryRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("find_attempt_history"))?;
        Ok(rows.into_iter().map(AttemptHistoryRecord::from).collect())
    }

    async fn find_entity_demand_signals(
        &self,
        coverage_key: &str,
        since: DateTime<Utc>,
        per_signal_limit: usize,
    ) -> Result<Vec<EntityDemandRow>> {
        let scoped_types: Vec<String> = LOCATION_SCOPED_TYPES
            .iter()
            .map(|t| t.to_string())
            .collect();
        let rows = sqlx::query_as::<_, EntityDemandSqlRow>(ENTITY_DEMAND_SQL)
            .bind(coverage_key)
            .bind(since)
            .bind(limit_param(per_signal_limit))
            .bind(&scoped_types)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("find_entity_demand_signals"))?;
        Ok(rows.into_iter().map(EntityDemandRow::from).collect())
    }

    async fn find_trend_counts(
        &self,
        coverage_key: &str,
        entity_ids: &[Uuid],
        since: DateTime<Utc>,
        trend_since: DateTime<Utc>,
    ) -> Result<HashMap<Uuid, TrendCounts>> {
        if entity_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, TrendRow>(
            r#"
            SELECT
                sl.primary_entity_id AS entity_id,
                COUNT(DISTINCT sl.user_id) FILTER (WHERE sl.created_at >= $4) AS query_users_7d,
                COUNT(DISTINCT sl.user_id) FILTER (WHERE sl.created_at < $4) AS query_users_prev_7d
            FROM search_logs sl
            WHERE sl.location_key = $1
              AND sl.primary_entity_id = ANY($2)
              AND sl.created_at >= $3
            GROUP BY sl.primary_entity_id
            "#,
        )
        .bind(coverage_key)
        .bind(entity_ids)
        .bind(since)
        .bind(trend_since)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("find_trend_counts"))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.entity_id,
                    TrendCounts {
                        query_users_7d: row.query_users_7d,
                        query_users_prev_7d: row.query_users_prev_7d,
                    },
                )
            })
            .collect())
    }

    async fn find_global_query_counts(
        &self,
        since: DateTime<Utc>,
        term_keys: &[String],
        entity_types: &[String],
    ) -> Result<HashMap<String, i64>> {
        if term_keys.is_empty() || entity_types.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, GlobalCountRow>(
            r#"
            SELECT
                e.entity_type,
                LOWER(TRIM(e.name)) AS term_key,
                COUNT(DISTINCT sl.user_id) AS query_users
            FROM search_logs sl
            JOIN entities e ON e.id = sl.primary_entity_id
            WHERE sl.created_at >= $1
              AND LOWER(TRIM(e.name)) = ANY($2)
              AND e.entity_type = ANY($3)
            GROUP BY e.entity_type, LOWER(TRIM(e.name))
            "#,
        )
        .bind(since)
        .bind(term_keys)
        .bind(entity_types)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("find_global_query_counts"))?;

        Ok(rows
            .into_iter()
            .map(|row| (global_count_key(&row.entity_type, &row.term_key), row.query_users))
            .collect())
    }

    async fn resolve_coverage_area(&self, name: &str) -> Result<Option<CoverageAreaConfig>> {
        let row = sqlx::query_as::<_, CoverageAreaRow>(
            r#"
            SELECT coverage_key, name, safe_interval_days
            FROM coverage_areas
            WHERE LOWER(name) = LOWER($1)
            ORDER BY name
            LIMIT 1
            "#,
        )
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("resolve_coverage_area"))?;

        Ok(row.map(|row| CoverageAreaConfig {
            coverage_key: row.coverage_key,
            name: row.name,
            safe_interval_days: row.safe_interval_days.map(i64::from),
        }))
    }
}
