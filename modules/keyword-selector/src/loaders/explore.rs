use std::collections::{BTreeSet, HashMap};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use keyword_common::{
    global_count_key, normalize_keyword_term, EntityDemandRow, ExploreFloors, SelectorConfig,
    TrendCounts, UnmetRequestRecord,
};

use crate::candidate::{ExploreSignals, Origin, TermCandidate};
use crate::traits::SignalReader;

/// Everything the explore slice joins onto the demand rows.
pub struct ExploreInputs<'a> {
    pub rows: &'a [EntityDemandRow],
    /// Max distinct unmet users per normalized term.
    pub unmet_users: &'a HashMap<String, i64>,
    pub trends: &'a HashMap<Uuid, TrendCounts>,
    /// Keyed by `global_count_key`.
    pub global_counts: &'a HashMap<String, i64>,
}

/// Demand rows that clear a signal floor, with trend and global counts attached.
///
/// Scores stay at zero here. Novelty depends on attempt history, which is
/// only loaded once every slice's terms are known.
///
/// These rows are a subset of the demand slice's rows and demand outranks
/// explore, so cross-slice dedup removes every explore term that reaches it.
pub async fn load_explore_candidates(
    reader: &dyn SignalReader,
    coverage_key: &str,
    rows: &[EntityDemandRow],
    unmet_records: &[UnmetRequestRecord],
    config: &SelectorConfig,
    since: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Vec<TermCandidate>> {
    let unmet_users = unmet_users_by_term(unmet_records);
    let qualifying: Vec<EntityDemandRow> = rows
        .iter()
        .filter(|row| clears_floor(row, &unmet_users, &config.explore_floors))
        .cloned()
        .collect();
    if qualifying.is_empty() {
        debug!(coverage_key, "No explore rows cleared a signal floor");
        return Ok(Vec::new());
    }

    let entity_ids: Vec<Uuid> = qualifying.iter().map(|row| row.entity_id).collect();
    let term_keys: Vec<String> = qualifying
        .iter()
        .map(|row| row.name.trim().to_lowercase())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let entity_types: Vec<String> = qualifying
        .iter()
        .map(|row| row.entity_type.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let (trend_start, trend_since) = config.trend_bounds(now)?;

    let (trends, global_counts) = tokio::try_join!(
        async {
            reader
                .find_trend_counts(coverage_key, &entity_ids, trend_start, trend_since)
                .await
                .context("loading explore trend counts")
        },
        async {
            reader
                .find_global_query_counts(since, &term_keys, &entity_types)
                .await
                .context("loading global query counts")
        },
    )?;

    let candidates = explore_candidates(
        &ExploreInputs {
            rows: &qualifying,
            unmet_users: &unmet_users,
            trends: &trends,
            global_counts: &global_counts,
        },
        &config.explore_floors,
    );
    debug!(
        coverage_key,
        rows = rows.len(),
        qualifying = candidates.len(),
        "Loaded explore candidates"
    );
    Ok(candidates)
}

pub fn explore_candidates(inputs: &ExploreInputs<'_>, floors: &ExploreFloors) -> Vec<TermCandidate> {
    inputs
        .rows
        .iter()
        .filter(|row| clears_floor(row, inputs.unmet_users, floors))
        .enumerate()
        .map(|(rank, row)| {
            let trend = inputs
                .trends
                .get(&row.entity_id)
                .copied()
                .unwrap_or_default();
            let global_query_users = inputs
                .global_counts
                .get(&global_count_key(&row.entity_type, &row.name))
                .copied()
                .unwrap_or(0);
            TermCandidate::new(
                row.name.clone(),
                0.0,
                Some(row.entity_type.clone()),
                Origin::Explore(ExploreSignals {
                    entity_id: row.entity_id,
                    favorite_users: row.favorite_users,
                    view_users: row.view_users,
                    autocomplete_users: row.autocomplete_users,
                    unmet_distinct_users: unmet_users_for(row, inputs.unmet_users),
                    local_query_users: row.query_users_primary,
                    global_query_users,
                    query_users_7d: trend.query_users_7d,
                    query_users_prev_7d: trend.query_users_prev_7d,
                    components: None,
                }),
                rank,
            )
        })
        .collect()
}

/// Max distinct users per normalized term across all unmet records.
pub fn unmet_users_by_term(records: &[UnmetRequestRecord]) -> HashMap<String, i64> {
    let mut users: HashMap<String, i64> = HashMap::new();
    for record in records {
        let key = normalize_keyword_term(&record.term);
        if key.is_empty() {
            continue;
        }
        let entry = users.entry(key).or_default();
        *entry = (*entry).max(record.distinct_user_count);
    }
    users
}

fn unmet_users_for(row: &EntityDemandRow, unmet_users: &HashMap<String, i64>) -> i64 {
    unmet_users
        .get(&normalize_keyword_term(&row.name))
        .copied()
        .unwrap_or(0)
}

fn clears_floor(
    row: &EntityDemandRow,
    unmet_users: &HashMap<String, i64>,
    floors: &ExploreFloors,
) -> bool {
    row.view_users >= floors.min_view_users
        || row.autocomplete_users >= floors.min_autocomplete_users
        || row.favorite_users >= floors.min_favorite_users
        || unmet_users_for(row, unmet_users) >= floors.min_unmet_users
}
