use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::debug;

use keyword_common::{SelectorConfig, UnmetRequestRecord};

use crate::candidate::{Origin, TermCandidate};
use crate::scoring::{days_since, normalize_log, recency_boost};
use crate::traits::SignalReader;

/// Read unmet requests for the area. The records also feed the explore loader.
pub async fn load_unmet_requests(
    reader: &dyn SignalReader,
    coverage_key: &str,
    since: DateTime<Utc>,
    config: &SelectorConfig,
) -> Result<Vec<UnmetRequestRecord>> {
    let records = reader
        .find_unmet_requests(
            coverage_key,
            config.unmet_min_distinct_users,
            since,
            &config.unmet_reasons,
            config.candidate_limit(),
        )
        .await
        .context("loading unmet requests")?;
    debug!(coverage_key, count = records.len(), "Loaded unmet requests");
    Ok(records)
}

/// One candidate per record: severe, widely-felt, recent misses score highest.
pub fn unmet_candidates(
    records: &[UnmetRequestRecord],
    config: &SelectorConfig,
    now: DateTime<Utc>,
) -> Vec<TermCandidate> {
    records
        .iter()
        .enumerate()
        .map(|(rank, record)| {
            let demand_factor =
                normalize_log(record.distinct_user_count as f64, config.unmet_user_cap);
            let boost = recency_boost(days_since(record.last_seen_at, now));
            let score = record.reason.severity() * demand_factor * boost;
            TermCandidate::new(
                record.term.clone(),
                score,
                record.entity_type.clone(),
                Origin::Unmet {
                    reason: record.reason,
                    distinct_users: record.distinct_user_count,
                    last_seen_at: record.last_seen_at,
                    demand_factor,
                    recency_boost: boost,
                    soft_suppressed: false,
                },
                rank,
            )
        })
        .collect()
}
