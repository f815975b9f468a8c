use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::debug;

use keyword_common::{AttemptHistoryRecord, SelectorConfig};

use crate::candidate::{Origin, TermCandidate};
use crate::scoring::{refresh_score, staleness_days};
use crate::traits::{HistoryScope, SignalReader};

/// Stalest attempt-history rows for the area, scored by staleness.
pub async fn load_refresh_candidates(
    reader: &dyn SignalReader,
    coverage_key: &str,
    config: &SelectorConfig,
    now: DateTime<Utc>,
) -> Result<Vec<TermCandidate>> {
    let records = reader
        .find_attempt_history(
            coverage_key,
            HistoryScope::Stalest {
                limit: config.candidate_limit(),
            },
        )
        .await
        .context("loading refresh history")?;
    debug!(coverage_key, count = records.len(), "Loaded refresh history");
    Ok(refresh_candidates(&records, config, now))
}

/// Anchors on the last success, falling back to the last attempt. Terms that
/// were never attempted or never succeeded are maximally stale.
pub fn refresh_candidates(
    records: &[AttemptHistoryRecord],
    config: &SelectorConfig,
    now: DateTime<Utc>,
) -> Vec<TermCandidate> {
    records
        .iter()
        .enumerate()
        .map(|(rank, record)| {
            let anchor = record.last_success_at.or(record.last_attempt_at);
            let staleness = staleness_days(anchor, now, config.refresh_max_staleness_days);
            TermCandidate::new(
                record.normalized_term.clone(),
                refresh_score(staleness, config.refresh_saturation_days),
                None,
                Origin::Refresh {
                    last_attempt_at: record.last_attempt_at,
                    last_success_at: record.last_success_at,
                    staleness_days: staleness,
                },
                rank,
            )
        })
        .collect()
}
