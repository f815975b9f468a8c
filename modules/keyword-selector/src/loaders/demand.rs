use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::debug;

use keyword_common::{EntityDemandRow, SelectorConfig};

use crate::candidate::{Origin, TermCandidate};
use crate::scoring::demand_score;
use crate::traits::SignalReader;

/// Entity demand rows for the area. Shared by the demand and explore slices.
pub async fn load_demand_rows(
    reader: &dyn SignalReader,
    coverage_key: &str,
    since: DateTime<Utc>,
    config: &SelectorConfig,
) -> Result<Vec<EntityDemandRow>> {
    let rows = reader
        .find_entity_demand_signals(coverage_key, since, config.demand_per_signal_limit)
        .await
        .context("loading entity demand signals")?;
    debug!(coverage_key, count = rows.len(), "Loaded entity demand rows");
    Ok(rows)
}

pub fn demand_candidates(rows: &[EntityDemandRow]) -> Vec<TermCandidate> {
    rows.iter()
        .enumerate()
        .map(|(rank, row)| {
            TermCandidate::new(
                row.name.clone(),
                demand_score(row),
                Some(row.entity_type.clone()),
                Origin::Demand {
                    entity_id: row.entity_id,
                    favorite_users: row.favorite_users,
                    view_users: row.view_users,
                    autocomplete_users: row.autocomplete_users,
                    query_users_primary: row.query_users_primary,
                },
                rank,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn carries_entity_type_and_name() {
        let rows = vec![EntityDemandRow {
            entity_id: Uuid::new_v4(),
            entity_type: "restaurant".into(),
            name: "Franklin Barbecue".into(),
            favorite_users: 4,
            view_users: 12,
            autocomplete_users: 3,
            query_users_primary: 20,
        }];
        let candidates = demand_candidates(&rows);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].term, "Franklin Barbecue");
        assert_eq!(candidates[0].entity_type.as_deref(), Some("restaurant"));
        assert!(candidates[0].score > 0.0 && candidates[0].score < 1.0);
    }
}
