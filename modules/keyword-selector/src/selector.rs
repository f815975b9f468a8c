//! Entry point: one call selects the bounded term list for one coverage area.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use typed_builder::TypedBuilder;

use keyword_common::{PerSlice, SelectorConfig, Slice};

use crate::allocation::allocate;
use crate::area::resolve_coverage_area;
use crate::candidate::TermCandidate;
use crate::dedup::{dedup_across_slices, dedup_within_slice};
use crate::filter::filter_candidates;
use crate::history::{adjust_slice, HistoryIndex};
use crate::loaders::{
    demand_candidates, load_demand_rows, load_explore_candidates, load_refresh_candidates,
    load_unmet_requests, unmet_candidates,
};
use crate::stats::{DropCounts, SelectionStats, SliceStats};
use crate::traits::{HistoryScope, SignalReader};

/// Chooses which keywords an area's collection cycle should search.
///
/// Holds no per-call state, so one instance can serve concurrent calls for
/// different areas.
#[derive(Clone, TypedBuilder)]
pub struct KeywordSelector {
    reader: Arc<dyn SignalReader>,
    #[builder(default)]
    config: SelectorConfig,
}

/// The ordered terms for one cycle plus diagnostics. Never persisted here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionResult {
    pub collection_coverage_key: String,
    pub safe_interval_days: i64,
    pub window_days: i64,
    pub max_terms: usize,
    pub quotas: PerSlice<usize>,
    pub terms: Vec<TermCandidate>,
    pub stats: SelectionStats,
}

impl SelectionResult {
    pub fn terms_for_slice(&self, slice: Slice) -> impl Iterator<Item = &TermCandidate> {
        self.terms.iter().filter(move |t| t.slice == slice)
    }

    pub fn normalized_terms(&self) -> Vec<&str> {
        self.terms
            .iter()
            .map(|t| t.normalized_term.as_str())
            .collect()
    }
}

impl KeywordSelector {
    pub async fn select_terms_for_area(&self, area: &str) -> Result<SelectionResult> {
        self.select_terms_for_area_at(area, Utc::now()).await
    }

    /// Same as [`select_terms_for_area`](Self::select_terms_for_area) with a
    /// caller-supplied clock. Every time comparison in the call uses `now`.
    pub async fn select_terms_for_area_at(
        &self,
        area: &str,
        now: DateTime<Utc>,
    ) -> Result<SelectionResult> {
        let reader = self.reader.as_ref();
        let config = &self.config;

        let resolved =
            resolve_coverage_area(reader, area, config.default_safe_interval_days).await?;
        let key = resolved.collection_coverage_key.as_str();
        let since = config.window_start(now)?;

        let (unmet_records, refresh, demand_rows) = tokio::try_join!(
            load_unmet_requests(reader, key, since, config),
            load_refresh_candidates(reader, key, config, now),
            load_demand_rows(reader, key, since, config),
        )?;
        let explore = load_explore_candidates(
            reader,
            key,
            &demand_rows,
            &unmet_records,
            config,
            since,
            now,
        )
        .await?;

        let loaded = PerSlice {
            unmet: unmet_candidates(&unmet_records, config, now),
            refresh,
            demand: demand_candidates(&demand_rows),
            explore,
        };

        let mut slice_stats = PerSlice::<SliceStats>::default();
        let mut dropped = DropCounts::default();

        let unique = loaded.map(|slice, candidates| {
            let stats = slice_stats.get_mut(slice);
            stats.loaded = candidates.len();
            let (valid, invalid) = filter_candidates(candidates);
            stats.valid = valid.len();
            dropped.invalid += invalid;
            let (unique, collapsed) = dedup_within_slice(valid);
            stats.unique = unique.len();
            dropped.deduped += collapsed;
            unique
        });

        let history = self.load_history(key, &unique).await?;

        let adjusted = unique.map(|_slice, candidates| {
            let (kept, cooled) = adjust_slice(candidates, &history, config, now);
            dropped.cooldown += cooled;
            kept
        });

        let (eligible, cross_dropped) = dedup_across_slices(adjusted);
        dropped.deduped += cross_dropped;
        for (slice, candidates) in eligible.iter() {
            slice_stats.get_mut(slice).eligible = candidates.len();
        }
        let eligible_total: usize = eligible.iter().map(|(_, c)| c.len()).sum();

        let allocation = allocate(eligible, &config.quotas, config.max_terms);
        for slice in Slice::PRIORITY {
            let entry = slice_stats.get_mut(slice);
            entry.selected = *allocation.selected.get(slice);
            entry.backfilled = *allocation.backfilled.get(slice);
            entry.underfilled = *allocation.underfilled.get(slice);
        }

        let stats = SelectionStats {
            slices: slice_stats,
            candidates: slice_stats.iter().map(|(_, s)| s.loaded).sum(),
            eligible: eligible_total,
            selected: allocation.terms.len(),
            backfilled: allocation.backfilled.total(),
            underfilled: allocation.underfilled.total(),
            dropped,
        };

        info!(
            coverage_key = key,
            candidates = stats.candidates,
            eligible = stats.eligible,
            selected = stats.selected,
            backfilled = stats.backfilled,
            underfilled = stats.underfilled,
            invalid = stats.dropped.invalid,
            cooldown = stats.dropped.cooldown,
            deduped = stats.dropped.deduped,
            unmet = slice_stats.unmet.selected + slice_stats.unmet.backfilled,
            refresh = slice_stats.refresh.selected + slice_stats.refresh.backfilled,
            demand = slice_stats.demand.selected + slice_stats.demand.backfilled,
            explore = slice_stats.explore.selected + slice_stats.explore.backfilled,
            "Keyword selection complete"
        );

        Ok(SelectionResult {
            collection_coverage_key: resolved.collection_coverage_key,
            safe_interval_days: resolved.safe_interval_days,
            window_days: config.window_days,
            max_terms: config.max_terms,
            quotas: config.quotas,
            terms: allocation.terms,
            stats,
        })
    }

    /// History for every surviving term, in one read.
    async fn load_history(
        &self,
        coverage_key: &str,
        slices: &PerSlice<Vec<TermCandidate>>,
    ) -> Result<HistoryIndex> {
        let terms: Vec<String> = slices
            .iter()
            .flat_map(|(_, candidates)| candidates.iter().map(|c| c.normalized_term.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if terms.is_empty() {
            return Ok(HistoryIndex::default());
        }

        let records = self
            .reader
            .find_attempt_history(coverage_key, HistoryScope::Terms(&terms))
            .await
            .context("loading attempt history for candidates")?;
        debug!(
            coverage_key,
            terms = terms.len(),
            records = records.len(),
            "Loaded attempt history"
        );
        Ok(HistoryIndex::new(records))
    }
}
