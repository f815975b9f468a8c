use keyword_common::{PerSlice, Slice};

use crate::candidate::TermCandidate;

/// Final ordering plus how each slice contributed.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    /// Quota picks in slice priority order, followed by backfill in slice priority order.
    pub terms: Vec<TermCandidate>,
    pub selected: PerSlice<usize>,
    pub backfilled: PerSlice<usize>,
    pub underfilled: PerSlice<usize>,
}

/// Fill each slice to its quota, then spend any leftover budget on overflow,
/// draining higher-priority slices first.
///
/// Each slice's list must already be sorted by score.
pub fn allocate(
    eligible: PerSlice<Vec<TermCandidate>>,
    quotas: &PerSlice<usize>,
    budget: usize,
) -> Allocation {
    let mut terms: Vec<TermCandidate> = Vec::with_capacity(budget);
    let mut selected = PerSlice::<usize>::default();
    let mut backfilled = PerSlice::<usize>::default();
    let mut underfilled = PerSlice::<usize>::default();
    let mut overflow: PerSlice<Vec<TermCandidate>> = PerSlice::default();

    for (slice, mut candidates) in eligible.into_entries() {
        let quota = *quotas.get(slice);
        let take = quota.min(candidates.len());
        *overflow.get_mut(slice) = candidates.split_off(take);
        *underfilled.get_mut(slice) = quota - take;

        // Quotas can sum past the budget; later slices then lose their picks.
        let room = budget.saturating_sub(terms.len());
        candidates.truncate(room);
        *selected.get_mut(slice) = candidates.len();
        terms.extend(candidates);
    }

    for slice in Slice::PRIORITY {
        let room = budget.saturating_sub(terms.len());
        if room == 0 {
            break;
        }
        let pool = overflow.get_mut(slice);
        let take = room.min(pool.len());
        *backfilled.get_mut(slice) = take;
        terms.extend(pool.drain(..take));
    }

    Allocation {
        terms,
        selected,
        backfilled,
        underfilled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::Origin;

    fn candidates(slice: Slice, count: usize) -> Vec<TermCandidate> {
        (0..count)
            .map(|i| {
                let origin = match slice {
                    Slice::Unmet => Origin::Unmet {
                        reason: keyword_common::UnmetReason::Unresolved,
                        distinct_users: 1,
                        last_seen_at: chrono::Utc::now(),
                        demand_factor: 0.0,
                        recency_boost: 1.0,
                        soft_suppressed: false,
                    },
                    Slice::Refresh => Origin::Refresh {
                        last_attempt_at: None,
                        last_success_at: None,
                        staleness_days: 0.0,
                    },
                    Slice::Demand => Origin::Demand {
                        entity_id: uuid::Uuid::nil(),
                        favorite_users: 0,
                        view_users: 0,
                        autocomplete_users: 0,
                        query_users_primary: 0,
                    },
                    Slice::Explore => Origin::Explore(crate::candidate::ExploreSignals {
                        entity_id: uuid::Uuid::nil(),
                        favorite_users: 0,
                        view_users: 0,
                        autocomplete_users: 0,
                        unmet_distinct_users: 0,
                        local_query_users: 0,
                        global_query_users: 0,
                        query_users_7d: 0,
                        query_users_prev_7d: 0,
                        components: None,
                    }),
                };
                let term = format!("{slice}-{i}");
                TermCandidate::new(term.clone(), 1.0 - i as f64 * 0.01, None, origin, i)
                    .with_terms(term.clone(), term)
            })
            .collect()
    }

    fn default_quotas() -> PerSlice<usize> {
        PerSlice {
            unmet: 5,
            refresh: 10,
            demand: 8,
            explore: 2,
        }
    }

    fn pool(unmet: usize, refresh: usize, demand: usize, explore: usize) -> PerSlice<Vec<TermCandidate>> {
        PerSlice {
            unmet: candidates(Slice::Unmet, unmet),
            refresh: candidates(Slice::Refresh, refresh),
            demand: candidates(Slice::Demand, demand),
            explore: candidates(Slice::Explore, explore),
        }
    }

    #[test]
    fn quota_fill_when_everything_is_plentiful() {
        let allocation = allocate(pool(20, 20, 20, 20), &default_quotas(), 25);
        assert_eq!(allocation.terms.len(), 25);
        assert_eq!(allocation.selected, default_quotas());
        assert_eq!(allocation.backfilled.total(), 0);
        assert_eq!(allocation.underfilled.total(), 0);
        assert_eq!(allocation.terms[0].slice, Slice::Unmet);
        assert_eq!(allocation.terms[24].slice, Slice::Explore);
    }

    #[test]
    fn unmet_shortfall_backfilled_from_demand() {
        // unmet has 2 (3 short), refresh exactly 10, demand 15, explore 5
        let allocation = allocate(pool(2, 10, 15, 5), &default_quotas(), 25);
        assert_eq!(allocation.terms.len(), 25);
        assert_eq!(allocation.underfilled.unmet, 3);
        assert_eq!(allocation.backfilled.demand, 3);
        assert_eq!(allocation.backfilled.explore, 0);
        // backfill follows every quota pick
        let tail: Vec<Slice> = allocation.terms[22..].iter().map(|c| c.slice).collect();
        assert_eq!(tail, vec![Slice::Demand; 3]);
        assert_eq!(allocation.terms[22].term, "demand-8");
    }

    #[test]
    fn higher_priority_overflow_drains_first() {
        // unmet and explore short; refresh and demand both overflow
        let allocation = allocate(pool(0, 13, 12, 0), &default_quotas(), 25);
        assert_eq!(allocation.terms.len(), 25);
        assert_eq!(allocation.backfilled.refresh, 3);
        assert_eq!(allocation.backfilled.demand, 4);
    }

    #[test]
    fn never_exceeds_available() {
        let allocation = allocate(pool(1, 2, 3, 1), &default_quotas(), 25);
        assert_eq!(allocation.terms.len(), 7);
        assert_eq!(allocation.underfilled.total(), 4 + 8 + 5 + 1);
    }

    #[test]
    fn quotas_past_budget_are_truncated() {
        let quotas = PerSlice {
            unmet: 5,
            refresh: 5,
            demand: 5,
            explore: 5,
        };
        let allocation = allocate(pool(10, 10, 10, 10), &quotas, 12);
        assert_eq!(allocation.terms.len(), 12);
        assert_eq!(allocation.selected.demand, 2);
        assert_eq!(allocation.selected.explore, 0);
        assert_eq!(allocation.backfilled.total(), 0);
    }
}
