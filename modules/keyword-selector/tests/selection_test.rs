//! End-to-end selection over the in-memory reader.
//!
//! Every test pins `now` so scores and cooldown checks are reproducible.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use keyword_common::{AttemptOutcome, CoverageAreaConfig, SelectorConfig, Slice, UnmetReason};
use keyword_selector::testing::{
    attempt, cooling, demand_row, unmet_request, MockSignalReader, TEST_AREA, TEST_KEY,
};
use keyword_selector::{KeywordSelector, Origin, SelectionResult};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("keyword_selector=debug")
        .try_init();
}

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn days_ago(days: i64) -> DateTime<Utc> {
    fixed_now() - Duration::days(days)
}

fn selector(reader: Arc<MockSignalReader>) -> KeywordSelector {
    KeywordSelector::builder().reader(reader).build()
}

async fn select(reader: Arc<MockSignalReader>) -> SelectionResult {
    init_tracing();
    selector(reader)
        .select_terms_for_area_at(TEST_AREA, fixed_now())
        .await
        .expect("selection should succeed")
}

/// Two unmet terms, twelve refresh terms and fifteen demand entities that
/// clear no explore floor.
fn shortfall_reader() -> MockSignalReader {
    let mut reader = MockSignalReader::new()
        .with_unmet(unmet_request("ramen", UnmetReason::Unresolved, 5, days_ago(1)))
        .with_unmet(unmet_request("pho", UnmetReason::Unresolved, 3, days_ago(1)));
    for i in 0..12 {
        let at = days_ago(10 + i);
        reader = reader.with_history(attempt(
            &format!("curry {i}"),
            Some(at),
            Some(at),
            Some(AttemptOutcome::Success),
        ));
    }
    for i in 0..15 {
        reader = reader.with_demand_row(
            TEST_KEY,
            demand_row("food", &format!("taco {i}"), 0, 1, 1, i + 1),
        );
    }
    reader
}

/// Shortfall data plus a cross-slice collision, a cooled term and an all-generic term.
fn mixed_reader() -> MockSignalReader {
    shortfall_reader()
        .with_unmet(unmet_request("Burger", UnmetReason::LowResult, 2, days_ago(3)))
        .with_demand_row(TEST_KEY, demand_row("food", "burger", 2, 4, 0, 6))
        .with_unmet(unmet_request("best restaurant", UnmetReason::Unresolved, 9, days_ago(1)))
        .with_unmet(unmet_request("laksa", UnmetReason::Unresolved, 4, days_ago(2)))
        .with_history(cooling("laksa", days_ago(1), fixed_now() + Duration::days(2)))
}

fn slices(result: &SelectionResult) -> Vec<Slice> {
    result.terms.iter().map(|t| t.slice).collect()
}

// ---------------------------------------------------------------------------
// Scoring and filtering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unmet_request_scores_by_severity_users_and_recency() {
    let reader = Arc::new(
        MockSignalReader::new()
            .with_unmet(unmet_request("ramen", UnmetReason::Unresolved, 5, days_ago(2))),
    );

    let result = select(reader).await;

    assert_eq!(result.terms.len(), 1);
    let ramen = &result.terms[0];
    assert_eq!(ramen.slice, Slice::Unmet);
    assert_eq!(ramen.normalized_term, "ramen");
    assert!((ramen.score - 0.508).abs() < 0.005, "score was {}", ramen.score);
}

#[tokio::test]
async fn generic_only_terms_are_dropped_and_modifiers_stripped() {
    let reader = Arc::new(
        MockSignalReader::new()
            .with_unmet(unmet_request("best restaurant", UnmetReason::Unresolved, 5, days_ago(1)))
            .with_unmet(unmet_request("best taco", UnmetReason::Unresolved, 3, days_ago(1))),
    );

    let result = select(reader).await;

    assert_eq!(result.normalized_terms(), vec!["taco"]);
    assert_eq!(result.terms[0].term, "taco");
    assert_eq!(result.stats.dropped.invalid, 1);
}

#[tokio::test]
async fn recent_no_results_attempt_sinks_unmet_term() {
    let reader = Arc::new(
        MockSignalReader::new()
            .with_unmet(unmet_request("pho", UnmetReason::Unresolved, 5, days_ago(1)))
            .with_unmet(unmet_request("ramen", UnmetReason::Unresolved, 3, days_ago(1)))
            .with_history(attempt(
                "pho",
                Some(days_ago(10)),
                None,
                Some(AttemptOutcome::NoResults),
            )),
    );

    let result = select(reader).await;

    let unmet: Vec<_> = result.terms_for_slice(Slice::Unmet).collect();
    assert_eq!(unmet[0].normalized_term, "ramen");
    assert_eq!(unmet[1].normalized_term, "pho");
    match &unmet[1].origin {
        Origin::Unmet {
            soft_suppressed, ..
        } => assert!(*soft_suppressed),
        other => panic!("expected unmet origin, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// History, dedup and allocation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cooldown_excludes_only_terms_blocked_past_now() {
    let reader = Arc::new(
        MockSignalReader::new()
            .with_unmet(unmet_request("pho", UnmetReason::Unresolved, 3, days_ago(1)))
            .with_unmet(unmet_request("banh mi", UnmetReason::Unresolved, 3, days_ago(1)))
            .with_history(cooling("pho", days_ago(1), fixed_now() + Duration::days(1)))
            .with_history(cooling("banh mi", days_ago(2), fixed_now())),
    );

    let result = select(reader).await;

    assert_eq!(result.normalized_terms(), vec!["banh mi"]);
    assert_eq!(result.terms[0].slice, Slice::Unmet);
    // pho is cooled in both the unmet and refresh slices.
    assert_eq!(result.stats.dropped.cooldown, 2);
    assert_eq!(result.stats.dropped.deduped, 1);
}

#[tokio::test]
async fn cross_slice_collision_keeps_higher_priority_slice() {
    let reader = Arc::new(
        MockSignalReader::new()
            .with_unmet(unmet_request("burger", UnmetReason::Unresolved, 3, days_ago(1)))
            .with_demand_row(TEST_KEY, demand_row("food", "Burger", 1, 0, 0, 4)),
    );

    let result = select(reader.clone()).await;

    assert_eq!(result.normalized_terms(), vec!["burger"]);
    assert_eq!(result.terms[0].slice, Slice::Unmet);
    // Dropped once from demand and once from explore.
    assert_eq!(result.stats.dropped.deduped, 2);
    assert_eq!(result.stats.slices.demand.unique, 1);
    assert_eq!(result.stats.slices.demand.eligible, 0);
    assert_eq!(reader.call_count("find_trend_counts"), 1);
    assert_eq!(reader.call_count("find_global_query_counts"), 1);
}

#[tokio::test]
async fn accented_and_decomposed_spellings_share_one_slot() {
    let reader = Arc::new(
        MockSignalReader::new()
            .with_unmet(unmet_request("Phở", UnmetReason::Unresolved, 4, days_ago(1)))
            .with_unmet(unmet_request("Pho\u{31b}\u{309}", UnmetReason::Unresolved, 2, days_ago(1)))
            .with_demand_row(TEST_KEY, demand_row("food", "pho", 0, 1, 1, 3)),
    );

    let result = select(reader).await;

    assert_eq!(result.normalized_terms(), vec!["pho"]);
    assert_eq!(result.terms[0].slice, Slice::Unmet);
    // One collapse within unmet, then the demand and explore copies.
    assert_eq!(result.stats.dropped.deduped, 3);
    assert_eq!(result.stats.slices.unmet.unique, 1);
}

#[tokio::test]
async fn unmet_shortfall_is_backfilled_in_priority_order() {
    let result = select(Arc::new(shortfall_reader())).await;

    assert_eq!(result.terms.len(), 25);
    let order = slices(&result);
    assert!(order[..2].iter().all(|s| *s == Slice::Unmet));
    assert!(order[2..12].iter().all(|s| *s == Slice::Refresh));
    assert!(order[12..20].iter().all(|s| *s == Slice::Demand));
    assert!(order[20..22].iter().all(|s| *s == Slice::Refresh));
    assert!(order[22..].iter().all(|s| *s == Slice::Demand));

    let stats = &result.stats;
    assert_eq!(stats.slices.unmet.underfilled, 3);
    assert_eq!(stats.slices.explore.underfilled, 2);
    assert_eq!(stats.slices.refresh.backfilled, 2);
    assert_eq!(stats.slices.demand.backfilled, 3);
    assert_eq!(stats.backfilled, 5);
    assert_eq!(stats.underfilled, 5);
}

#[tokio::test]
async fn backfilled_terms_follow_score_order_within_slice() {
    let result = select(Arc::new(shortfall_reader())).await;

    let demand: Vec<_> = result.terms_for_slice(Slice::Demand).collect();
    assert_eq!(demand.len(), 11);
    assert!(demand.windows(2).all(|w| w[0].score >= w[1].score));
    assert_eq!(demand[0].normalized_term, "taco 14");
}

#[tokio::test]
async fn result_never_exceeds_budget() {
    init_tracing();
    let config = SelectorConfig {
        max_terms: 3,
        ..SelectorConfig::default()
    };
    let selector = KeywordSelector::builder()
        .reader(Arc::new(mixed_reader()))
        .config(config)
        .build();

    let result = selector
        .select_terms_for_area_at(TEST_AREA, fixed_now())
        .await
        .unwrap();

    assert_eq!(result.max_terms, 3);
    assert_eq!(result.terms.len(), 3);
    assert_eq!(slices(&result), vec![Slice::Unmet; 3]);
}

#[tokio::test]
async fn selected_terms_are_unique() {
    let result = select(Arc::new(mixed_reader())).await;

    let unique: HashSet<&str> = result.normalized_terms().into_iter().collect();
    assert_eq!(unique.len(), result.terms.len());
    assert!(result.terms.len() <= result.max_terms);
    assert!(!unique.contains("laksa"));
}

#[tokio::test]
async fn stats_account_for_every_candidate() {
    let result = select(Arc::new(mixed_reader())).await;
    let stats = &result.stats;

    assert_eq!(stats.candidates, stats.eligible + stats.dropped.total());
    assert_eq!(stats.selected, result.terms.len());
    assert!(stats.selected <= stats.eligible);
    assert_eq!(stats.dropped.invalid, 1);
    assert_eq!(stats.dropped.cooldown, 2);

    let per_slice_eligible: usize = stats.slices.iter().map(|(_, s)| s.eligible).sum();
    assert_eq!(per_slice_eligible, stats.eligible);
    for (slice, s) in stats.slices.iter() {
        assert!(s.valid <= s.loaded, "{slice}");
        assert!(s.unique <= s.valid, "{slice}");
        assert!(s.eligible <= s.unique, "{slice}");
    }
}

#[tokio::test]
async fn identical_inputs_give_identical_results() {
    let reader = Arc::new(mixed_reader());

    let first = select(reader.clone()).await;
    let second = select(reader).await;

    assert_eq!(first, second);
}

// ---------------------------------------------------------------------------
// Reads and failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_is_read_once_after_all_loaders() {
    let reader = Arc::new(mixed_reader());

    select(reader.clone()).await;

    let calls = reader.calls();
    assert_eq!(calls.first().map(String::as_str), Some("resolve_coverage_area"));
    assert_eq!(calls.last().map(String::as_str), Some("find_attempt_history:terms"));
    assert_eq!(reader.call_count("find_attempt_history:terms"), 1);
    assert_eq!(reader.call_count("find_attempt_history:stalest"), 1);
}

#[tokio::test]
async fn empty_area_skips_history_lookup() {
    let reader = Arc::new(MockSignalReader::new());

    let result = select(reader.clone()).await;

    assert!(result.terms.is_empty());
    assert_eq!(result.stats.candidates, 0);
    assert_eq!(result.stats.underfilled, 25);
    assert_eq!(reader.call_count("find_attempt_history:terms"), 0);
}

#[tokio::test]
async fn loader_failure_fails_the_whole_call() {
    init_tracing();
    for method in [
        "find_unmet_requests",
        "find_attempt_history",
        "find_entity_demand_signals",
        "find_trend_counts",
        "find_global_query_counts",
        "resolve_coverage_area",
    ] {
        let reader = Arc::new(mixed_reader().failing(method));
        let outcome = selector(reader)
            .select_terms_for_area_at(TEST_AREA, fixed_now())
            .await;
        assert!(outcome.is_err(), "{method} failure should propagate");
    }
}

#[tokio::test]
async fn out_of_range_window_is_an_error_not_a_panic() {
    init_tracing();
    for config in [
        SelectorConfig {
            window_days: 200_000_000_000,
            ..SelectorConfig::default()
        },
        SelectorConfig {
            trend_window_days: i64::MAX,
            ..SelectorConfig::default()
        },
    ] {
        assert!(config.validate().is_err());
        let selector = KeywordSelector::builder()
            .reader(Arc::new(mixed_reader()))
            .config(config)
            .build();
        let outcome = selector
            .select_terms_for_area_at(TEST_AREA, fixed_now())
            .await;
        assert!(outcome.is_err());
    }
}

// ---------------------------------------------------------------------------
// Area resolution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn configured_key_wins_and_bad_interval_falls_back() {
    let reader = Arc::new(MockSignalReader::new().with_area(
        "austin",
        CoverageAreaConfig {
            coverage_key: Some(" ATX-Metro ".into()),
            name: Some("Austin".into()),
            safe_interval_days: Some(0),
        },
    ));

    let result = select(reader).await;

    assert_eq!(result.collection_coverage_key, "atx-metro");
    assert_eq!(result.safe_interval_days, 7);
}

#[tokio::test]
async fn configured_name_and_interval_are_used_without_key() {
    let reader = Arc::new(MockSignalReader::new().with_area(
        TEST_AREA,
        CoverageAreaConfig {
            coverage_key: None,
            name: Some("Austin TX".into()),
            safe_interval_days: Some(14),
        },
    ));

    let result = select(reader).await;

    assert_eq!(result.collection_coverage_key, "austin tx");
    assert_eq!(result.safe_interval_days, 14);
}

#[tokio::test]
async fn unknown_area_uses_raw_name() {
    init_tracing();
    let result = selector(Arc::new(MockSignalReader::new()))
        .select_terms_for_area_at("  Round Rock ", fixed_now())
        .await
        .unwrap();

    assert_eq!(result.collection_coverage_key, "round rock");
    assert_eq!(result.safe_interval_days, 7);
    assert_eq!(result.window_days, 30);
    assert_eq!(result.quotas.refresh, 10);
}
