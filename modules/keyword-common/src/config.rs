use std::env;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::KeywordError;
use crate::types::{PerSlice, UnmetReason};

/// Upper bound for any lookback window, in days.
pub const MAX_WINDOW_DAYS: i64 = 3650;

/// Minimum signal an entity needs before the explore slice will consider it.
/// A row qualifies when it clears any one floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExploreFloors {
    pub min_view_users: i64,
    pub min_autocomplete_users: i64,
    pub min_favorite_users: i64,
    pub min_unmet_users: i64,
}

impl Default for ExploreFloors {
    fn default() -> Self {
        Self {
            min_view_users: 2,
            min_autocomplete_users: 2,
            min_favorite_users: 1,
            min_unmet_users: 2,
        }
    }
}

/// Tunables for one selector instance. Immutable once the selector is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Overall cycle budget.
    pub max_terms: usize,
    /// Per-slice quotas filled before overflow backfill.
    pub quotas: PerSlice<usize>,
    /// Loader row cap as a multiple of `max_terms`.
    pub candidate_multiplier: usize,
    /// Lookback for unmet requests and demand signals.
    pub window_days: i64,
    pub unmet_min_distinct_users: i64,
    /// Distinct-user count at which the unmet demand factor saturates.
    pub unmet_user_cap: f64,
    pub unmet_reasons: Vec<UnmetReason>,
    /// Top-N kept per individual demand signal before the union.
    pub demand_per_signal_limit: usize,
    pub trend_window_days: i64,
    pub refresh_saturation_days: f64,
    pub refresh_max_staleness_days: f64,
    /// Unmet terms whose last attempt found nothing within this window are damped.
    pub soft_suppress_days: i64,
    pub soft_suppress_factor: f64,
    /// Days since last attempt at which explore novelty reaches 1.0.
    pub novelty_window_days: f64,
    pub explore_floors: ExploreFloors,
    /// Used when a coverage area has no positive interval configured.
    pub default_safe_interval_days: i64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            max_terms: 25,
            quotas: PerSlice {
                unmet: 5,
                refresh: 10,
                demand: 8,
                explore: 2,
            },
            candidate_multiplier: 10,
            window_days: 30,
            unmet_min_distinct_users: 1,
            unmet_user_cap: 25.0,
            unmet_reasons: UnmetReason::ALL.to_vec(),
            demand_per_signal_limit: 250,
            trend_window_days: 7,
            refresh_saturation_days: 90.0,
            refresh_max_staleness_days: 365.0,
            soft_suppress_days: 60,
            soft_suppress_factor: 0.3,
            novelty_window_days: 30.0,
            explore_floors: ExploreFloors::default(),
            default_safe_interval_days: 7,
        }
    }
}

impl SelectorConfig {
    /// Defaults overridden by any `KEYWORD_*` environment variables that are set.
    pub fn from_env() -> Result<Self, KeywordError> {
        let defaults = Self::default();
        let floors = defaults.explore_floors.clone();

        let unmet_reasons = match env::var("KEYWORD_UNMET_REASONS") {
            Ok(raw) => parse_reasons(&raw)?,
            Err(_) => defaults.unmet_reasons.clone(),
        };

        let config = Self {
            max_terms: env_or("KEYWORD_MAX_TERMS", defaults.max_terms)?,
            quotas: PerSlice {
                unmet: env_or("KEYWORD_QUOTA_UNMET", defaults.quotas.unmet)?,
                refresh: env_or("KEYWORD_QUOTA_REFRESH", defaults.quotas.refresh)?,
                demand: env_or("KEYWORD_QUOTA_DEMAND", defaults.quotas.demand)?,
                explore: env_or("KEYWORD_QUOTA_EXPLORE", defaults.quotas.explore)?,
            },
            candidate_multiplier: env_or(
                "KEYWORD_CANDIDATE_MULTIPLIER",
                defaults.candidate_multiplier,
            )?,
            window_days: env_or("KEYWORD_WINDOW_DAYS", defaults.window_days)?,
            unmet_min_distinct_users: env_or(
                "KEYWORD_UNMET_MIN_DISTINCT_USERS",
                defaults.unmet_min_distinct_users,
            )?,
            unmet_user_cap: env_or("KEYWORD_UNMET_USER_CAP", defaults.unmet_user_cap)?,
            unmet_reasons,
            demand_per_signal_limit: env_or(
                "KEYWORD_DEMAND_PER_SIGNAL_LIMIT",
                defaults.demand_per_signal_limit,
            )?,
            trend_window_days: env_or("KEYWORD_TREND_WINDOW_DAYS", defaults.trend_window_days)?,
            refresh_saturation_days: env_or(
                "KEYWORD_REFRESH_SATURATION_DAYS",
                defaults.refresh_saturation_days,
            )?,
            refresh_max_staleness_days: env_or(
                "KEYWORD_REFRESH_MAX_STALENESS_DAYS",
                defaults.refresh_max_staleness_days,
            )?,
            soft_suppress_days: env_or("KEYWORD_SOFT_SUPPRESS_DAYS", defaults.soft_suppress_days)?,
            soft_suppress_factor: env_or(
                "KEYWORD_SOFT_SUPPRESS_FACTOR",
                defaults.soft_suppress_factor,
            )?,
            novelty_window_days: env_or(
                "KEYWORD_NOVELTY_WINDOW_DAYS",
                defaults.novelty_window_days,
            )?,
            explore_floors: ExploreFloors {
                min_view_users: env_or("KEYWORD_EXPLORE_MIN_VIEW_USERS", floors.min_view_users)?,
                min_autocomplete_users: env_or(
                    "KEYWORD_EXPLORE_MIN_AUTOCOMPLETE_USERS",
                    floors.min_autocomplete_users,
                )?,
                min_favorite_users: env_or(
                    "KEYWORD_EXPLORE_MIN_FAVORITE_USERS",
                    floors.min_favorite_users,
                )?,
                min_unmet_users: env_or("KEYWORD_EXPLORE_MIN_UNMET_USERS", floors.min_unmet_users)?,
            },
            default_safe_interval_days: env_or(
                "KEYWORD_DEFAULT_SAFE_INTERVAL_DAYS",
                defaults.default_safe_interval_days,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the scoring math meaningless.
    pub fn validate(&self) -> Result<(), KeywordError> {
        if self.max_terms == 0 {
            return Err(KeywordError::Config("max_terms must be positive".into()));
        }
        if self.candidate_multiplier == 0 {
            return Err(KeywordError::Config(
                "candidate_multiplier must be positive".into(),
            ));
        }
        for (name, days) in [
            ("window_days", self.window_days),
            ("trend_window_days", self.trend_window_days),
        ] {
            if !(1..=MAX_WINDOW_DAYS).contains(&days) {
                return Err(KeywordError::Config(format!(
                    "{name} must be within [1, {MAX_WINDOW_DAYS}], got {days}"
                )));
            }
        }
        if self.unmet_user_cap <= 0.0 {
            return Err(KeywordError::Config("unmet_user_cap must be positive".into()));
        }
        if self.refresh_saturation_days <= 0.0 || self.novelty_window_days <= 0.0 {
            return Err(KeywordError::Config(
                "refresh_saturation_days and novelty_window_days must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.soft_suppress_factor) {
            return Err(KeywordError::Config(format!(
                "soft_suppress_factor must be within [0, 1], got {}",
                self.soft_suppress_factor
            )));
        }
        if self.unmet_reasons.is_empty() {
            return Err(KeywordError::Config(
                "unmet_reasons must name at least one reason".into(),
            ));
        }
        Ok(())
    }

    /// Start of the signal lookback window ending at `now`.
    pub fn window_start(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, KeywordError> {
        days_before(now, self.window_days, "window_days")
    }

    /// `(prior_start, recent_start)`: the recent trend window is
    /// `[recent_start, now)` and the prior one ends where it begins.
    pub fn trend_bounds(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), KeywordError> {
        let recent_start = days_before(now, self.trend_window_days, "trend_window_days")?;
        let prior_start = days_before(recent_start, self.trend_window_days, "trend_window_days")?;
        Ok((prior_start, recent_start))
    }

    /// Row cap for loader queries.
    pub fn candidate_limit(&self) -> usize {
        self.max_terms.saturating_mul(self.candidate_multiplier)
    }

    pub fn log_summary(&self) {
        info!(
            max_terms = self.max_terms,
            quota_unmet = self.quotas.unmet,
            quota_refresh = self.quotas.refresh,
            quota_demand = self.quotas.demand,
            quota_explore = self.quotas.explore,
            window_days = self.window_days,
            candidate_limit = self.candidate_limit(),
            soft_suppress_days = self.soft_suppress_days,
            novelty_window_days = self.novelty_window_days,
            "Keyword selector config loaded"
        );
    }
}

fn days_before(
    at: DateTime<Utc>,
    days: i64,
    name: &str,
) -> Result<DateTime<Utc>, KeywordError> {
    Duration::try_days(days)
        .and_then(|span| at.checked_sub_signed(span))
        .ok_or_else(|| KeywordError::Config(format!("{name} of {days} days is out of range")))
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, KeywordError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| KeywordError::Config(format!("{key} has an invalid value: {raw:?}"))),
        Err(_) => Ok(default),
    }
}

fn parse_reasons(raw: &str) -> Result<Vec<UnmetReason>, KeywordError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            UnmetReason::parse(s)
                .ok_or_else(|| KeywordError::Config(format!("unknown unmet reason: {s}")))
        })
        .collect()
}
