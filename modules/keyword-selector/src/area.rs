use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use keyword_common::CoverageAreaConfig;

use crate::traits::SignalReader;

/// Canonical collection key and revisit interval for an area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedArea {
    pub collection_coverage_key: String,
    pub safe_interval_days: i64,
}

/// Prefer the configured key, then the configured name, then the raw input.
/// Missing configuration is never an error.
pub fn resolve_area(
    raw_name: &str,
    config: Option<&CoverageAreaConfig>,
    default_interval_days: i64,
) -> ResolvedArea {
    let configured_key = config.and_then(|c| c.coverage_key.as_deref());
    let configured_name = config.and_then(|c| c.name.as_deref());
    let key = [configured_key, configured_name, Some(raw_name)]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|candidate| !candidate.is_empty())
        .unwrap_or_default()
        .to_lowercase();

    let safe_interval_days = config
        .and_then(|c| c.safe_interval_days)
        .filter(|days| *days > 0)
        .unwrap_or(default_interval_days);

    ResolvedArea {
        collection_coverage_key: key,
        safe_interval_days,
    }
}

pub async fn resolve_coverage_area(
    reader: &dyn SignalReader,
    raw_name: &str,
    default_interval_days: i64,
) -> Result<ResolvedArea> {
    let config = reader
        .resolve_coverage_area(raw_name)
        .await
        .context("resolving coverage area")?;
    let resolved = resolve_area(raw_name, config.as_ref(), default_interval_days);
    debug!(
        area = raw_name,
        coverage_key = resolved.collection_coverage_key.as_str(),
        configured = config.is_some(),
        safe_interval_days = resolved.safe_interval_days,
        "Resolved coverage area"
    );
    Ok(resolved)
}
