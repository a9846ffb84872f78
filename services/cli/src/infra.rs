use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use tiered_rewards::config::{AppConfig, EngineSettings};
use tiered_rewards::error::AppError;
use tiered_rewards::levels::{
    CatalogRegistry, FixedClock, InMemoryLevelStore, LevelService, OrganizationConfig,
    OrganizationId, RewardLevel, RuleCatalog,
};

/// Organization every CLI member is enrolled under.
pub(crate) fn cli_organization(verified_only: bool) -> OrganizationConfig {
    OrganizationConfig {
        organization_id: OrganizationId("cli".to_string()),
        baseline_period_days: None,
        evaluation_period_days: None,
        verified_only,
    }
}

/// An explicit catalog file wins over `APP_RULE_CATALOG`, which wins over the standard table.
pub(crate) fn load_catalog(
    config: &AppConfig,
    override_path: Option<&Path>,
) -> Result<RuleCatalog, AppError> {
    match override_path {
        Some(path) => {
            let payload = std::fs::read_to_string(path)?;
            Ok(RuleCatalog::from_json(&payload)?)
        }
        None => config.rule_catalog(),
    }
}

pub(crate) fn build_service(
    store: Arc<InMemoryLevelStore>,
    catalog: RuleCatalog,
    settings: EngineSettings,
    now: Option<DateTime<Utc>>,
) -> LevelService<InMemoryLevelStore> {
    let service = LevelService::new(store, CatalogRegistry::with_fallback(catalog), settings);
    match now {
        Some(now) => service.with_clock(Arc::new(FixedClock(now))),
        None => service,
    }
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::Input(format!("could not render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}

/// Dates are read as midnight UTC.
pub(crate) fn parse_date(raw: &str) -> Result<DateTime<Utc>, String> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))?;
    date.and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| format!("'{raw}' has no midnight"))
}

pub(crate) fn parse_level(raw: &str) -> Result<RewardLevel, String> {
    let ordinal = raw
        .trim()
        .parse::<u8>()
        .map_err(|err| format!("failed to parse '{raw}' as a level number ({err})"))?;
    RewardLevel::from_ordinal(ordinal).ok_or_else(|| format!("level {ordinal} does not exist"))
}
