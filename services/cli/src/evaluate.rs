use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;
use tiered_rewards::config::AppConfig;
use tiered_rewards::error::AppError;
use tiered_rewards::levels::{
    AppliedEvaluation, BaselineSnapshot, BiometricCsvImporter, InMemoryLevelStore,
    LevelEvaluationReport, LevelProgress, MemberId, MemberProfile, MetricType, RewardLevel,
    RuleCatalog,
};
use tracing::{info, warn};

use crate::infra::{build_service, cli_organization, load_catalog, print_json};

#[derive(Args, Debug)]
pub(crate) struct EvaluateArgs {
    /// CSV export with member_id,metric_type,value,unit,source,recorded_at,verified
    #[arg(long)]
    pub(crate) records: PathBuf,
    /// Member to evaluate
    #[arg(long)]
    pub(crate) member: String,
    /// Enrollment date (YYYY-MM-DD); the baseline window starts here
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) enrolled: DateTime<Utc>,
    /// Rule catalog JSON file (defaults to APP_RULE_CATALOG or the standard table)
    #[arg(long)]
    pub(crate) catalog: Option<PathBuf>,
    /// Member's current level number
    #[arg(long, value_parser = crate::infra::parse_level, default_value = "0")]
    pub(crate) level: RewardLevel,
    /// Evaluation date (YYYY-MM-DD). Defaults to now.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<DateTime<Utc>>,
    /// Ignore records not verified by a device
    #[arg(long)]
    pub(crate) verified_only: bool,
    /// Commit the resulting promotion instead of only reporting it
    #[arg(long)]
    pub(crate) apply: bool,
}

#[derive(Args, Debug)]
pub(crate) struct CatalogArgs {
    /// Rule catalog JSON file to validate
    #[arg(long)]
    pub(crate) path: PathBuf,
}

#[derive(Serialize)]
#[serde(untagged)]
enum EvaluationOutput {
    Report(LevelEvaluationReport),
    Applied(AppliedEvaluation),
}

#[derive(Serialize)]
struct EvaluateOutput {
    baseline: BaselineSnapshot,
    evaluation: EvaluationOutput,
    progress: LevelProgress,
}

#[derive(Serialize)]
struct LevelSummary {
    level: RewardLevel,
    description: String,
    rebate_percentage: Decimal,
    min_metrics_required: u32,
    metrics: Vec<MetricType>,
}

pub(crate) fn run_evaluate(args: EvaluateArgs, config: &AppConfig) -> Result<(), AppError> {
    let catalog = load_catalog(config, args.catalog.as_deref())?;
    let member_id = MemberId(args.member.clone());

    let records: Vec<_> = BiometricCsvImporter::from_path(&args.records)?
        .into_iter()
        .filter(|record| record.member_id == member_id)
        .collect();
    if records.is_empty() {
        warn!(%member_id, path = %args.records.display(), "no records found for member");
    }
    info!(%member_id, records = records.len(), "records loaded");

    let store = Arc::new(InMemoryLevelStore::new());
    store.enroll(MemberProfile {
        member_id: member_id.clone(),
        current_level: args.level,
        enrolled_at: args.enrolled,
        organization: cli_organization(args.verified_only),
    })?;
    store.add_records(records)?;

    let service = build_service(store, catalog, config.engine.clone(), args.today);
    let baseline = service.create_baseline_snapshot(&member_id)?;
    let evaluation = if args.apply {
        EvaluationOutput::Applied(service.apply_member_evaluation(&member_id)?)
    } else {
        EvaluationOutput::Report(service.evaluate_member_level(&member_id)?)
    };
    let progress = service.get_level_progress(&member_id)?;

    print_json(&EvaluateOutput {
        baseline,
        evaluation,
        progress,
    })
}

pub(crate) fn run_catalog(args: CatalogArgs) -> Result<(), AppError> {
    let payload = std::fs::read_to_string(&args.path)?;
    let catalog = RuleCatalog::from_json(&payload)?;
    print_json(&summarize(&catalog))
}

fn summarize(catalog: &RuleCatalog) -> Vec<LevelSummary> {
    catalog
        .requirements()
        .iter()
        .map(|requirement| LevelSummary {
            level: requirement.level,
            description: requirement.description.clone(),
            rebate_percentage: requirement.rebate_percentage,
            min_metrics_required: requirement.min_metrics_required,
            metrics: requirement
                .rules
                .iter()
                .map(|rule| rule.metric_type)
                .collect(),
        })
        .collect()
}
