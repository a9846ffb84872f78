use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::{BaselineSnapshot, MemberId, MetricAggregate, MetricType, RewardLevel};
use super::evaluation::{EligibilityEngine, MetricEvaluation};

/// Read-only progress toward the level above the member's current one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub member_id: MemberId,
    pub current_level: RewardLevel,
    pub next_level: Option<RewardLevel>,
    pub progress_percent: u8,
    pub pass_count: u32,
    pub min_metrics_required: u32,
    pub current_rebate_percentage: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_rebate_percentage: Option<Decimal>,
    pub per_metric_results: Vec<MetricEvaluation>,
}

/// `min(100, round(pass_count / min_required * 100))`, rounding halves up.
pub fn progress_percent(pass_count: u32, min_metrics_required: u32) -> u8 {
    if min_metrics_required == 0 {
        return 100;
    }
    let pass = u64::from(pass_count);
    let required = u64::from(min_metrics_required);
    let rounded = (pass * 200 + required) / (2 * required);
    rounded.min(100) as u8
}

pub struct ProgressCalculator<'a> {
    engine: &'a EligibilityEngine,
}

impl<'a> ProgressCalculator<'a> {
    pub fn new(engine: &'a EligibilityEngine) -> Self {
        Self { engine }
    }

    pub fn calculate(
        &self,
        member_id: &MemberId,
        current_level: RewardLevel,
        baseline: Option<&BaselineSnapshot>,
        current: &BTreeMap<MetricType, MetricAggregate>,
    ) -> LevelProgress {
        let catalog = self.engine.catalog();
        let current_rebate_percentage = catalog.rebate_for(current_level);

        let evaluation = current_level
            .next()
            .and_then(|next| self.engine.evaluate(next, baseline, current));

        match evaluation {
            Some(evaluation) => LevelProgress {
                member_id: member_id.clone(),
                current_level,
                next_level: Some(evaluation.level),
                progress_percent: progress_percent(
                    evaluation.pass_count,
                    evaluation.min_metrics_required,
                ),
                pass_count: evaluation.pass_count,
                min_metrics_required: evaluation.min_metrics_required,
                current_rebate_percentage,
                next_rebate_percentage: Some(catalog.rebate_for(evaluation.level)),
                per_metric_results: evaluation.results,
            },
            None => LevelProgress {
                member_id: member_id.clone(),
                current_level,
                next_level: None,
                progress_percent: 100,
                pass_count: 0,
                min_metrics_required: 0,
                current_rebate_percentage,
                next_rebate_percentage: None,
                per_metric_results: Vec::new(),
            },
        }
    }
}
