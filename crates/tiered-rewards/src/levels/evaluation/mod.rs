mod eligibility;
mod metric;
mod search;

pub use eligibility::evaluate_level;
pub use metric::{evaluate_metric, improvement_percent};
pub use search::{search_highest_level, LevelSearchOutcome};

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::catalog::{LevelRule, RuleCatalog};
use super::domain::{BaselineSnapshot, MetricAggregate, MetricType, RewardLevel};

/// Why a rule passed or failed, kept structured for audit trails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricOutcome {
    AbsoluteTargetAchieved { threshold: Decimal },
    ImprovementAchieved { achieved: Decimal, required: Decimal },
    MaintainingHealthyRange,
    NoRecentData,
    InsufficientBaseline,
    BelowImprovementThreshold { achieved: Decimal, required: Decimal },
    TargetNotMet,
}

impl MetricOutcome {
    pub fn is_pass(&self) -> bool {
        matches!(
            self,
            MetricOutcome::AbsoluteTargetAchieved { .. }
                | MetricOutcome::ImprovementAchieved { .. }
                | MetricOutcome::MaintainingHealthyRange
        )
    }

    pub fn summary(&self) -> String {
        match self {
            MetricOutcome::AbsoluteTargetAchieved { .. } => "absolute target achieved".to_string(),
            MetricOutcome::ImprovementAchieved { achieved, required } => {
                format!("improved {achieved}% (required {required}%)")
            }
            MetricOutcome::MaintainingHealthyRange => "maintaining healthy range".to_string(),
            MetricOutcome::NoRecentData => "no recent data".to_string(),
            MetricOutcome::InsufficientBaseline => "insufficient baseline data".to_string(),
            MetricOutcome::BelowImprovementThreshold { achieved, required } => {
                format!("improved {achieved}%, below required {required}%")
            }
            MetricOutcome::TargetNotMet => "target not met".to_string(),
        }
    }
}

/// Per-rule result, explainable without re-running the evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricEvaluation {
    pub metric_type: MetricType,
    pub passed: bool,
    pub outcome: MetricOutcome,
    pub reason: String,
    pub baseline_value: Option<Decimal>,
    pub current_value: Option<Decimal>,
    pub improvement_percent: Option<Decimal>,
    pub weight: Decimal,
}

impl MetricEvaluation {
    fn new(
        rule: &LevelRule,
        baseline_value: Option<Decimal>,
        current_value: Option<Decimal>,
        outcome: MetricOutcome,
        improvement_percent: Option<Decimal>,
    ) -> Self {
        Self {
            metric_type: rule.metric_type,
            passed: outcome.is_pass(),
            reason: outcome.summary(),
            outcome,
            baseline_value,
            current_value,
            improvement_percent,
            weight: rule.weight,
        }
    }
}

/// Eligibility verdict for a single level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelEvaluation {
    pub level: RewardLevel,
    pub eligible: bool,
    pub pass_count: u32,
    pub min_metrics_required: u32,
    pub results: Vec<MetricEvaluation>,
}

/// Stateless evaluator bound to one organization's catalog.
#[derive(Debug, Clone)]
pub struct EligibilityEngine {
    catalog: Arc<RuleCatalog>,
}

impl EligibilityEngine {
    pub fn new(catalog: Arc<RuleCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    pub fn evaluate(
        &self,
        level: RewardLevel,
        baseline: Option<&BaselineSnapshot>,
        current: &BTreeMap<MetricType, MetricAggregate>,
    ) -> Option<LevelEvaluation> {
        self.catalog
            .requirement(level)
            .map(|requirement| evaluate_level(requirement, baseline, current))
    }

    pub fn search(
        &self,
        baseline: Option<&BaselineSnapshot>,
        current: &BTreeMap<MetricType, MetricAggregate>,
    ) -> LevelSearchOutcome {
        search_highest_level(&self.catalog, baseline, current)
    }
}
