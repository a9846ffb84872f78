use std::collections::BTreeMap;

use super::super::catalog::LevelRequirement;
use super::super::domain::{BaselineSnapshot, MetricAggregate, MetricType};
use super::{evaluate_metric, LevelEvaluation};

/// Evaluate every rule of `requirement` and count passes against the minimum.
pub fn evaluate_level(
    requirement: &LevelRequirement,
    baseline: Option<&BaselineSnapshot>,
    current: &BTreeMap<MetricType, MetricAggregate>,
) -> LevelEvaluation {
    let results: Vec<_> = requirement
        .rules
        .iter()
        .map(|rule| {
            let baseline_value = baseline.and_then(|snapshot| snapshot.value_for(rule.metric_type));
            let current_value = current.get(&rule.metric_type).map(|aggregate| aggregate.avg);
            evaluate_metric(rule, baseline_value, current_value)
        })
        .collect();

    let pass_count = results.iter().filter(|result| result.passed).count() as u32;

    LevelEvaluation {
        level: requirement.level,
        eligible: pass_count >= requirement.min_metrics_required,
        pass_count,
        min_metrics_required: requirement.min_metrics_required,
        results,
    }
}
