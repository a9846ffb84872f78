use rust_decimal::{Decimal, RoundingStrategy};

use super::super::catalog::LevelRule;
use super::{MetricEvaluation, MetricOutcome};

const IMPROVEMENT_DECIMALS: u32 = 2;

/// Direction-aware percent change, rounded to two places so that a value
/// sitting exactly on a threshold compares deterministically.
pub fn improvement_percent(rule: &LevelRule, baseline: Decimal, current: Decimal) -> Option<Decimal> {
    if baseline.is_zero() {
        return None;
    }
    let percent = rule
        .direction
        .improvement_ratio(baseline, current)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or_else(|| {
            // Saturate in the direction of the change.
            if rule.direction.improved(baseline, current) == baseline.is_sign_positive() {
                Decimal::MAX
            } else {
                Decimal::MIN
            }
        });
    let mut percent =
        percent.round_dp_with_strategy(IMPROVEMENT_DECIMALS, RoundingStrategy::MidpointAwayFromZero);
    // Fixed scale so reasons always print two places.
    percent.rescale(IMPROVEMENT_DECIMALS);
    Some(percent)
}

/// Decide whether a single rule passes for the given baseline and current values.
///
/// Checks run in priority order: absolute target, relative improvement against a
/// usable (non-zero) baseline, then maintenance inside the optimal range. A missing
/// current value always fails.
pub fn evaluate_metric(
    rule: &LevelRule,
    baseline: Option<Decimal>,
    current: Option<Decimal>,
) -> MetricEvaluation {
    let Some(current_value) = current else {
        return MetricEvaluation::new(rule, baseline, None, MetricOutcome::NoRecentData, None);
    };

    if let Some(threshold) = rule.absolute_threshold {
        if rule.direction.satisfies(current_value, threshold) {
            // Absolute passes never depend on the baseline.
            return MetricEvaluation::new(
                rule,
                None,
                current,
                MetricOutcome::AbsoluteTargetAchieved { threshold },
                None,
            );
        }
    }

    let usable_baseline = baseline.filter(|value| !value.is_zero());

    let mut improvement = None;
    if let (Some(baseline_value), Some(required)) = (usable_baseline, rule.improvement_threshold) {
        improvement = improvement_percent(rule, baseline_value, current_value);
        if let Some(achieved) = improvement {
            if achieved >= required {
                return MetricEvaluation::new(
                    rule,
                    baseline,
                    current,
                    MetricOutcome::ImprovementAchieved { achieved, required },
                    improvement,
                );
            }
        }
    }

    if rule.maintenance_allowed {
        if let (Some(range), Some(baseline_value)) = (&rule.optimal_range, baseline) {
            if range.contains(baseline_value) && range.contains(current_value) {
                return MetricEvaluation::new(
                    rule,
                    baseline,
                    current,
                    MetricOutcome::MaintainingHealthyRange,
                    improvement,
                );
            }
        }
    }

    let outcome = match (improvement, rule.improvement_threshold) {
        (Some(achieved), Some(required)) => {
            MetricOutcome::BelowImprovementThreshold { achieved, required }
        }
        _ if usable_baseline.is_none() && relies_on_baseline(rule) => {
            MetricOutcome::InsufficientBaseline
        }
        _ => MetricOutcome::TargetNotMet,
    };
    MetricEvaluation::new(rule, baseline, current, outcome, improvement)
}

fn relies_on_baseline(rule: &LevelRule) -> bool {
    rule.improvement_threshold.is_some() || rule.maintenance_allowed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::catalog::{Direction, OptimalRange};
    use crate::levels::domain::MetricType;

    fn steps_rule() -> LevelRule {
        LevelRule {
            metric_type: MetricType::Steps,
            improvement_threshold: Some(Decimal::from(10)),
            absolute_threshold: Some(Decimal::from(8_000)),
            maintenance_allowed: false,
            direction: Direction::HigherIsBetter,
            optimal_range: None,
            weight: Decimal::ONE,
        }
    }

    fn heart_rate_rule() -> LevelRule {
        LevelRule {
            metric_type: MetricType::RestingHeartRate,
            improvement_threshold: Some(Decimal::from(5)),
            absolute_threshold: None,
            maintenance_allowed: false,
            direction: Direction::LowerIsBetter,
            optimal_range: None,
            weight: Decimal::ONE,
        }
    }

    #[test]
    fn lower_is_better_improvement_is_direction_aware() {
        let rule = heart_rate_rule();
        let percent = improvement_percent(&rule, Decimal::from(70), Decimal::from(60));
        assert_eq!(percent, Some(Decimal::new(1429, 2)));
    }

    #[test]
    fn improvement_path_passes_below_absolute_target() {
        let rule = steps_rule();
        let result = evaluate_metric(&rule, Some(Decimal::from(6_000)), Some(Decimal::from(7_200)));

        assert!(result.passed);
        assert_eq!(result.improvement_percent, Some(Decimal::new(2000, 2)));
        assert!(matches!(
            result.outcome,
            MetricOutcome::ImprovementAchieved { .. }
        ));
    }

    #[test]
    fn resting_heart_rate_drop_passes_relative_threshold() {
        let rule = heart_rate_rule();
        let result = evaluate_metric(&rule, Some(Decimal::from(70)), Some(Decimal::from(66)));

        assert!(result.passed);
        assert_eq!(result.improvement_percent, Some(Decimal::new(571, 2)));
    }

    #[test]
    fn improvement_exactly_at_threshold_passes() {
        let rule = steps_rule();
        let result = evaluate_metric(&rule, Some(Decimal::from(6_000)), Some(Decimal::from(6_600)));
        assert!(result.passed);
        assert_eq!(result.improvement_percent, Some(Decimal::new(1000, 2)));

        let short = evaluate_metric(&rule, Some(Decimal::from(6_000)), Some(Decimal::from(6_599)));
        assert!(!short.passed);
        assert!(short.reason.contains("9.98"));
    }

    #[test]
    fn absolute_target_passes_without_baseline() {
        let rule = steps_rule();
        let result = evaluate_metric(&rule, None, Some(Decimal::from(8_500)));
        assert!(result.passed);
        assert_eq!(result.reason, "absolute target achieved");
        assert_eq!(result.improvement_percent, None);
    }

    #[test]
    fn zero_baseline_is_treated_as_missing() {
        let rule = steps_rule();
        let result = evaluate_metric(&rule, Some(Decimal::ZERO), Some(Decimal::from(5_000)));
        assert!(!result.passed);
        assert_eq!(result.outcome, MetricOutcome::InsufficientBaseline);
        assert_eq!(result.reason, "insufficient baseline data");
    }

    #[test]
    fn missing_current_value_is_a_hard_fail() {
        let mut rule = steps_rule();
        rule.absolute_threshold = Some(Decimal::ZERO);
        let result = evaluate_metric(&rule, Some(Decimal::from(6_000)), None);
        assert!(!result.passed);
        assert_eq!(result.reason, "no recent data");
    }

    #[test]
    fn maintenance_requires_both_values_in_range() {
        let rule = LevelRule {
            metric_type: MetricType::SleepDuration,
            improvement_threshold: Some(Decimal::from(10)),
            absolute_threshold: None,
            maintenance_allowed: true,
            direction: Direction::HigherIsBetter,
            optimal_range: Some(OptimalRange {
                min: Decimal::from(7),
                max: Decimal::from(9),
            }),
            weight: Decimal::ONE,
        };

        let steady = evaluate_metric(&rule, Some(Decimal::new(75, 1)), Some(Decimal::new(78, 1)));
        assert!(steady.passed);
        assert_eq!(steady.reason, "maintaining healthy range");

        let slipped = evaluate_metric(&rule, Some(Decimal::new(65, 1)), Some(Decimal::new(70, 1)));
        assert!(!slipped.passed);
        assert!(matches!(
            slipped.outcome,
            MetricOutcome::BelowImprovementThreshold { .. }
        ));
    }

    #[test]
    fn failure_without_baseline_explains_missing_data() {
        let rule = heart_rate_rule();
        let result = evaluate_metric(&rule, None, Some(Decimal::from(72)));
        assert!(!result.passed);
        assert_eq!(result.reason, "insufficient baseline data");
    }

    #[test]
    fn absolute_only_rule_reports_missed_target_without_baseline() {
        let rule = LevelRule {
            metric_type: MetricType::ActiveMinutes,
            improvement_threshold: None,
            absolute_threshold: Some(Decimal::from(30)),
            maintenance_allowed: false,
            direction: Direction::HigherIsBetter,
            optimal_range: None,
            weight: Decimal::ONE,
        };

        let result = evaluate_metric(&rule, None, Some(Decimal::from(20)));

        assert!(!result.passed);
        assert_eq!(result.outcome, MetricOutcome::TargetNotMet);
        assert_eq!(result.reason, "target not met");
    }

    #[test]
    fn extreme_change_saturates_instead_of_overflowing() {
        let rule = heart_rate_rule();

        let result = evaluate_metric(&rule, Some(Decimal::MAX), Some(Decimal::MIN));

        assert!(result.passed);
        assert_eq!(result.improvement_percent, Some(Decimal::MAX));

        let regressed = evaluate_metric(&rule, Some(Decimal::new(1, 28)), Some(Decimal::MAX));
        assert!(!regressed.passed);
        assert_eq!(regressed.improvement_percent, Some(Decimal::MIN));
        assert!(matches!(
            regressed.outcome,
            MetricOutcome::BelowImprovementThreshold { .. }
        ));
    }
}
