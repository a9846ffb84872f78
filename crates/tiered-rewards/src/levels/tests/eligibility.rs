use std::collections::BTreeMap;
use std::sync::Arc;

use super::common::*;
use crate::levels::baseline::{aggregate_by_metric, BaselineSnapshotBuilder, MeasurementWindow};
use crate::levels::catalog::{Direction, LevelRequirement, LevelRule, RuleCatalog};
use crate::levels::domain::{BaselineSnapshot, MetricAggregate, MetricType, RewardLevel};
use crate::levels::evaluation::{evaluate_level, EligibilityEngine, MetricOutcome};

fn split_windows(
    records: &[crate::levels::domain::BiometricRecord],
) -> (BaselineSnapshot, BTreeMap<MetricType, MetricAggregate>) {
    let baseline_window = MeasurementWindow::baseline(enrolled_at(), 14).expect("baseline window");
    let baseline = BaselineSnapshotBuilder::new(baseline_window)
        .build(&member_id("engine"), records, now())
        .expect("baseline snapshot");
    let window = MeasurementWindow::trailing(now(), 30).expect("evaluation window");
    let current = aggregate_by_metric(records.iter().filter(|r| window.contains(r.recorded_at)))
        .expect("current aggregates");
    (baseline, current)
}

fn engine() -> EligibilityEngine {
    EligibilityEngine::new(Arc::new(RuleCatalog::standard()))
}

fn improvement_rule(metric_type: MetricType) -> LevelRule {
    LevelRule {
        metric_type,
        improvement_threshold: Some(d(10)),
        absolute_threshold: None,
        maintenance_allowed: false,
        direction: Direction::HigherIsBetter,
        optimal_range: None,
        weight: dp(2, 1),
    }
}

#[test]
fn search_finds_level_two_for_improver() {
    let (baseline, current) = split_windows(&improver_readings("engine"));

    let outcome = engine().search(Some(&baseline), &current);

    assert_eq!(outcome.level, RewardLevel::Level2);
    assert!(outcome.eligible());
    let attempted: Vec<_> = outcome.attempts.iter().map(|a| a.level).collect();
    assert_eq!(attempted, vec![RewardLevel::Level3, RewardLevel::Level2]);
    let matched = outcome.matched.expect("level two matched");
    assert_eq!(matched.pass_count, 3);
}

#[test]
fn search_reaches_top_level_through_maintenance_alone() {
    let (baseline, current) = split_windows(&maintainer_readings("engine"));

    let outcome = engine().search(Some(&baseline), &current);

    assert_eq!(outcome.level, RewardLevel::Level3);
    assert_eq!(outcome.attempts.len(), 1);
    let results = &outcome.decisive().expect("decisive").results;
    assert!(results
        .iter()
        .any(|result| result.outcome == MetricOutcome::MaintainingHealthyRange));
    assert!(results
        .iter()
        .filter(|result| result.passed)
        .all(|result| result.improvement_percent.map_or(true, |p| p < d(10))));
}

#[test]
fn search_returns_lowest_level_when_nothing_qualifies() {
    let (baseline, _) = split_windows(&improver_readings("engine"));

    let outcome = engine().search(Some(&baseline), &BTreeMap::new());

    assert_eq!(outcome.level, RewardLevel::Level0);
    assert!(!outcome.eligible());
    assert_eq!(outcome.attempts.len(), 3);
    let decisive = outcome.decisive().expect("level one attempted");
    assert_eq!(decisive.level, RewardLevel::Level1);
    assert!(decisive
        .results
        .iter()
        .all(|result| result.reason == "no recent data"));
}

#[test]
fn two_of_five_passing_is_not_enough_for_three_required() {
    let requirement = LevelRequirement {
        level: RewardLevel::Level2,
        description: "three of five".to_string(),
        rebate_percentage: d(10),
        min_metrics_required: 3,
        rules: vec![
            improvement_rule(MetricType::Steps),
            improvement_rule(MetricType::ActiveMinutes),
            improvement_rule(MetricType::SleepDuration),
            improvement_rule(MetricType::HeartRateVariability),
            improvement_rule(MetricType::BloodGlucose),
        ],
    };
    let records = readings(
        "engine",
        &[
            (MetricType::Steps, d(6_000), d(7_000)),
            (MetricType::ActiveMinutes, d(20), d(30)),
            (MetricType::SleepDuration, d(7), d(7)),
            (MetricType::HeartRateVariability, d(50), d(51)),
            (MetricType::BloodGlucose, d(100), d(100)),
        ],
    );
    let (baseline, current) = split_windows(&records);
    assert!(baseline.is_complete());

    let evaluation = evaluate_level(&requirement, Some(&baseline), &current);

    assert_eq!(evaluation.pass_count, 2);
    assert!(!evaluation.eligible);
    assert_eq!(evaluation.results.len(), 5);
}

#[test]
fn pass_count_equal_to_minimum_is_eligible() {
    let mut requirement = LevelRequirement {
        level: RewardLevel::Level1,
        description: "boundary".to_string(),
        rebate_percentage: d(5),
        min_metrics_required: 2,
        rules: vec![
            improvement_rule(MetricType::Steps),
            improvement_rule(MetricType::ActiveMinutes),
            improvement_rule(MetricType::SleepDuration),
        ],
    };
    let records = readings(
        "engine",
        &[
            (MetricType::Steps, d(6_000), d(7_000)),
            (MetricType::ActiveMinutes, d(20), d(30)),
            (MetricType::SleepDuration, d(7), d(7)),
        ],
    );
    let (baseline, current) = split_windows(&records);

    let evaluation = evaluate_level(&requirement, Some(&baseline), &current);
    assert_eq!(evaluation.pass_count, 2);
    assert!(evaluation.eligible);

    requirement.min_metrics_required = 3;
    let evaluation = evaluate_level(&requirement, Some(&baseline), &current);
    assert!(!evaluation.eligible);
}

#[test]
fn weight_never_changes_the_verdict() {
    let (baseline, current) = split_windows(&improver_readings("engine"));
    let standard = RuleCatalog::standard();
    let mut reweighted = standard.requirements().to_vec();
    for requirement in &mut reweighted {
        for rule in &mut requirement.rules {
            rule.weight = dp(1, 2);
        }
    }
    let reweighted = RuleCatalog::new(reweighted).expect("valid catalog");

    let original = engine().search(Some(&baseline), &current);
    let adjusted = EligibilityEngine::new(Arc::new(reweighted)).search(Some(&baseline), &current);

    assert_eq!(original.level, adjusted.level);
    assert_eq!(
        original.matched.map(|m| m.pass_count),
        adjusted.matched.map(|m| m.pass_count)
    );
}
