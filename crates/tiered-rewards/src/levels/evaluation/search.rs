use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::super::catalog::RuleCatalog;
use super::super::domain::{BaselineSnapshot, MetricAggregate, MetricType, RewardLevel};
use super::{evaluate_level, LevelEvaluation};

/// Result of the top-down level search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSearchOutcome {
    /// Highest eligible level, or the lowest level when nothing matched.
    pub level: RewardLevel,
    pub matched: Option<LevelEvaluation>,
    /// Every level checked, highest first, ending at the match.
    pub attempts: Vec<LevelEvaluation>,
}

impl LevelSearchOutcome {
    pub fn eligible(&self) -> bool {
        self.matched.is_some()
    }

    /// Evaluation worth showing: the matched level, else the last one tried.
    pub fn decisive(&self) -> Option<&LevelEvaluation> {
        self.matched.as_ref().or_else(|| self.attempts.last())
    }
}

/// Greedy highest-match search. Each level is checked against its own rule set,
/// so a member can qualify for a high level without passing the ones below it.
pub fn search_highest_level(
    catalog: &RuleCatalog,
    baseline: Option<&BaselineSnapshot>,
    current: &BTreeMap<MetricType, MetricAggregate>,
) -> LevelSearchOutcome {
    let mut attempts = Vec::new();

    for requirement in catalog.requirements_descending() {
        let evaluation = evaluate_level(requirement, baseline, current);
        let eligible = evaluation.eligible;
        attempts.push(evaluation);
        if eligible {
            return LevelSearchOutcome {
                level: requirement.level,
                matched: attempts.last().cloned(),
                attempts,
            };
        }
    }

    LevelSearchOutcome {
        level: RewardLevel::lowest(),
        matched: None,
        attempts,
    }
}
