use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::{MetricType, OrganizationId, RewardLevel};

/// Which way a metric should move for the member to be doing better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

impl Direction {
    pub fn satisfies(self, value: Decimal, threshold: Decimal) -> bool {
        match self {
            Direction::HigherIsBetter => value >= threshold,
            Direction::LowerIsBetter => value <= threshold,
        }
    }

    /// Signed change relative to `baseline`, positive when the member improved.
    /// Callers guarantee a non-zero baseline. `None` when the change does not fit
    /// in a `Decimal`.
    pub(crate) fn improvement_ratio(self, baseline: Decimal, current: Decimal) -> Option<Decimal> {
        let delta = match self {
            Direction::HigherIsBetter => current.checked_sub(baseline),
            Direction::LowerIsBetter => baseline.checked_sub(current),
        }?;
        delta.checked_div(baseline)
    }

    pub(crate) fn improved(self, baseline: Decimal, current: Decimal) -> bool {
        match self {
            Direction::HigherIsBetter => current > baseline,
            Direction::LowerIsBetter => current < baseline,
        }
    }
}

/// Inclusive healthy band used by maintenance passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimalRange {
    pub min: Decimal,
    pub max: Decimal,
}

impl OptimalRange {
    pub fn contains(&self, value: Decimal) -> bool {
        value >= self.min && value <= self.max
    }
}

fn default_weight() -> Decimal {
    Decimal::ONE
}

/// A single metric requirement inside a level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRule {
    pub metric_type: MetricType,
    /// Minimum direction-aware percent change from baseline.
    #[serde(default)]
    pub improvement_threshold: Option<Decimal>,
    #[serde(default)]
    pub absolute_threshold: Option<Decimal>,
    #[serde(default)]
    pub maintenance_allowed: bool,
    pub direction: Direction,
    #[serde(default)]
    pub optimal_range: Option<OptimalRange>,
    /// Informational only; never part of pass/fail.
    #[serde(default = "default_weight")]
    pub weight: Decimal,
}

/// Everything a member must satisfy to hold a level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRequirement {
    pub level: RewardLevel,
    pub description: String,
    pub rebate_percentage: Decimal,
    pub min_metrics_required: u32,
    pub rules: Vec<LevelRule>,
}

/// Validation failures raised while loading a rule catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog is missing a requirement for {0}")]
    MissingLevel(RewardLevel),
    #[error("catalog defines {0} more than once")]
    DuplicateLevel(RewardLevel),
    #[error("{0} must not carry metric rules")]
    BaseLevelHasRules(RewardLevel),
    #[error("{level} requires {required} metrics but defines {available} rules")]
    UnsatisfiableMinimum {
        level: RewardLevel,
        required: u32,
        available: usize,
    },
    #[error("{level} lists {metric:?} more than once")]
    DuplicateMetric {
        level: RewardLevel,
        metric: MetricType,
    },
    #[error("{level} {metric:?}: {problem}")]
    InvalidRule {
        level: RewardLevel,
        metric: MetricType,
        problem: &'static str,
    },
    #[error("{level} rebate percentage {value} is outside 0..=100")]
    InvalidRebate { level: RewardLevel, value: Decimal },
    #[error("{level} rebate percentage is lower than the level beneath it")]
    DecreasingRebate { level: RewardLevel },
    #[error("catalog could not be parsed: {0}")]
    Parse(String),
}

/// Immutable, validated table of level requirements for one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RuleCatalog {
    requirements: Vec<LevelRequirement>,
}

impl RuleCatalog {
    pub fn new(mut requirements: Vec<LevelRequirement>) -> Result<Self, CatalogError> {
        requirements.sort_by_key(|requirement| requirement.level);
        validate(&requirements)?;
        Ok(Self { requirements })
    }

    pub fn standard() -> Self {
        Self {
            requirements: standard_level_requirements(),
        }
    }

    pub fn from_json(payload: &str) -> Result<Self, CatalogError> {
        let requirements: Vec<LevelRequirement> =
            serde_json::from_str(payload).map_err(|err| CatalogError::Parse(err.to_string()))?;
        Self::new(requirements)
    }

    pub fn requirement(&self, level: RewardLevel) -> Option<&LevelRequirement> {
        self.requirements
            .iter()
            .find(|requirement| requirement.level == level)
    }

    /// Rule-bearing requirements from the highest level down.
    pub fn requirements_descending(&self) -> impl Iterator<Item = &LevelRequirement> {
        self.requirements
            .iter()
            .rev()
            .filter(|requirement| requirement.level != RewardLevel::lowest())
    }

    pub fn requirements(&self) -> &[LevelRequirement] {
        &self.requirements
    }

    pub fn rebate_for(&self, level: RewardLevel) -> Decimal {
        self.requirement(level)
            .map(|requirement| requirement.rebate_percentage)
            .unwrap_or(Decimal::ZERO)
    }
}

impl<'de> Deserialize<'de> for RuleCatalog {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let requirements = Vec::<LevelRequirement>::deserialize(deserializer)?;
        RuleCatalog::new(requirements).map_err(serde::de::Error::custom)
    }
}

fn validate(requirements: &[LevelRequirement]) -> Result<(), CatalogError> {
    let mut seen = BTreeSet::new();
    for requirement in requirements {
        if !seen.insert(requirement.level) {
            return Err(CatalogError::DuplicateLevel(requirement.level));
        }
    }
    for level in RewardLevel::ordered() {
        if !seen.contains(&level) {
            return Err(CatalogError::MissingLevel(level));
        }
    }

    let hundred = Decimal::from(100);
    let mut previous_rebate = Decimal::ZERO;
    for requirement in requirements {
        let level = requirement.level;
        if requirement.rebate_percentage < Decimal::ZERO || requirement.rebate_percentage > hundred
        {
            return Err(CatalogError::InvalidRebate {
                level,
                value: requirement.rebate_percentage,
            });
        }
        if requirement.rebate_percentage < previous_rebate {
            return Err(CatalogError::DecreasingRebate { level });
        }
        previous_rebate = requirement.rebate_percentage;

        if level == RewardLevel::lowest() {
            if !requirement.rules.is_empty() || requirement.min_metrics_required != 0 {
                return Err(CatalogError::BaseLevelHasRules(level));
            }
            continue;
        }

        let available = requirement.rules.len();
        if requirement.min_metrics_required == 0
            || requirement.min_metrics_required as usize > available
        {
            return Err(CatalogError::UnsatisfiableMinimum {
                level,
                required: requirement.min_metrics_required,
                available,
            });
        }

        let mut metrics = BTreeSet::new();
        for rule in &requirement.rules {
            if !metrics.insert(rule.metric_type) {
                return Err(CatalogError::DuplicateMetric {
                    level,
                    metric: rule.metric_type,
                });
            }
            validate_rule(level, rule)?;
        }
    }

    Ok(())
}

fn validate_rule(level: RewardLevel, rule: &LevelRule) -> Result<(), CatalogError> {
    let invalid = |problem| CatalogError::InvalidRule {
        level,
        metric: rule.metric_type,
        problem,
    };

    if matches!(rule.improvement_threshold, Some(threshold) if threshold <= Decimal::ZERO) {
        return Err(invalid("improvement threshold must be positive"));
    }
    if matches!(rule.absolute_threshold, Some(threshold) if threshold < Decimal::ZERO) {
        return Err(invalid("absolute threshold must not be negative"));
    }
    if rule.weight <= Decimal::ZERO || rule.weight > Decimal::ONE {
        return Err(invalid("weight must be within (0, 1]"));
    }
    if let Some(range) = &rule.optimal_range {
        if range.min > range.max {
            return Err(invalid("optimal range min exceeds max"));
        }
    }
    if rule.maintenance_allowed && rule.optimal_range.is_none() {
        return Err(invalid("maintenance requires an optimal range"));
    }
    if rule.improvement_threshold.is_none()
        && rule.absolute_threshold.is_none()
        && !rule.maintenance_allowed
    {
        return Err(invalid("rule has no way to pass"));
    }

    Ok(())
}

/// Per-organization catalogs with an optional program-wide fallback.
#[derive(Debug, Clone, Default)]
pub struct CatalogRegistry {
    catalogs: HashMap<OrganizationId, Arc<RuleCatalog>>,
    fallback: Option<Arc<RuleCatalog>>,
}

impl CatalogRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(catalog: RuleCatalog) -> Self {
        Self {
            catalogs: HashMap::new(),
            fallback: Some(Arc::new(catalog)),
        }
    }

    pub fn insert(&mut self, organization: OrganizationId, catalog: RuleCatalog) {
        self.catalogs.insert(organization, Arc::new(catalog));
    }

    pub fn catalog_for(&self, organization: &OrganizationId) -> Option<Arc<RuleCatalog>> {
        self.catalogs
            .get(organization)
            .cloned()
            .or_else(|| self.fallback.clone())
    }
}

fn percent(value: i64) -> Decimal {
    Decimal::from(value)
}

fn standard_level_requirements() -> Vec<LevelRequirement> {
    vec![
        LevelRequirement {
            level: RewardLevel::Level0,
            description: "Enrolled; baseline collection in progress".to_string(),
            rebate_percentage: Decimal::ZERO,
            min_metrics_required: 0,
            rules: Vec::new(),
        },
        LevelRequirement {
            level: RewardLevel::Level1,
            description: "Baseline captured and active participation".to_string(),
            rebate_percentage: percent(5),
            min_metrics_required: 2,
            rules: vec![
                LevelRule {
                    metric_type: MetricType::Steps,
                    improvement_threshold: Some(percent(5)),
                    absolute_threshold: Some(Decimal::from(7_000)),
                    maintenance_allowed: false,
                    direction: Direction::HigherIsBetter,
                    optimal_range: None,
                    weight: Decimal::new(4, 1),
                },
                LevelRule {
                    metric_type: MetricType::SleepDuration,
                    improvement_threshold: Some(percent(5)),
                    absolute_threshold: None,
                    maintenance_allowed: true,
                    direction: Direction::HigherIsBetter,
                    optimal_range: Some(OptimalRange {
                        min: Decimal::from(7),
                        max: Decimal::from(9),
                    }),
                    weight: Decimal::new(3, 1),
                },
                LevelRule {
                    metric_type: MetricType::RestingHeartRate,
                    improvement_threshold: Some(percent(3)),
                    absolute_threshold: Some(Decimal::from(70)),
                    maintenance_allowed: false,
                    direction: Direction::LowerIsBetter,
                    optimal_range: None,
                    weight: Decimal::new(3, 1),
                },
            ],
        },
        LevelRequirement {
            level: RewardLevel::Level2,
            description: "Measurable improvement across core metrics".to_string(),
            rebate_percentage: percent(10),
            min_metrics_required: 3,
            rules: vec![
                LevelRule {
                    metric_type: MetricType::Steps,
                    improvement_threshold: Some(percent(10)),
                    absolute_threshold: Some(Decimal::from(8_000)),
                    maintenance_allowed: false,
                    direction: Direction::HigherIsBetter,
                    optimal_range: None,
                    weight: Decimal::new(25, 2),
                },
                LevelRule {
                    metric_type: MetricType::RestingHeartRate,
                    improvement_threshold: Some(percent(5)),
                    absolute_threshold: Some(Decimal::from(65)),
                    maintenance_allowed: false,
                    direction: Direction::LowerIsBetter,
                    optimal_range: None,
                    weight: Decimal::new(25, 2),
                },
                LevelRule {
                    metric_type: MetricType::SleepDuration,
                    improvement_threshold: Some(percent(10)),
                    absolute_threshold: None,
                    maintenance_allowed: true,
                    direction: Direction::HigherIsBetter,
                    optimal_range: Some(OptimalRange {
                        min: Decimal::from(7),
                        max: Decimal::from(9),
                    }),
                    weight: Decimal::new(2, 1),
                },
                LevelRule {
                    metric_type: MetricType::Weight,
                    improvement_threshold: Some(percent(3)),
                    absolute_threshold: None,
                    maintenance_allowed: false,
                    direction: Direction::LowerIsBetter,
                    optimal_range: None,
                    weight: Decimal::new(15, 2),
                },
                LevelRule {
                    metric_type: MetricType::ActiveMinutes,
                    improvement_threshold: Some(percent(15)),
                    absolute_threshold: Some(Decimal::from(30)),
                    maintenance_allowed: false,
                    direction: Direction::HigherIsBetter,
                    optimal_range: None,
                    weight: Decimal::new(15, 2),
                },
            ],
        },
        LevelRequirement {
            level: RewardLevel::Level3,
            description: "Sustained excellence or healthy-range maintenance".to_string(),
            rebate_percentage: percent(15),
            min_metrics_required: 3,
            rules: vec![
                LevelRule {
                    metric_type: MetricType::Steps,
                    improvement_threshold: Some(percent(20)),
                    absolute_threshold: Some(Decimal::from(10_000)),
                    maintenance_allowed: false,
                    direction: Direction::HigherIsBetter,
                    optimal_range: None,
                    weight: Decimal::new(25, 2),
                },
                LevelRule {
                    metric_type: MetricType::RestingHeartRate,
                    improvement_threshold: Some(percent(10)),
                    absolute_threshold: Some(Decimal::from(60)),
                    maintenance_allowed: true,
                    direction: Direction::LowerIsBetter,
                    optimal_range: Some(OptimalRange {
                        min: Decimal::from(50),
                        max: Decimal::from(65),
                    }),
                    weight: Decimal::new(25, 2),
                },
                LevelRule {
                    metric_type: MetricType::SleepDuration,
                    improvement_threshold: None,
                    absolute_threshold: None,
                    maintenance_allowed: true,
                    direction: Direction::HigherIsBetter,
                    optimal_range: Some(OptimalRange {
                        min: Decimal::new(75, 1),
                        max: Decimal::from(9),
                    }),
                    weight: Decimal::new(2, 1),
                },
                LevelRule {
                    metric_type: MetricType::Weight,
                    improvement_threshold: Some(percent(5)),
                    absolute_threshold: None,
                    maintenance_allowed: false,
                    direction: Direction::LowerIsBetter,
                    optimal_range: None,
                    weight: Decimal::new(15, 2),
                },
                LevelRule {
                    metric_type: MetricType::HeartRateVariability,
                    improvement_threshold: Some(percent(10)),
                    absolute_threshold: Some(Decimal::from(60)),
                    maintenance_allowed: false,
                    direction: Direction::HigherIsBetter,
                    optimal_range: None,
                    weight: Decimal::new(15, 2),
                },
            ],
        },
    ]
}
