use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::{validate_period_days, ConfigError};

use super::evaluation::MetricEvaluation;

/// Identifier wrapper for enrolled members.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberId(pub String);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for the sponsoring organization of a reward program.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrganizationId(pub String);

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kinds of biometric measurement collected from devices and manual entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricType {
    Steps,
    RestingHeartRate,
    SleepDuration,
    Weight,
    ActiveMinutes,
    HeartRateVariability,
    BloodPressureSystolic,
    BloodGlucose,
}

impl MetricType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Steps => "steps",
            Self::RestingHeartRate => "resting heart rate",
            Self::SleepDuration => "sleep duration",
            Self::Weight => "weight",
            Self::ActiveMinutes => "active minutes",
            Self::HeartRateVariability => "heart rate variability",
            Self::BloodPressureSystolic => "systolic blood pressure",
            Self::BloodGlucose => "blood glucose",
        }
    }
}

/// A single measurement. Owned by ingestion; never mutated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiometricRecord {
    pub member_id: MemberId,
    pub metric_type: MetricType,
    pub value: Decimal,
    pub unit: String,
    pub source: String,
    pub recorded_at: DateTime<Utc>,
    pub verified: bool,
}

/// Summary statistics for one metric type over a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricAggregate {
    pub avg: Decimal,
    pub min: Decimal,
    pub max: Decimal,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BaselineStatus {
    Pending,
    Insufficient,
    Complete,
}

impl BaselineStatus {
    pub const fn label(self) -> &'static str {
        match self {
            BaselineStatus::Pending => "pending",
            BaselineStatus::Insufficient => "insufficient",
            BaselineStatus::Complete => "complete",
        }
    }
}

/// Aggregated starting point for a member, captured once per baseline window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineSnapshot {
    pub member_id: MemberId,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub status: BaselineStatus,
    pub metrics: BTreeMap<MetricType, MetricAggregate>,
    pub created_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl BaselineSnapshot {
    pub fn is_complete(&self) -> bool {
        self.status == BaselineStatus::Complete
    }

    /// Baseline value used for comparisons: the window average.
    pub fn value_for(&self, metric: MetricType) -> Option<Decimal> {
        self.metrics.get(&metric).map(|aggregate| aggregate.avg)
    }

    pub fn covers_period(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.period_start == start && self.period_end == end
    }
}

/// Ordinal reward tier. Serialized as its ordinal.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum RewardLevel {
    #[default]
    Level0,
    Level1,
    Level2,
    Level3,
}

impl RewardLevel {
    pub const fn ordered() -> [Self; 4] {
        [Self::Level0, Self::Level1, Self::Level2, Self::Level3]
    }

    pub const fn ordinal(self) -> u8 {
        match self {
            Self::Level0 => 0,
            Self::Level1 => 1,
            Self::Level2 => 2,
            Self::Level3 => 3,
        }
    }

    pub const fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            0 => Some(Self::Level0),
            1 => Some(Self::Level1),
            2 => Some(Self::Level2),
            3 => Some(Self::Level3),
            _ => None,
        }
    }

    pub const fn lowest() -> Self {
        Self::Level0
    }

    pub const fn next(self) -> Option<Self> {
        Self::from_ordinal(self.ordinal() + 1)
    }
}

impl fmt::Display for RewardLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Level {}", self.ordinal())
    }
}

impl From<RewardLevel> for u8 {
    fn from(level: RewardLevel) -> Self {
        level.ordinal()
    }
}

impl TryFrom<u8> for RewardLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        RewardLevel::from_ordinal(value).ok_or_else(|| format!("unknown reward level {value}"))
    }
}

/// Program settings an organization controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationConfig {
    pub organization_id: OrganizationId,
    /// Falls back to the engine-wide default when unset.
    #[serde(default)]
    pub baseline_period_days: Option<u32>,
    /// Overrides the engine-wide evaluation window when set.
    #[serde(default)]
    pub evaluation_period_days: Option<u32>,
    /// Only device-verified records count toward baseline and evaluation.
    #[serde(default)]
    pub verified_only: bool,
}

impl OrganizationConfig {
    /// Rejects period overrides outside the supported range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(days) = self.baseline_period_days {
            validate_period_days("baseline_period_days", days)?;
        }
        if let Some(days) = self.evaluation_period_days {
            validate_period_days("evaluation_period_days", days)?;
        }
        Ok(())
    }
}

/// Member view returned by the member directory collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberProfile {
    pub member_id: MemberId,
    pub current_level: RewardLevel,
    pub enrolled_at: DateTime<Utc>,
    pub organization: OrganizationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberLevelState {
    pub member_id: MemberId,
    pub current_level: RewardLevel,
    pub level_updated_at: DateTime<Utc>,
}

/// Append-only audit entry written alongside every level change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelHistoryEntry {
    pub member_id: MemberId,
    pub previous_level: RewardLevel,
    pub new_level: RewardLevel,
    pub reason: String,
    pub evaluation_snapshot: Vec<MetricEvaluation>,
    pub changed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reward_level_walks_upward_and_stops_at_top() {
        assert_eq!(RewardLevel::Level0.next(), Some(RewardLevel::Level1));
        assert_eq!(RewardLevel::Level2.next(), Some(RewardLevel::Level3));
        assert_eq!(RewardLevel::Level3.next(), None);
        assert!(RewardLevel::Level3 > RewardLevel::Level1);
    }

    #[test]
    fn reward_level_serializes_as_ordinal() {
        let json = serde_json::to_string(&RewardLevel::Level2).expect("serialize");
        assert_eq!(json, "2");
        let parsed: RewardLevel = serde_json::from_str("3").expect("deserialize");
        assert_eq!(parsed, RewardLevel::Level3);
        assert!(serde_json::from_str::<RewardLevel>("7").is_err());
    }

    #[test]
    fn metric_type_uses_screaming_snake_case() {
        let json = serde_json::to_string(&MetricType::RestingHeartRate).expect("serialize");
        assert_eq!(json, "\"RESTING_HEART_RATE\"");
    }

    #[test]
    fn organization_periods_must_stay_in_range() {
        let mut organization = OrganizationConfig {
            organization_id: OrganizationId("acme".to_string()),
            baseline_period_days: Some(14),
            evaluation_period_days: None,
            verified_only: false,
        };
        assert!(organization.validate().is_ok());

        organization.evaluation_period_days = Some(0);
        assert!(matches!(
            organization.validate(),
            Err(ConfigError::InvalidNumber {
                key: "evaluation_period_days"
            })
        ));

        organization.evaluation_period_days = None;
        organization.baseline_period_days = Some(4_000_000_000);
        assert!(matches!(
            organization.validate(),
            Err(ConfigError::OutOfRange {
                key: "baseline_period_days",
                ..
            })
        ));
    }
}
