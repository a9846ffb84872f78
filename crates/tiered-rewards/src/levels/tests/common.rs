use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::config::EngineSettings;
use crate::levels::catalog::{CatalogRegistry, RuleCatalog};
use crate::levels::domain::{
    BaselineSnapshot, BiometricRecord, LevelHistoryEntry, MemberId, MemberLevelState,
    MemberProfile, MetricType, OrganizationConfig, OrganizationId, RewardLevel,
};
use crate::levels::memory::InMemoryLevelStore;
use crate::levels::repository::{
    BaselineStore, BiometricSource, FixedClock, LevelLedger, MemberDirectory, RepositoryError,
};
use crate::levels::service::LevelService;

pub(super) fn d(value: i64) -> Decimal {
    Decimal::from(value)
}

pub(super) fn dp(mantissa: i64, scale: u32) -> Decimal {
    Decimal::new(mantissa, scale)
}

pub(super) fn enrolled_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
        .single()
        .expect("valid enrollment date")
}

/// Evaluation time: well past the 14 day baseline window.
pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0)
        .single()
        .expect("valid evaluation date")
}

pub(super) fn baseline_day(day: i64) -> DateTime<Utc> {
    enrolled_at() + Duration::days(day)
}

pub(super) fn recent_day(days_ago: i64) -> DateTime<Utc> {
    now() - Duration::days(days_ago)
}

pub(super) fn member_id(suffix: &str) -> MemberId {
    MemberId(format!("member-{suffix}"))
}

pub(super) fn organization() -> OrganizationConfig {
    OrganizationConfig {
        organization_id: OrganizationId("acme".to_string()),
        baseline_period_days: Some(14),
        evaluation_period_days: None,
        verified_only: false,
    }
}

pub(super) fn profile(suffix: &str, level: RewardLevel) -> MemberProfile {
    MemberProfile {
        member_id: member_id(suffix),
        current_level: level,
        enrolled_at: enrolled_at(),
        organization: organization(),
    }
}

pub(super) fn record(
    suffix: &str,
    metric_type: MetricType,
    value: Decimal,
    recorded_at: DateTime<Utc>,
) -> BiometricRecord {
    BiometricRecord {
        member_id: member_id(suffix),
        metric_type,
        value,
        unit: unit_for(metric_type).to_string(),
        source: "wearable".to_string(),
        recorded_at,
        verified: true,
    }
}

fn unit_for(metric_type: MetricType) -> &'static str {
    match metric_type {
        MetricType::Steps => "steps",
        MetricType::RestingHeartRate => "bpm",
        MetricType::SleepDuration => "hours",
        MetricType::Weight => "kg",
        MetricType::ActiveMinutes => "minutes",
        MetricType::HeartRateVariability => "ms",
        MetricType::BloodPressureSystolic => "mmHg",
        MetricType::BloodGlucose => "mg/dL",
    }
}

/// Baseline and recent readings, one pair per metric.
pub(super) fn readings(
    suffix: &str,
    pairs: &[(MetricType, Decimal, Decimal)],
) -> Vec<BiometricRecord> {
    pairs
        .iter()
        .flat_map(|(metric, baseline, current)| {
            vec![
                record(suffix, *metric, *baseline, baseline_day(3)),
                record(suffix, *metric, *baseline, baseline_day(9)),
                record(suffix, *metric, *current, recent_day(12)),
                record(suffix, *metric, *current, recent_day(4)),
            ]
        })
        .collect()
}

/// Improves steps 20%, resting heart rate 5.71% and weight 3.33%: Level 2 material.
pub(super) fn improver_readings(suffix: &str) -> Vec<BiometricRecord> {
    readings(
        suffix,
        &[
            (MetricType::Steps, d(6_000), d(7_200)),
            (MetricType::RestingHeartRate, d(70), d(66)),
            (MetricType::SleepDuration, dp(65, 1), d(7)),
            (MetricType::Weight, d(90), d(87)),
        ],
    )
}

/// Same as the improver but weight barely moves: only Level 1 qualifies.
pub(super) fn plateau_readings(suffix: &str) -> Vec<BiometricRecord> {
    readings(
        suffix,
        &[
            (MetricType::Steps, d(6_000), d(7_200)),
            (MetricType::RestingHeartRate, d(70), d(66)),
            (MetricType::SleepDuration, dp(65, 1), d(7)),
            (MetricType::Weight, d(90), d(88)),
        ],
    )
}

/// Already healthy: satisfies Level 3 by absolute targets and maintenance alone.
pub(super) fn maintainer_readings(suffix: &str) -> Vec<BiometricRecord> {
    readings(
        suffix,
        &[
            (MetricType::Steps, d(10_500), d(10_400)),
            (MetricType::RestingHeartRate, d(58), d(57)),
            (MetricType::SleepDuration, d(8), dp(81, 1)),
            (MetricType::HeartRateVariability, d(55), d(54)),
        ],
    )
}

pub(super) fn build_service_with(
    store: Arc<InMemoryLevelStore>,
    catalogs: CatalogRegistry,
) -> LevelService<InMemoryLevelStore> {
    LevelService::new(store, catalogs, EngineSettings::default())
        .with_clock(Arc::new(FixedClock(now())))
}

pub(super) fn build_service() -> (LevelService<InMemoryLevelStore>, Arc<InMemoryLevelStore>) {
    let store = Arc::new(InMemoryLevelStore::new());
    let service = build_service_with(
        store.clone(),
        CatalogRegistry::with_fallback(RuleCatalog::standard()),
    );
    (service, store)
}

/// Enroll a member, load their readings and capture the baseline.
pub(super) fn seeded_member(
    service: &LevelService<InMemoryLevelStore>,
    store: &InMemoryLevelStore,
    suffix: &str,
    level: RewardLevel,
    records: Vec<BiometricRecord>,
) -> MemberId {
    store.enroll(profile(suffix, level)).expect("enroll member");
    store.add_records(records).expect("add records");
    service
        .create_baseline_snapshot(&member_id(suffix))
        .expect("baseline captured");
    member_id(suffix)
}

/// Store wrapper that injects collaborator failures.
#[derive(Default)]
pub(super) struct FaultyStore {
    pub(super) inner: InMemoryLevelStore,
    pub(super) records_offline: bool,
    pub(super) conflicting_commits: bool,
}

impl BiometricSource for FaultyStore {
    fn records(
        &self,
        member_id: &MemberId,
        metric_type: Option<MetricType>,
        since: DateTime<Utc>,
    ) -> Result<Vec<BiometricRecord>, RepositoryError> {
        if self.records_offline {
            return Err(RepositoryError::Unavailable("device sync offline".to_string()));
        }
        self.inner.records(member_id, metric_type, since)
    }
}

impl BaselineStore for FaultyStore {
    fn latest_complete_baseline(
        &self,
        member_id: &MemberId,
    ) -> Result<Option<BaselineSnapshot>, RepositoryError> {
        self.inner.latest_complete_baseline(member_id)
    }

    fn create_baseline(
        &self,
        snapshot: BaselineSnapshot,
    ) -> Result<BaselineSnapshot, RepositoryError> {
        self.inner.create_baseline(snapshot)
    }
}

impl MemberDirectory for FaultyStore {
    fn member(&self, member_id: &MemberId) -> Result<Option<MemberProfile>, RepositoryError> {
        self.inner.member(member_id)
    }
}

impl LevelLedger for FaultyStore {
    fn commit_transition(
        &self,
        expected: RewardLevel,
        state: MemberLevelState,
        entry: LevelHistoryEntry,
    ) -> Result<(), RepositoryError> {
        if self.conflicting_commits {
            return Err(RepositoryError::Conflict);
        }
        self.inner.commit_transition(expected, state, entry)
    }

    fn history(&self, member_id: &MemberId) -> Result<Vec<LevelHistoryEntry>, RepositoryError> {
        self.inner.history(member_id)
    }
}
