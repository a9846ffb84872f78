use chrono::{DateTime, Utc};

use super::domain::{
    BaselineSnapshot, BiometricRecord, LevelHistoryEntry, MemberId, MemberLevelState,
    MemberProfile, MetricType, RewardLevel,
};

/// Read access to raw measurements owned by the ingestion pipeline.
pub trait BiometricSource: Send + Sync {
    /// Records for `member_id` recorded at or after `since`, optionally for one metric type.
    fn records(
        &self,
        member_id: &MemberId,
        metric_type: Option<MetricType>,
        since: DateTime<Utc>,
    ) -> Result<Vec<BiometricRecord>, RepositoryError>;
}

/// Append-only storage for baseline snapshots.
pub trait BaselineStore: Send + Sync {
    fn latest_complete_baseline(
        &self,
        member_id: &MemberId,
    ) -> Result<Option<BaselineSnapshot>, RepositoryError>;

    /// Persist a new snapshot. Implementations must return the existing snapshot
    /// instead of a duplicate when a complete one already covers the same period.
    fn create_baseline(&self, snapshot: BaselineSnapshot)
        -> Result<BaselineSnapshot, RepositoryError>;
}

pub trait MemberDirectory: Send + Sync {
    fn member(&self, member_id: &MemberId) -> Result<Option<MemberProfile>, RepositoryError>;
}

/// Level state plus its audit log.
pub trait LevelLedger: Send + Sync {
    /// Atomically check that the stored level still equals `expected`, write `state`
    /// and append `entry`. Returns [`RepositoryError::Conflict`] when the check fails,
    /// in which case nothing is written.
    fn commit_transition(
        &self,
        expected: RewardLevel,
        state: MemberLevelState,
        entry: LevelHistoryEntry,
    ) -> Result<(), RepositoryError>;

    fn history(&self, member_id: &MemberId) -> Result<Vec<LevelHistoryEntry>, RepositoryError>;
}

/// Everything the level service needs from persistence.
pub trait LevelStore: BiometricSource + BaselineStore + MemberDirectory + LevelLedger {}

impl<T> LevelStore for T where T: BiometricSource + BaselineStore + MemberDirectory + LevelLedger {}

/// Error enumeration for collaborator failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("stored level changed concurrently")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Source of "now" so evaluations can be replayed deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
