use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::domain::{
    BaselineSnapshot, BiometricRecord, LevelHistoryEntry, MemberId, MemberLevelState,
    MemberProfile, MetricType, RewardLevel,
};
use super::repository::{
    BaselineStore, BiometricSource, LevelLedger, MemberDirectory, RepositoryError,
};

#[derive(Debug, Default)]
struct StoreState {
    members: HashMap<MemberId, MemberProfile>,
    level_states: HashMap<MemberId, MemberLevelState>,
    records: Vec<BiometricRecord>,
    baselines: Vec<BaselineSnapshot>,
    history: Vec<LevelHistoryEntry>,
}

/// Process-local store backing every collaborator trait. One lock guards all
/// tables so a transition commit is a single atomic step.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLevelStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryLevelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enroll(&self, profile: MemberProfile) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        if state.members.contains_key(&profile.member_id) {
            return Err(RepositoryError::Conflict);
        }
        state.members.insert(profile.member_id.clone(), profile);
        Ok(())
    }

    pub fn add_records<I>(&self, records: I) -> Result<(), RepositoryError>
    where
        I: IntoIterator<Item = BiometricRecord>,
    {
        self.lock()?.records.extend(records);
        Ok(())
    }

    pub fn level_state(
        &self,
        member_id: &MemberId,
    ) -> Result<Option<MemberLevelState>, RepositoryError> {
        Ok(self.lock()?.level_states.get(member_id).cloned())
    }

    pub fn baselines(&self, member_id: &MemberId) -> Result<Vec<BaselineSnapshot>, RepositoryError> {
        Ok(self
            .lock()?
            .baselines
            .iter()
            .filter(|snapshot| &snapshot.member_id == member_id)
            .cloned()
            .collect())
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store lock poisoned".to_string()))
    }
}

impl BiometricSource for InMemoryLevelStore {
    fn records(
        &self,
        member_id: &MemberId,
        metric_type: Option<MetricType>,
        since: DateTime<Utc>,
    ) -> Result<Vec<BiometricRecord>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .records
            .iter()
            .filter(|record| &record.member_id == member_id)
            .filter(|record| metric_type.map_or(true, |metric| record.metric_type == metric))
            .filter(|record| record.recorded_at >= since)
            .cloned()
            .collect())
    }
}

impl BaselineStore for InMemoryLevelStore {
    fn latest_complete_baseline(
        &self,
        member_id: &MemberId,
    ) -> Result<Option<BaselineSnapshot>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .baselines
            .iter()
            .rev()
            .find(|snapshot| &snapshot.member_id == member_id && snapshot.is_complete())
            .cloned())
    }

    fn create_baseline(
        &self,
        snapshot: BaselineSnapshot,
    ) -> Result<BaselineSnapshot, RepositoryError> {
        let mut state = self.lock()?;
        let duplicate = state.baselines.iter().find(|existing| {
            existing.member_id == snapshot.member_id
                && existing.is_complete()
                && existing.covers_period(snapshot.period_start, snapshot.period_end)
        });
        if let Some(existing) = duplicate {
            return Ok(existing.clone());
        }
        state.baselines.push(snapshot.clone());
        Ok(snapshot)
    }
}

impl MemberDirectory for InMemoryLevelStore {
    fn member(&self, member_id: &MemberId) -> Result<Option<MemberProfile>, RepositoryError> {
        Ok(self.lock()?.members.get(member_id).cloned())
    }
}

impl LevelLedger for InMemoryLevelStore {
    fn commit_transition(
        &self,
        expected: RewardLevel,
        level_state: MemberLevelState,
        entry: LevelHistoryEntry,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        let member = state
            .members
            .get_mut(&level_state.member_id)
            .ok_or(RepositoryError::NotFound)?;
        if member.current_level != expected {
            return Err(RepositoryError::Conflict);
        }
        member.current_level = level_state.current_level;
        state
            .level_states
            .insert(level_state.member_id.clone(), level_state);
        state.history.push(entry);
        Ok(())
    }

    fn history(&self, member_id: &MemberId) -> Result<Vec<LevelHistoryEntry>, RepositoryError> {
        Ok(self
            .lock()?
            .history
            .iter()
            .filter(|entry| &entry.member_id == member_id)
            .cloned()
            .collect())
    }
}
