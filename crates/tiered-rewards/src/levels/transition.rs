use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::domain::{LevelHistoryEntry, MemberId, MemberLevelState, RewardLevel};
use super::evaluation::MetricEvaluation;
use super::repository::{LevelLedger, MemberDirectory, RepositoryError};
use super::service::LevelServiceError;

/// Result of attempting a level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionOutcome {
    Promoted {
        previous: RewardLevel,
        new: RewardLevel,
    },
    Unchanged {
        current: RewardLevel,
    },
}

impl TransitionOutcome {
    pub fn level(self) -> RewardLevel {
        match self {
            TransitionOutcome::Promoted { new, .. } => new,
            TransitionOutcome::Unchanged { current } => current,
        }
    }

    pub fn promoted(self) -> bool {
        matches!(self, TransitionOutcome::Promoted { .. })
    }
}

/// Commits upward-only level changes. Levels never move down automatically.
pub struct LevelTransitionApplier<'a, S> {
    store: &'a S,
}

impl<'a, S> LevelTransitionApplier<'a, S>
where
    S: LevelLedger + MemberDirectory,
{
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn apply(
        &self,
        member_id: &MemberId,
        target: RewardLevel,
        reason: &str,
        evaluation_snapshot: Vec<MetricEvaluation>,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, LevelServiceError> {
        let current = self.current_level(member_id)?;
        if target <= current {
            debug!(%member_id, %current, %target, "level unchanged; transitions only move upward");
            return Ok(TransitionOutcome::Unchanged { current });
        }

        let state = MemberLevelState {
            member_id: member_id.clone(),
            current_level: target,
            level_updated_at: now,
        };
        let entry = LevelHistoryEntry {
            member_id: member_id.clone(),
            previous_level: current,
            new_level: target,
            reason: reason.to_string(),
            evaluation_snapshot,
            changed_at: now,
        };

        match self.store.commit_transition(current, state, entry) {
            Ok(()) => {
                info!(%member_id, previous = %current, new = %target, reason, "member level promoted");
                Ok(TransitionOutcome::Promoted {
                    previous: current,
                    new: target,
                })
            }
            Err(RepositoryError::Conflict) => {
                // Levels only rise, so a concurrent writer that already reached the
                // target makes this commit redundant.
                let latest = self.current_level(member_id)?;
                if latest >= target {
                    warn!(%member_id, %latest, %target, "concurrent promotion already applied");
                    Ok(TransitionOutcome::Unchanged { current: latest })
                } else {
                    Err(RepositoryError::Conflict.into())
                }
            }
            Err(other) => Err(other.into()),
        }
    }

    fn current_level(&self, member_id: &MemberId) -> Result<RewardLevel, LevelServiceError> {
        self.store
            .member(member_id)?
            .map(|member| member.current_level)
            .ok_or_else(|| LevelServiceError::MemberNotFound(member_id.clone()))
    }
}
