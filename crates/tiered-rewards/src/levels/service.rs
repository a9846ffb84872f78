use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{ConfigError, EngineSettings};

use super::baseline::{
    aggregate_by_metric, records_in_window, BaselineError, BaselineSnapshotBuilder,
    MeasurementWindow,
};
use super::catalog::CatalogRegistry;
use super::domain::{
    BaselineSnapshot, LevelHistoryEntry, MemberId, MemberProfile, MetricAggregate, MetricType,
    OrganizationId, RewardLevel,
};
use super::evaluation::{EligibilityEngine, LevelSearchOutcome, MetricEvaluation};
use super::progress::{LevelProgress, ProgressCalculator};
use super::repository::{Clock, LevelStore, RepositoryError, SystemClock};
use super::transition::{LevelTransitionApplier, TransitionOutcome};

/// Audit reason recorded for the promotion that follows a complete baseline.
pub const BASELINE_PROMOTION_REASON: &str = "Baseline captured and participation confirmed";

/// Explainable result of a level evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelEvaluationReport {
    pub member_id: MemberId,
    pub current_level: RewardLevel,
    pub evaluated_level: RewardLevel,
    pub eligible: bool,
    pub reason: String,
    pub per_metric_results: Vec<MetricEvaluation>,
}

/// Evaluation plus whatever transition it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedEvaluation {
    pub evaluation: LevelEvaluationReport,
    pub transition: TransitionOutcome,
}

/// Service composing the rule catalogs, collaborators and the evaluation engine.
pub struct LevelService<S> {
    store: Arc<S>,
    catalogs: Arc<CatalogRegistry>,
    settings: EngineSettings,
    clock: Arc<dyn Clock>,
}

impl<S> LevelService<S>
where
    S: LevelStore + 'static,
{
    pub fn new(store: Arc<S>, catalogs: CatalogRegistry, settings: EngineSettings) -> Self {
        Self {
            store,
            catalogs: Arc::new(catalogs),
            settings,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Decide which level the member currently qualifies for. Read-only.
    pub fn evaluate_member_level(
        &self,
        member_id: &MemberId,
    ) -> Result<LevelEvaluationReport, LevelServiceError> {
        let now = self.clock.now();
        let member = self.member(member_id)?;
        self.evaluate_profile(&member, now)
    }

    /// Evaluate and commit any upward transition the evaluation justifies.
    pub fn apply_member_evaluation(
        &self,
        member_id: &MemberId,
    ) -> Result<AppliedEvaluation, LevelServiceError> {
        let now = self.clock.now();
        let member = self.member(member_id)?;
        let evaluation = self.evaluate_profile(&member, now)?;

        let transition = if evaluation.eligible {
            let reason = format!(
                "Evaluation qualified member for {}: {}",
                evaluation.evaluated_level, evaluation.reason
            );
            self.applier().apply(
                member_id,
                evaluation.evaluated_level,
                &reason,
                evaluation.per_metric_results.clone(),
                now,
            )?
        } else {
            TransitionOutcome::Unchanged {
                current: member.current_level,
            }
        };

        Ok(AppliedEvaluation {
            evaluation,
            transition,
        })
    }

    /// Progress toward the level directly above the member's current one.
    pub fn get_level_progress(
        &self,
        member_id: &MemberId,
    ) -> Result<LevelProgress, LevelServiceError> {
        let now = self.clock.now();
        let member = self.member(member_id)?;
        let engine = self.engine_for(&member.organization.organization_id)?;
        let baseline = self.store.latest_complete_baseline(member_id)?;
        let current = self.current_aggregates(&member, now)?;

        Ok(ProgressCalculator::new(&engine).calculate(
            member_id,
            member.current_level,
            baseline.as_ref(),
            &current,
        ))
    }

    /// Capture the member's baseline and promote out of the lowest level when complete.
    pub fn create_baseline_snapshot(
        &self,
        member_id: &MemberId,
    ) -> Result<BaselineSnapshot, LevelServiceError> {
        let now = self.clock.now();
        let member = self.member(member_id)?;
        let window = MeasurementWindow::baseline(
            member.enrolled_at,
            self.baseline_period_days(&member),
        )?;

        let existing = self
            .store
            .latest_complete_baseline(member_id)?
            .filter(|snapshot| snapshot.covers_period(window.start, window.end));

        let stored = match existing {
            Some(snapshot) => {
                debug!(%member_id, "complete baseline already captured for period");
                snapshot
            }
            None => {
                let records = self.store.records(member_id, None, window.start)?;
                let snapshot = BaselineSnapshotBuilder::new(window)
                    .verified_only(member.organization.verified_only)
                    .build(member_id, &records, now)?;
                let stored = self.store.create_baseline(snapshot)?;
                info!(
                    %member_id,
                    status = stored.status.label(),
                    metric_types = stored.metrics.len(),
                    "baseline snapshot recorded"
                );
                stored
            }
        };

        // Re-runs fall through here too; the applier is a no-op once promoted.
        if stored.is_complete() && member.current_level == RewardLevel::lowest() {
            if let Some(target) = RewardLevel::lowest().next() {
                self.applier().apply(
                    member_id,
                    target,
                    BASELINE_PROMOTION_REASON,
                    Vec::new(),
                    now,
                )?;
            }
        }

        Ok(stored)
    }

    /// Commit `new_level` when it is strictly above the stored level; otherwise a no-op.
    pub fn update_member_level(
        &self,
        member_id: &MemberId,
        new_level: RewardLevel,
        reason: &str,
        evaluation_snapshot: Vec<MetricEvaluation>,
    ) -> Result<TransitionOutcome, LevelServiceError> {
        let now = self.clock.now();
        self.applier()
            .apply(member_id, new_level, reason, evaluation_snapshot, now)
    }

    pub fn level_history(
        &self,
        member_id: &MemberId,
    ) -> Result<Vec<LevelHistoryEntry>, LevelServiceError> {
        self.member(member_id)?;
        Ok(self.store.history(member_id)?)
    }

    fn evaluate_profile(
        &self,
        member: &MemberProfile,
        now: DateTime<Utc>,
    ) -> Result<LevelEvaluationReport, LevelServiceError> {
        let member_id = &member.member_id;
        let engine = self.engine_for(&member.organization.organization_id)?;

        let Some(baseline) = self.store.latest_complete_baseline(member_id)? else {
            return Ok(LevelEvaluationReport {
                member_id: member_id.clone(),
                current_level: member.current_level,
                evaluated_level: RewardLevel::lowest(),
                eligible: false,
                reason: "baseline not yet captured".to_string(),
                per_metric_results: Vec::new(),
            });
        };

        let current = self.current_aggregates(member, now)?;
        let search = engine.search(Some(&baseline), &current);

        debug!(
            %member_id,
            evaluated = %search.level,
            attempts = search.attempts.len(),
            "level search finished"
        );

        let reason = if current.is_empty() {
            format!(
                "no recent data in the last {} days",
                self.evaluation_period_days(member)
            )
        } else {
            describe_search(&search)
        };

        Ok(LevelEvaluationReport {
            member_id: member_id.clone(),
            current_level: member.current_level,
            evaluated_level: search.level,
            eligible: search.eligible(),
            reason,
            per_metric_results: search
                .decisive()
                .map(|evaluation| evaluation.results.clone())
                .unwrap_or_default(),
        })
    }

    fn current_aggregates(
        &self,
        member: &MemberProfile,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<MetricType, MetricAggregate>, LevelServiceError> {
        let window = MeasurementWindow::trailing(now, self.evaluation_period_days(member))?;
        let records = self.store.records(&member.member_id, None, window.start)?;
        Ok(aggregate_by_metric(records_in_window(
            &records,
            &window,
            member.organization.verified_only,
        ))?)
    }

    fn member(&self, member_id: &MemberId) -> Result<MemberProfile, LevelServiceError> {
        let member = self
            .store
            .member(member_id)?
            .ok_or_else(|| LevelServiceError::MemberNotFound(member_id.clone()))?;
        member
            .organization
            .validate()
            .map_err(|source| LevelServiceError::InvalidOrganization {
                organization: member.organization.organization_id.clone(),
                source,
            })?;
        Ok(member)
    }

    fn engine_for(
        &self,
        organization: &OrganizationId,
    ) -> Result<EligibilityEngine, LevelServiceError> {
        self.catalogs
            .catalog_for(organization)
            .map(EligibilityEngine::new)
            .ok_or_else(|| LevelServiceError::OrganizationNotFound(organization.clone()))
    }

    fn applier(&self) -> LevelTransitionApplier<'_, S> {
        LevelTransitionApplier::new(self.store.as_ref())
    }

    fn evaluation_period_days(&self, member: &MemberProfile) -> u32 {
        member
            .organization
            .evaluation_period_days
            .unwrap_or(self.settings.evaluation_window_days)
    }

    fn baseline_period_days(&self, member: &MemberProfile) -> u32 {
        member
            .organization
            .baseline_period_days
            .unwrap_or(self.settings.default_baseline_period_days)
    }
}

fn describe_search(search: &LevelSearchOutcome) -> String {
    match (&search.matched, search.attempts.last()) {
        (Some(matched), _) => format!(
            "eligible for {}: {} of {} required metrics passed",
            matched.level, matched.pass_count, matched.min_metrics_required
        ),
        (None, Some(lowest)) => format!(
            "no level requirements met; {} of {} required metrics passed for {}",
            lowest.pass_count, lowest.min_metrics_required, lowest.level
        ),
        (None, None) => "no level requirements configured".to_string(),
    }
}

/// Error raised by the level service.
#[derive(Debug, thiserror::Error)]
pub enum LevelServiceError {
    #[error("member {0} not found")]
    MemberNotFound(MemberId),
    #[error("organization {0} has no rule catalog")]
    OrganizationNotFound(OrganizationId),
    #[error("organization {organization} is misconfigured: {source}")]
    InvalidOrganization {
        organization: OrganizationId,
        source: ConfigError,
    },
    #[error(transparent)]
    Baseline(#[from] BaselineError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
