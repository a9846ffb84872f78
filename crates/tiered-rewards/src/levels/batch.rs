use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::domain::{MemberId, RewardLevel};
use super::repository::LevelStore;
use super::service::LevelService;
use super::transition::TransitionOutcome;

/// What happened to one member during a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchStatus {
    Promoted {
        previous: RewardLevel,
        new: RewardLevel,
    },
    Unchanged {
        level: RewardLevel,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberBatchOutcome {
    pub member_id: MemberId,
    #[serde(flatten)]
    pub status: BatchStatus,
}

/// Per-member outcomes in input order plus tallies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<MemberBatchOutcome>,
    pub promoted: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl BatchReport {
    fn from_outcomes(outcomes: Vec<MemberBatchOutcome>) -> Self {
        let mut report = BatchReport::default();
        for outcome in &outcomes {
            match outcome.status {
                BatchStatus::Promoted { .. } => report.promoted += 1,
                BatchStatus::Unchanged { .. } => report.unchanged += 1,
                BatchStatus::Failed { .. } => report.failed += 1,
            }
        }
        report.outcomes = outcomes;
        report
    }
}

/// Run [`LevelService::apply_member_evaluation`] for every member, at most
/// `concurrency` at a time. A failing or panicking member never aborts the batch.
pub async fn evaluate_batch<S>(
    service: Arc<LevelService<S>>,
    members: Vec<MemberId>,
    concurrency: usize,
) -> BatchReport
where
    S: LevelStore + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (index, member_id) in members.into_iter().enumerate() {
        let service = Arc::clone(&service);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let target = member_id.clone();
            let joined =
                tokio::task::spawn_blocking(move || service.apply_member_evaluation(&target))
                    .await;

            let status = match joined {
                Ok(Ok(applied)) => match applied.transition {
                    TransitionOutcome::Promoted { previous, new } => {
                        BatchStatus::Promoted { previous, new }
                    }
                    TransitionOutcome::Unchanged { current } => {
                        BatchStatus::Unchanged { level: current }
                    }
                },
                Ok(Err(err)) => {
                    warn!(%member_id, error = %err, "member evaluation failed");
                    BatchStatus::Failed {
                        error: err.to_string(),
                    }
                }
                Err(err) => {
                    warn!(%member_id, error = %err, "member evaluation task aborted");
                    BatchStatus::Failed {
                        error: format!("evaluation task aborted: {err}"),
                    }
                }
            };

            (index, MemberBatchOutcome { member_id, status })
        });
    }

    let mut indexed = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => indexed.push(outcome),
            Err(err) => warn!(error = %err, "batch worker did not complete"),
        }
    }
    indexed.sort_by_key(|(index, _)| *index);

    let report = BatchReport::from_outcomes(indexed.into_iter().map(|(_, outcome)| outcome).collect());
    info!(
        promoted = report.promoted,
        unchanged = report.unchanged,
        failed = report.failed,
        "batch evaluation finished"
    );
    report
}
