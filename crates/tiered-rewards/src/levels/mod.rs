//! Reward level evaluation: baseline capture, per-metric rules, top-down level
//! search, upward-only transitions and progress toward the next level.

pub mod baseline;
pub mod batch;
pub mod catalog;
pub mod domain;
pub mod evaluation;
pub mod import;
pub mod memory;
pub mod progress;
pub mod repository;
pub mod service;
pub mod transition;

#[cfg(test)]
mod tests;

pub use baseline::{
    BaselineError, BaselineSnapshotBuilder, MeasurementWindow, MIN_COMPLETE_METRIC_TYPES,
};
pub use batch::{evaluate_batch, BatchReport, BatchStatus, MemberBatchOutcome};
pub use catalog::{
    CatalogError, CatalogRegistry, Direction, LevelRequirement, LevelRule, OptimalRange,
    RuleCatalog,
};
pub use domain::{
    BaselineSnapshot, BaselineStatus, BiometricRecord, LevelHistoryEntry, MemberId,
    MemberLevelState, MemberProfile, MetricAggregate, MetricType, OrganizationConfig,
    OrganizationId, RewardLevel,
};
pub use evaluation::{
    evaluate_metric, EligibilityEngine, LevelEvaluation, LevelSearchOutcome, MetricEvaluation,
    MetricOutcome,
};
pub use import::{BiometricCsvImporter, RecordImportError};
pub use memory::InMemoryLevelStore;
pub use progress::{LevelProgress, ProgressCalculator};
pub use repository::{
    BaselineStore, BiometricSource, Clock, FixedClock, LevelLedger, LevelStore, MemberDirectory,
    RepositoryError, SystemClock,
};
pub use service::{
    AppliedEvaluation, LevelEvaluationReport, LevelService, LevelServiceError,
    BASELINE_PROMOTION_REASON,
};
pub use transition::{LevelTransitionApplier, TransitionOutcome};
