use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

use super::domain::{
    BaselineSnapshot, BaselineStatus, BiometricRecord, MemberId, MetricAggregate, MetricType,
};

/// Distinct metric types with data needed before a baseline counts as complete.
pub const MIN_COMPLETE_METRIC_TYPES: usize = 3;

const AVERAGE_DECIMALS: u32 = 4;

/// Closed time window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl MeasurementWindow {
    pub fn baseline(
        enrolled_at: DateTime<Utc>,
        baseline_period_days: u32,
    ) -> Result<Self, BaselineError> {
        let end = enrolled_at
            .checked_add_signed(Duration::days(i64::from(baseline_period_days)))
            .ok_or(BaselineError::WindowOutOfRange {
                days: baseline_period_days,
            })?;
        Ok(Self {
            start: enrolled_at,
            end,
        })
    }

    /// Trailing window ending at `now`.
    pub fn trailing(now: DateTime<Utc>, days: u32) -> Result<Self, BaselineError> {
        let start = now
            .checked_sub_signed(Duration::days(i64::from(days)))
            .ok_or(BaselineError::WindowOutOfRange { days })?;
        Ok(Self { start, end: now })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

/// Failures while turning raw records into aggregates.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BaselineError {
    #[error("sum of {} readings exceeds the representable range", .metric_type.label())]
    ValueOverflow { metric_type: MetricType },
    #[error("a window of {days} days falls outside the supported date range")]
    WindowOutOfRange { days: u32 },
}

/// Group records by metric type and compute avg/min/max/count.
pub fn aggregate_by_metric<'a, I>(
    records: I,
) -> Result<BTreeMap<MetricType, MetricAggregate>, BaselineError>
where
    I: IntoIterator<Item = &'a BiometricRecord>,
{
    let mut grouped: BTreeMap<MetricType, (Decimal, Decimal, Decimal, u32)> = BTreeMap::new();
    for record in records {
        match grouped.get_mut(&record.metric_type) {
            Some((sum, min, max, count)) => {
                *sum = sum
                    .checked_add(record.value)
                    .ok_or(BaselineError::ValueOverflow {
                        metric_type: record.metric_type,
                    })?;
                *min = (*min).min(record.value);
                *max = (*max).max(record.value);
                *count += 1;
            }
            None => {
                grouped.insert(
                    record.metric_type,
                    (record.value, record.value, record.value, 1),
                );
            }
        }
    }

    Ok(grouped
        .into_iter()
        .map(|(metric, (sum, min, max, count))| {
            let avg = (sum / Decimal::from(count))
                .round_dp_with_strategy(AVERAGE_DECIMALS, RoundingStrategy::MidpointAwayFromZero);
            (
                metric,
                MetricAggregate {
                    avg,
                    min,
                    max,
                    count,
                },
            )
        })
        .collect())
}

/// Keep only records inside `window`, optionally restricted to verified ones.
pub fn records_in_window<'a>(
    records: &'a [BiometricRecord],
    window: &'a MeasurementWindow,
    verified_only: bool,
) -> impl Iterator<Item = &'a BiometricRecord> + 'a {
    records
        .iter()
        .filter(move |record| window.contains(record.recorded_at))
        .filter(move |record| !verified_only || record.verified)
}

/// Turns raw records from the baseline window into a snapshot.
#[derive(Debug, Clone)]
pub struct BaselineSnapshotBuilder {
    window: MeasurementWindow,
    verified_only: bool,
}

impl BaselineSnapshotBuilder {
    pub fn new(window: MeasurementWindow) -> Self {
        Self {
            window,
            verified_only: false,
        }
    }

    pub fn verified_only(mut self, verified_only: bool) -> Self {
        self.verified_only = verified_only;
        self
    }

    pub fn window(&self) -> MeasurementWindow {
        self.window
    }

    pub fn build(
        &self,
        member_id: &MemberId,
        records: &[BiometricRecord],
        now: DateTime<Utc>,
    ) -> Result<BaselineSnapshot, BaselineError> {
        let metrics = aggregate_by_metric(records_in_window(
            records,
            &self.window,
            self.verified_only,
        ))?;

        let status = if metrics.len() >= MIN_COMPLETE_METRIC_TYPES {
            BaselineStatus::Complete
        } else if now < self.window.end {
            BaselineStatus::Pending
        } else {
            BaselineStatus::Insufficient
        };

        Ok(BaselineSnapshot {
            member_id: member_id.clone(),
            period_start: self.window.start,
            period_end: self.window.end,
            status,
            metrics,
            created_at: now,
            finalized_at: (status == BaselineStatus::Complete).then_some(now),
        })
    }
}
