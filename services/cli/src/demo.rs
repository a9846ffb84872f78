use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;
use tiered_rewards::config::AppConfig;
use tiered_rewards::error::AppError;
use tiered_rewards::levels::{
    evaluate_batch, BatchReport, BatchStatus, BiometricRecord, InMemoryLevelStore, LevelProgress,
    LevelService, MemberId, MemberProfile, MetricType, RewardLevel,
};
use tracing::info;

use crate::infra::{build_service, cli_organization, load_catalog, print_json};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Evaluation date (YYYY-MM-DD). Defaults to now.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<DateTime<Utc>>,
    /// Emit the batch report and progress as JSON only.
    #[arg(long)]
    pub(crate) json: bool,
}

/// One scripted member: starting level plus (metric, baseline, current) readings.
struct DemoMember {
    key: &'static str,
    level: RewardLevel,
    readings: Vec<(MetricType, Decimal, Decimal)>,
}

#[derive(Serialize)]
struct DemoOutput {
    batch: BatchReport,
    progress: Vec<LevelProgress>,
}

pub(crate) async fn run_demo(args: DemoArgs, config: &AppConfig) -> Result<(), AppError> {
    let now = args.today.unwrap_or_else(Utc::now);
    let enrolled_at = now - Duration::days(60);
    let store = Arc::new(InMemoryLevelStore::new());
    let service = Arc::new(build_service(
        store.clone(),
        load_catalog(config, None)?,
        config.engine.clone(),
        Some(now),
    ));

    let members = demo_members();
    for member in &members {
        seed_member(&service, &store, member, enrolled_at, now)?;
    }

    let mut batch_members: Vec<MemberId> = members
        .iter()
        .map(|member| MemberId(member.key.to_string()))
        .collect();
    batch_members.push(MemberId("unenrolled".to_string()));

    let report = evaluate_batch(
        Arc::clone(&service),
        batch_members,
        config.engine.batch_concurrency,
    )
    .await;

    let progress = members
        .iter()
        .map(|member| service.get_level_progress(&MemberId(member.key.to_string())))
        .collect::<Result<Vec<_>, _>>()?;

    if args.json {
        return print_json(&DemoOutput {
            batch: report,
            progress,
        });
    }

    render_demo(&report, &progress);
    Ok(())
}

fn seed_member(
    service: &LevelService<InMemoryLevelStore>,
    store: &InMemoryLevelStore,
    member: &DemoMember,
    enrolled_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let member_id = MemberId(member.key.to_string());
    store.enroll(MemberProfile {
        member_id: member_id.clone(),
        current_level: member.level,
        enrolled_at,
        organization: cli_organization(false),
    })?;

    let records = member.readings.iter().flat_map(|(metric, baseline, current)| {
        [
            (*baseline, enrolled_at + Duration::days(4)),
            (*baseline, enrolled_at + Duration::days(18)),
            (*current, now - Duration::days(14)),
            (*current, now - Duration::days(3)),
        ]
        .into_iter()
        .map(|(value, recorded_at)| BiometricRecord {
            member_id: member_id.clone(),
            metric_type: *metric,
            value,
            unit: String::new(),
            source: "demo".to_string(),
            recorded_at,
            verified: true,
        })
        .collect::<Vec<_>>()
    });
    store.add_records(records)?;

    let baseline = service.create_baseline_snapshot(&member_id)?;
    info!(
        member = member.key,
        status = baseline.status.label(),
        "demo baseline captured"
    );
    Ok(())
}

fn d(value: i64) -> Decimal {
    Decimal::from(value)
}

fn demo_members() -> Vec<DemoMember> {
    vec![
        DemoMember {
            key: "ava",
            level: RewardLevel::Level0,
            readings: vec![
                (MetricType::Steps, d(6_000), d(7_200)),
                (MetricType::RestingHeartRate, d(70), d(66)),
                (MetricType::SleepDuration, Decimal::new(65, 1), d(7)),
                (MetricType::Weight, d(90), d(87)),
            ],
        },
        DemoMember {
            key: "ben",
            level: RewardLevel::Level0,
            readings: vec![
                (MetricType::Steps, d(6_500), d(7_100)),
                (MetricType::RestingHeartRate, d(72), d(69)),
                (MetricType::SleepDuration, d(7), Decimal::new(72, 1)),
            ],
        },
        DemoMember {
            key: "cora",
            level: RewardLevel::Level3,
            readings: vec![
                (MetricType::Steps, d(10_500), d(10_400)),
                (MetricType::RestingHeartRate, d(58), d(57)),
                (MetricType::SleepDuration, d(8), Decimal::new(81, 1)),
                (MetricType::HeartRateVariability, d(55), d(54)),
            ],
        },
        DemoMember {
            key: "dev",
            level: RewardLevel::Level0,
            readings: vec![
                (MetricType::Steps, d(4_000), d(4_300)),
                (MetricType::Weight, d(101), d(100)),
            ],
        },
    ]
}

fn render_demo(report: &BatchReport, progress: &[LevelProgress]) {
    println!("Tiered reward evaluation demo");
    println!(
        "- {} promoted | {} unchanged | {} failed",
        report.promoted, report.unchanged, report.failed
    );

    println!("\nBatch outcomes");
    for outcome in &report.outcomes {
        match &outcome.status {
            BatchStatus::Promoted { previous, new } => {
                println!("  - {}: promoted {} -> {}", outcome.member_id, previous, new)
            }
            BatchStatus::Unchanged { level } => {
                println!("  - {}: unchanged at {}", outcome.member_id, level)
            }
            BatchStatus::Failed { error } => {
                println!("  - {}: failed ({})", outcome.member_id, error)
            }
        }
    }

    println!("\nProgress toward next level");
    for entry in progress {
        match entry.next_level {
            Some(next) => println!(
                "  - {} at {} ({}% rebate): {}% toward {} ({} of {} metrics)",
                entry.member_id,
                entry.current_level,
                entry.current_rebate_percentage,
                entry.progress_percent,
                next,
                entry.pass_count,
                entry.min_metrics_required
            ),
            None => println!(
                "  - {} at {} ({}% rebate): top level reached",
                entry.member_id, entry.current_level, entry.current_rebate_percentage
            ),
        }
        for result in &entry.per_metric_results {
            println!(
                "      {} {}: {}",
                if result.passed { "+" } else { "-" },
                result.metric_type.label(),
                result.reason
            );
        }
    }
}
