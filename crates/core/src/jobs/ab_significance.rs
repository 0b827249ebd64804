use super::{JobContext, JobReport, RunOptions};
use crate::domain::ab_test::{AbTest, SignificanceResult, TestStatus};
use crate::engine::significance::{check_significance, winner_variant_id};
use crate::error::{EngineError, EngineResult};
use crate::storage::ab_tests;
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

/// What the scheduled pass does with one running test.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Decision {
    DeclareWinner { variant_id: Uuid, confidence: f64 },
    CompleteWithoutWinner,
    KeepRunning,
}

fn decide(test: &AbTest, result: &SignificanceResult, now: DateTime<Utc>) -> Decision {
    if result.significant {
        if let Some(variant_id) = winner_variant_id(test, result.winner) {
            return Decision::DeclareWinner {
                variant_id,
                confidence: result.confidence,
            };
        }
    }
    match test.scheduled_end_at {
        Some(end) if end <= now => Decision::CompleteWithoutWinner,
        _ => Decision::KeepRunning,
    }
}

/// Checks each of the user's running tests, declaring significant winners
/// and closing tests past their scheduled end.
pub async fn run(ctx: &JobContext, user_id: Uuid, opts: RunOptions) -> EngineResult<JobReport> {
    let tests = ab_tests::list(&ctx.pool, user_id, Some(TestStatus::Running)).await?;
    let mut report = JobReport::default();

    for test in &tests {
        report.examined += 1;
        let stats = ctx.aggregates.ab_test_stats(test.id).await?;
        let result = check_significance(test, &stats);
        let decision = decide(test, &result, opts.now);

        tracing::debug!(
            %user_id,
            test_id = %test.id,
            significant = result.significant,
            p_value = result.p_value,
            lift = result.lift,
            ?decision,
            "ab test checked"
        );

        if opts.dry_run || decision == Decision::KeepRunning {
            continue;
        }

        let outcome = match decision {
            Decision::DeclareWinner {
                variant_id,
                confidence,
            } => ab_tests::declare_winner(&ctx.pool, user_id, test.id, variant_id, Some(confidence))
                .await
                .map(|_| {
                    (
                        "ab_test_winner_declared",
                        json!({
                            "test_name": test.name,
                            "winner_variant_id": variant_id,
                            "confidence": confidence,
                            "lift": result.lift,
                            "p_value": result.p_value,
                        }),
                    )
                }),
            _ => ab_tests::transition(&ctx.pool, user_id, test.id, TestStatus::Completed)
                .await
                .map(|_| {
                    (
                        "ab_test_completed",
                        json!({
                            "test_name": test.name,
                            "reason": "scheduled end reached without a significant winner",
                        }),
                    )
                }),
        };

        match outcome {
            Ok((action, details)) => {
                ab_tests::log_activity(&ctx.pool, user_id, action, "ab_test", Some(test.id), details)
                    .await?;
                report.applied += 1;
            }
            // Someone else moved the test since it was listed.
            Err(EngineError::AlreadyProcessed { .. } | EngineError::InvalidState { .. }) => {
                report.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        %user_id,
        tests = report.examined,
        closed = report.applied,
        skipped = report.skipped,
        "ab significance pass finished"
    );
    Ok(report)
}
