//! Store-level behaviour against a real Postgres. Skipped unless
//! `TEST_DATABASE_URL` is set.

mod common;

use adpilot_core::ads::PlatformAction;
use adpilot_core::domain::ab_test::{
    CreateTestInput, DailyResult, PrimaryMetric, TestStatus, VariantInput, Winner,
};
use adpilot_core::domain::creative::{ContentType, CreativeMetrics, HealthStatus};
use adpilot_core::domain::recommendation::{Guardrails, RecommendationStatus, RecommendationType};
use adpilot_core::engine::budget::generate_recommendations;
use adpilot_core::engine::config::{BudgetThresholds, FatigueConfig};
use adpilot_core::engine::significance::{check_significance, plan_test};
use adpilot_core::storage::aggregates::{AggregateSource, ManualAggregation, StoredFunctions};
use adpilot_core::storage::{ab_tests, creative_health, lock, recommendations, snapshots};
use adpilot_core::EngineError;
use chrono::{NaiveDate, Utc};
use common::{FixedFactory, RecordingClient};
use std::time::Duration;
use uuid::Uuid;

macro_rules! require_db {
    () => {
        if !common::has_test_db() {
            eprintln!("Skipping: TEST_DATABASE_URL not set");
            return;
        }
    };
}

/// One campaign with CPA $6 over the last week, which earns an increase.
async fn scaling_campaign(pool: &sqlx::PgPool, user_id: Uuid) -> Uuid {
    let campaign_id = common::insert_campaign(pool, user_id, "Spring Sale", 20.0).await;
    common::insert_week_of_metrics(pool, campaign_id, Utc::now().date_naive(), 60.0, 10).await;
    campaign_id
}

async fn generate_and_store(pool: &sqlx::PgPool, user_id: Uuid) -> (Vec<Uuid>, u64) {
    let perf = snapshots::campaign_performance(pool, user_id, Utc::now().date_naive())
        .await
        .unwrap();
    let recs = generate_recommendations(
        &perf,
        &Guardrails::default(),
        &BudgetThresholds::default(),
        Utc::now(),
    );
    let superseded = recommendations::replace_pending(pool, user_id, &recs)
        .await
        .unwrap();
    (recs.iter().map(|r| r.id).collect(), superseded)
}

#[tokio::test]
async fn second_batch_supersedes_the_first() {
    require_db!();
    let pool = common::test_pool().await;
    let user_id = Uuid::new_v4();
    let campaign_id = scaling_campaign(&pool, user_id).await;

    let (first, superseded) = generate_and_store(&pool, user_id).await;
    assert_eq!(first.len(), 1);
    assert_eq!(superseded, 0);

    let (second, superseded) = generate_and_store(&pool, user_id).await;
    assert_eq!(superseded, 1);
    assert_eq!(common::pending_count(&pool, campaign_id).await, 1);

    let pending = recommendations::pending(&pool, user_id).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, second[0]);
    assert_eq!(pending[0].recommendation_type, RecommendationType::Increase);
    assert_eq!(pending[0].campaign_name, "Spring Sale");

    let history = recommendations::history(&pool, user_id, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, first[0]);
    assert_eq!(history[0].status, RecommendationStatus::Superseded);
}

#[tokio::test]
async fn overlapping_batches_leave_one_pending() {
    require_db!();
    let pool = common::test_pool().await;
    let user_id = Uuid::new_v4();
    let campaign_id = scaling_campaign(&pool, user_id).await;

    let (a, b) = tokio::join!(
        generate_and_store(&pool, user_id),
        generate_and_store(&pool, user_id)
    );
    assert_eq!(a.1 + b.1, 1);
    assert_eq!(common::pending_count(&pool, campaign_id).await, 1);
}

#[tokio::test]
async fn concurrent_applies_call_the_platform_once() {
    require_db!();
    let pool = common::test_pool().await;
    let user_id = Uuid::new_v4();
    let campaign_id = scaling_campaign(&pool, user_id).await;
    let (ids, _) = generate_and_store(&pool, user_id).await;
    let id = ids[0];

    let factory = FixedFactory::new(RecordingClient {
        delay: Some(Duration::from_millis(100)),
        ..Default::default()
    });
    let cfg = BudgetThresholds::default();

    let (a, b) = tokio::join!(
        recommendations::apply(&pool, &factory, &cfg, user_id, id),
        recommendations::apply(&pool, &factory, &cfg, user_id, id)
    );
    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(EngineError::AlreadyProcessed { .. }))));
    assert_eq!(factory.client.call_count(), 1);

    let applied = outcomes.into_iter().find_map(Result::ok).unwrap();
    let Some(PlatformAction::SetDailyBudget { amount }) = applied.action else {
        panic!("expected a budget change, got {:?}", applied.action);
    };
    assert_eq!(amount, 25_000_000);

    let budget: f64 = sqlx::query_scalar("SELECT daily_budget FROM ad_campaigns WHERE id = $1")
        .bind(campaign_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert!((budget - 25.0).abs() < 1e-9);
}

#[tokio::test]
async fn platform_failure_leaves_recommendation_pending() {
    require_db!();
    let pool = common::test_pool().await;
    let user_id = Uuid::new_v4();
    let campaign_id = scaling_campaign(&pool, user_id).await;
    let (ids, _) = generate_and_store(&pool, user_id).await;

    let factory = FixedFactory::new(RecordingClient {
        fail_with: Some("Campaign is archived".into()),
        ..Default::default()
    });
    let err = recommendations::apply(&pool, &factory, &BudgetThresholds::default(), user_id, ids[0])
        .await
        .unwrap_err();
    match err {
        EngineError::Platform(msg) => assert!(msg.contains("Campaign is archived"), "{msg}"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(common::pending_count(&pool, campaign_id).await, 1);
}

#[tokio::test]
async fn other_users_recommendations_are_not_found() {
    require_db!();
    let pool = common::test_pool().await;
    let owner = Uuid::new_v4();
    scaling_campaign(&pool, owner).await;
    let (ids, _) = generate_and_store(&pool, owner).await;

    let factory = FixedFactory::new(RecordingClient::default());
    let err = recommendations::apply(
        &pool,
        &factory,
        &BudgetThresholds::default(),
        Uuid::new_v4(),
        ids[0],
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }), "{err:?}");
    assert_eq!(factory.client.call_count(), 0);
}

#[tokio::test]
async fn rejecting_twice_is_already_processed() {
    require_db!();
    let pool = common::test_pool().await;
    let user_id = Uuid::new_v4();
    scaling_campaign(&pool, user_id).await;
    let (ids, _) = generate_and_store(&pool, user_id).await;

    recommendations::reject(&pool, user_id, ids[0], Some("holiday freeze"))
        .await
        .unwrap();
    let err = recommendations::reject(&pool, user_id, ids[0], None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyProcessed { .. }), "{err:?}");
    assert!(recommendations::pending(&pool, user_id).await.unwrap().is_empty());
}

fn variant(name: &str) -> VariantInput {
    VariantInput {
        name: name.into(),
        content_type: "pin".into(),
        content_id: format!("pin-{name}"),
        variant_config: serde_json::json!({}),
    }
}

fn day(n: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 1).unwrap() + chrono::Days::new(u64::from(n))
}

#[tokio::test]
async fn ab_test_lifecycle() {
    require_db!();
    let pool = common::test_pool().await;
    let user_id = Uuid::new_v4();

    let input = CreateTestInput {
        name: "Lifestyle vs studio".into(),
        hypothesis: Some("Lifestyle imagery lifts CTR".into()),
        test_type: "creative".into(),
        primary_metric: PrimaryMetric::Ctr,
        confidence_threshold: None,
        minimum_sample_size: None,
        scheduled_end_at: None,
        control: variant("studio"),
        variants: vec![variant("lifestyle")],
        traffic_split: None,
    };
    let plan = plan_test(&input).unwrap();
    let test = ab_tests::create(&pool, user_id, &input, &plan).await.unwrap();
    assert_eq!(test.status, TestStatus::Draft);
    let control = test.control_variant_id;
    let lifestyle = test.test_variant_ids[0];

    let result = |impressions, clicks| DailyResult {
        result_date: day(1),
        impressions,
        clicks,
        ..Default::default()
    };

    let err = ab_tests::record_results(&pool, user_id, test.id, control, &result(200, 20))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState { .. }), "{err:?}");

    let err = ab_tests::transition(&pool, user_id, test.id, TestStatus::Completed)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState { .. }), "{err:?}");

    let running = ab_tests::transition(&pool, user_id, test.id, TestStatus::Running)
        .await
        .unwrap();
    assert!(running.started_at.is_some());

    ab_tests::record_results(&pool, user_id, test.id, control, &result(200, 20))
        .await
        .unwrap();
    ab_tests::record_results(&pool, user_id, test.id, lifestyle, &result(150, 10))
        .await
        .unwrap();
    // Same day again raises the counters.
    ab_tests::record_results(&pool, user_id, test.id, lifestyle, &result(200, 40))
        .await
        .unwrap();
    // A stale re-post cannot lower them.
    ab_tests::record_results(&pool, user_id, test.id, lifestyle, &result(100, 5))
        .await
        .unwrap();

    let mut stored = StoredFunctions::new(pool.clone())
        .ab_test_stats(test.id)
        .await
        .unwrap();
    let mut manual = ManualAggregation::new(pool.clone())
        .ab_test_stats(test.id)
        .await
        .unwrap();
    stored.sort_by_key(|s| s.variant_id);
    manual.sort_by_key(|s| s.variant_id);
    assert_eq!(stored, manual);
    let lifestyle_stats = stored.iter().find(|s| s.variant_id == lifestyle).unwrap();
    assert_eq!(lifestyle_stats.total_impressions, 200);
    assert_eq!(lifestyle_stats.total_clicks, 40);

    let sig = check_significance(&running, &stored);
    assert!(sig.significant);
    assert_eq!(sig.winner, Winner::Variant(lifestyle));

    let done = ab_tests::declare_winner(&pool, user_id, test.id, lifestyle, Some(sig.confidence))
        .await
        .unwrap();
    assert_eq!(done.status, TestStatus::Completed);
    assert_eq!(done.winner_variant_id, Some(lifestyle));

    let err = ab_tests::declare_winner(&pool, user_id, test.id, control, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyProcessed { .. }), "{err:?}");

    let err = ab_tests::delete_draft(&pool, user_id, test.id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState { .. }), "{err:?}");
}

#[tokio::test]
async fn creative_baseline_is_captured_once() {
    require_db!();
    let pool = common::test_pool().await;
    let user_id = Uuid::new_v4();
    let cfg = FatigueConfig::default();
    let metrics = CreativeMetrics {
        ctr: 0.02,
        engagement_rate: 0.03,
        save_rate: 0.01,
        impressions: 200,
    };

    let mut captured_at = None;
    for n in 0..10 {
        let h = creative_health::update_creative_health(
            &pool,
            user_id,
            ContentType::Pin,
            "pin-42",
            day(n),
            metrics,
            &cfg,
        )
        .await
        .unwrap();
        if n < 6 {
            assert_eq!(h.status, HealthStatus::PendingBaseline);
            assert!(h.baseline.is_none());
        } else {
            // Postgres keeps microseconds.
            let at = h.baseline.map(|b| b.captured_at.timestamp_micros());
            assert!(at.is_some());
            if captured_at.is_none() {
                captured_at = at;
            }
            assert_eq!(at, captured_at);
            assert_eq!(h.status, HealthStatus::Healthy);
        }
    }

    let stored = StoredFunctions::new(pool.clone())
        .creative_health_summary(user_id)
        .await
        .unwrap();
    let manual = ManualAggregation::new(pool.clone())
        .creative_health_summary(user_id)
        .await
        .unwrap();
    assert_eq!(stored, manual);
    assert_eq!(stored.total_tracked, 1);
    assert_eq!(stored.healthy, 1);

    let refreshed = creative_health::mark_refreshed(&pool, user_id, ContentType::Pin, "pin-42")
        .await
        .unwrap();
    assert_eq!(refreshed.refresh_count, 1);
    assert!(refreshed.last_refresh_at.is_some());
    assert_eq!(refreshed.status, HealthStatus::PendingBaseline);
    assert!(refreshed.baseline.is_none());
}

#[tokio::test]
async fn refreshing_unknown_content_is_not_found() {
    require_db!();
    let pool = common::test_pool().await;
    let err = creative_health::mark_refreshed(&pool, Uuid::new_v4(), ContentType::Asset, "nope")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }), "{err:?}");
}

#[tokio::test]
async fn job_lock_is_exclusive_until_released() {
    require_db!();
    let pool = common::test_pool().await;
    let user_id = Uuid::new_v4();

    let held = lock::try_acquire_job_lock(&pool, "content-mix", user_id)
        .await
        .unwrap()
        .expect("first acquire");
    assert!(lock::try_acquire_job_lock(&pool, "content-mix", user_id)
        .await
        .unwrap()
        .is_none());
    assert!(lock::try_acquire_job_lock(&pool, "creative-health", user_id)
        .await
        .unwrap()
        .is_some());

    held.release().await.unwrap();
    assert!(lock::try_acquire_job_lock(&pool, "content-mix", user_id)
        .await
        .unwrap()
        .is_some());
}
