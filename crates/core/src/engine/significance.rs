use crate::domain::ab_test::{
    AbTest, CreateTestInput, SignificanceResult, TrafficSplit, VariantComparison, VariantCounts,
    VariantStats, Winner, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_MIN_SAMPLE_SIZE,
};
use crate::error::{EngineError, EngineResult};
use crate::stats::{lift, two_proportion_z_test};
use uuid::Uuid;

/// Compares every test variant against the control on the test's primary
/// metric. A comparison is only significant when both arms reached the
/// minimum sample size.
///
/// The winner is the arm with the highest rate among the arms that won a
/// significant comparison (a control that significantly beats a variant is a
/// candidate too). The headline numbers come from the strongest significant
/// comparison, or from the best-performing variant when none is significant.
pub fn check_significance(test: &AbTest, stats: &[VariantStats]) -> SignificanceResult {
    let counts_for = |id: Uuid| -> VariantCounts {
        stats
            .iter()
            .find(|s| s.variant_id == id)
            .map(|s| test.primary_metric.counts(s))
            .unwrap_or_default()
    };

    let control = counts_for(test.control_variant_id);
    let alpha = 1.0 - test.confidence_threshold;
    let met = |c: &VariantCounts| c.trials >= test.min_sample_size;

    let arms: Vec<(Uuid, VariantCounts)> = test
        .test_variant_ids
        .iter()
        .map(|id| (*id, counts_for(*id)))
        .collect();

    let comparisons: Vec<VariantComparison> = arms
        .iter()
        .map(|(id, variant)| {
            let z = two_proportion_z_test(control, *variant);
            VariantComparison {
                variant_id: *id,
                z_score: z.z_score,
                p_value: z.p_value,
                lift: lift(control.rate(), variant.rate()),
                significant: met(&control) && met(variant) && z.p_value <= alpha,
            }
        })
        .collect();

    let sample_size_met = met(&control) && arms.iter().all(|(_, c)| met(c));

    let mut winner: Option<(Winner, f64)> = None;
    for cmp in comparisons.iter().filter(|c| c.significant) {
        let candidate = if cmp.z_score > 0.0 {
            let rate = arms
                .iter()
                .find(|(id, _)| *id == cmp.variant_id)
                .map(|(_, c)| c.rate())
                .unwrap_or_default();
            (Winner::Variant(cmp.variant_id), rate)
        } else {
            (Winner::Control, control.rate())
        };
        if winner.map_or(true, |(_, best)| candidate.1 > best) {
            winner = Some(candidate);
        }
    }

    let headline = match winner {
        Some((Winner::Variant(id), _)) => comparisons.iter().find(|c| c.variant_id == id),
        Some(_) => comparisons
            .iter()
            .filter(|c| c.significant)
            .min_by(|a, b| a.p_value.total_cmp(&b.p_value)),
        None => comparisons.iter().max_by(|a, b| a.lift.total_cmp(&b.lift)),
    };

    let (z_score, p_value, lift) = headline
        .map(|c| (c.z_score, c.p_value, c.lift))
        .unwrap_or((0.0, 1.0, 0.0));

    SignificanceResult {
        significant: winner.is_some(),
        p_value,
        z_score,
        confidence: 1.0 - p_value,
        lift,
        winner: winner.map_or(Winner::None, |(w, _)| w),
        sample_size_met,
        comparisons,
    }
}

/// Variant id to record for a declared winner.
pub fn winner_variant_id(test: &AbTest, winner: Winner) -> Option<Uuid> {
    match winner {
        Winner::None => None,
        Winner::Control => Some(test.control_variant_id),
        Winner::Variant(id) => Some(id),
    }
}

/// Validated parameters for a new draft test.
#[derive(Debug, Clone, PartialEq)]
pub struct TestPlan {
    pub traffic_split: TrafficSplit,
    pub min_sample_size: i64,
    pub confidence_threshold: f64,
}

pub fn plan_test(input: &CreateTestInput) -> EngineResult<TestPlan> {
    if input.name.trim().is_empty() {
        return Err(EngineError::InvalidInput("test name is required".into()));
    }
    if input.variants.is_empty() {
        return Err(EngineError::InvalidInput(
            "a test needs at least one variant besides the control".into(),
        ));
    }

    let confidence_threshold = input
        .confidence_threshold
        .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD);
    if !(confidence_threshold > 0.0 && confidence_threshold < 1.0) {
        return Err(EngineError::InvalidInput(format!(
            "confidence_threshold must be within (0, 1), got {confidence_threshold}"
        )));
    }

    let min_sample_size = input.minimum_sample_size.unwrap_or(DEFAULT_MIN_SAMPLE_SIZE);
    if min_sample_size < 1 {
        return Err(EngineError::InvalidInput(format!(
            "minimum_sample_size must be positive, got {min_sample_size}"
        )));
    }

    let traffic_split = match input.traffic_split {
        Some(split) if split.control < 0 || split.test < 0 || split.control + split.test != 100 => {
            return Err(EngineError::InvalidInput(format!(
                "traffic split must sum to 100 (got {} + {})",
                split.control, split.test
            )));
        }
        Some(split) => split,
        None => TrafficSplit::even(input.variants.len()),
    };

    Ok(TestPlan {
        traffic_split,
        min_sample_size,
        confidence_threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ab_test::{PrimaryMetric, TestStatus, VariantInput};

    const CONTROL: Uuid = Uuid::from_u128(1);
    const VAR_A: Uuid = Uuid::from_u128(2);
    const VAR_B: Uuid = Uuid::from_u128(3);

    fn test_with(variants: &[Uuid]) -> AbTest {
        AbTest {
            id: Uuid::from_u128(99),
            user_id: Uuid::from_u128(100),
            name: "Hero image".into(),
            hypothesis: None,
            status: TestStatus::Running,
            primary_metric: PrimaryMetric::Ctr,
            control_variant_id: CONTROL,
            test_variant_ids: variants.to_vec(),
            traffic_split: TrafficSplit::even(variants.len()),
            min_sample_size: DEFAULT_MIN_SAMPLE_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            started_at: None,
            ended_at: None,
            scheduled_end_at: None,
            winner_variant_id: None,
            winner_confidence: None,
        }
    }

    fn arm(id: Uuid, impressions: i64, clicks: i64) -> VariantStats {
        VariantStats {
            variant_id: id,
            variant_name: format!("arm-{}", id.as_u128()),
            is_control: id == CONTROL,
            total_impressions: impressions,
            total_clicks: clicks,
            ..Default::default()
        }
    }

    #[test]
    fn doubled_rate_wins_with_full_lift() {
        let t = test_with(&[VAR_A]);
        let r = check_significance(&t, &[arm(CONTROL, 200, 20), arm(VAR_A, 200, 40)]);
        assert!(r.significant);
        assert!(r.sample_size_met);
        assert_eq!(r.winner, Winner::Variant(VAR_A));
        assert!((r.lift - 100.0).abs() < 1e-9);
        assert!(r.p_value <= 0.05);
        assert!((r.confidence - (1.0 - r.p_value)).abs() < 1e-12);
    }

    #[test]
    fn identical_arms_are_not_significant() {
        let t = test_with(&[VAR_A]);
        let r = check_significance(&t, &[arm(CONTROL, 1000, 50), arm(VAR_A, 1000, 50)]);
        assert!(!r.significant);
        assert_eq!(r.winner, Winner::None);
        assert_eq!(r.z_score, 0.0);
        assert_eq!(r.p_value, 1.0);
    }

    #[test]
    fn small_samples_never_declare() {
        let t = test_with(&[VAR_A]);
        let r = check_significance(&t, &[arm(CONTROL, 99, 5), arm(VAR_A, 99, 40)]);
        assert!(!r.sample_size_met);
        assert!(!r.significant);
        assert!(r.comparisons[0].p_value < 0.05);
    }

    #[test]
    fn best_significant_variant_wins_among_many() {
        let t = test_with(&[VAR_A, VAR_B]);
        let r = check_significance(
            &t,
            &[
                arm(CONTROL, 1000, 20),
                arm(VAR_A, 1000, 45),
                arm(VAR_B, 1000, 60),
            ],
        );
        assert!(r.comparisons.iter().all(|c| c.significant));
        assert_eq!(r.winner, Winner::Variant(VAR_B));
        assert!((r.lift - 200.0).abs() < 1e-9);
    }

    #[test]
    fn control_can_win() {
        let t = test_with(&[VAR_A]);
        let r = check_significance(&t, &[arm(CONTROL, 500, 60), arm(VAR_A, 500, 20)]);
        assert_eq!(r.winner, Winner::Control);
        assert_eq!(winner_variant_id(&t, r.winner), Some(CONTROL));
        assert!(r.lift < 0.0);
    }

    #[test]
    fn missing_stats_are_treated_as_empty() {
        let t = test_with(&[VAR_A]);
        let r = check_significance(&t, &[]);
        assert!(!r.significant);
        assert_eq!(r.lift, 0.0);
        assert!(!r.lift.is_nan());
    }

    fn input(variants: usize) -> CreateTestInput {
        let v = |name: &str| VariantInput {
            name: name.into(),
            content_type: "pin".into(),
            content_id: format!("pin-{name}"),
            variant_config: serde_json::Value::Null,
        };
        CreateTestInput {
            name: "Headline".into(),
            hypothesis: None,
            test_type: "creative".into(),
            primary_metric: PrimaryMetric::SaveRate,
            confidence_threshold: None,
            minimum_sample_size: None,
            scheduled_end_at: None,
            control: v("control"),
            variants: (0..variants).map(|i| v(&format!("v{i}"))).collect(),
            traffic_split: None,
        }
    }

    #[test]
    fn plan_applies_defaults_and_even_split() {
        let plan = plan_test(&input(2)).unwrap();
        assert_eq!(plan.min_sample_size, 100);
        assert_eq!(plan.confidence_threshold, 0.95);
        assert_eq!(plan.traffic_split, TrafficSplit { control: 33, test: 67 });
    }

    #[test]
    fn plan_rejects_bad_input() {
        assert!(matches!(plan_test(&input(0)), Err(EngineError::InvalidInput(_))));

        let mut bad_split = input(1);
        bad_split.traffic_split = Some(TrafficSplit { control: 60, test: 60 });
        assert!(matches!(plan_test(&bad_split), Err(EngineError::InvalidInput(_))));

        let mut bad_threshold = input(1);
        bad_threshold.confidence_threshold = Some(1.0);
        assert!(plan_test(&bad_threshold).is_err());
    }
}
