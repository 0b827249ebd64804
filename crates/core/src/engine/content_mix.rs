use crate::domain::pillar::{
    ContentItemMetrics, ContentPillar, GapAction, GapDirection, MixReasoning, MixRecommendation,
    PillarPerformance, Priority,
};
use crate::engine::config::MixConfig;
use crate::scoring::{mean, pillar_score, volume_confidence};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use uuid::Uuid;

pub const PLATFORM: &str = "pinterest";

/// Per-pillar aggregates for one period. Items without a pillar are ignored,
/// including for the share computation.
pub fn aggregate_pillar_performance(
    pillars: &[ContentPillar],
    items: &[ContentItemMetrics],
) -> Vec<PillarPerformance> {
    let mut by_pillar: HashMap<Uuid, Vec<&ContentItemMetrics>> = HashMap::new();
    for item in items {
        if let Some(pillar_id) = item.pillar_id {
            by_pillar.entry(pillar_id).or_default().push(item);
        }
    }
    let tagged: usize = by_pillar.values().map(Vec::len).sum();

    pillars
        .iter()
        .filter_map(|p| {
            let items = by_pillar.get(&p.id)?;
            let count = items.len() as i64;
            let rated: Vec<_> = items.iter().filter(|i| i.impressions > 0).collect();
            let winner_count = items.iter().filter(|i| i.is_winner).count() as i64;

            Some(PillarPerformance {
                pillar_id: p.id,
                content_count: count,
                impressions: items.iter().map(|i| i.impressions).sum(),
                clicks: items.iter().map(|i| i.clicks).sum(),
                saves: items.iter().map(|i| i.saves).sum(),
                avg_ctr: (!rated.is_empty())
                    .then(|| mean(rated.iter().map(|i| i.clicks as f64 / i.impressions as f64))),
                avg_save_rate: (!rated.is_empty())
                    .then(|| mean(rated.iter().map(|i| i.saves as f64 / i.impressions as f64))),
                winner_count,
                winner_percentage: Some(winner_count as f64 / count as f64 * 100.0),
                current_percentage: Some(count as f64 / tagged as f64 * 100.0),
            })
        })
        .collect()
}

/// One recommendation per pillar whose percentages sum to 100. Without any
/// performance data the pillars' static defaults are returned unchanged.
pub fn recommend_mix(
    pillars: &[ContentPillar],
    performance: &[PillarPerformance],
    cfg: &MixConfig,
    now: DateTime<Utc>,
) -> Vec<MixRecommendation> {
    if performance.is_empty() {
        return pillars
            .iter()
            .map(|p| MixRecommendation {
                pillar_id: p.id,
                pillar_name: p.name.clone(),
                platform: PLATFORM.to_string(),
                recommended_percentage: p.recommended_percentage,
                current_percentage: None,
                reasoning: MixReasoning {
                    primary: "Default recommendation based on industry best practices".into(),
                    factors: vec!["No historical data available yet".into()],
                    action: None,
                },
                confidence_score: 50,
                generated_at: now,
                valid_until: None,
            })
            .collect();
    }

    let scored: HashMap<Uuid, (f64, &PillarPerformance)> = performance
        .iter()
        .map(|perf| {
            let score = pillar_score(
                perf.avg_ctr.unwrap_or(0.0),
                perf.avg_save_rate.unwrap_or(0.0),
                perf.winner_percentage.unwrap_or(0.0),
                &cfg.weights,
            );
            (perf.pillar_id, (score, perf))
        })
        .collect();
    let avg = mean(scored.values().map(|(s, _)| *s));

    let mut out: Vec<MixRecommendation> = pillars
        .iter()
        .map(|pillar| {
            let (score, perf) = match scored.get(&pillar.id) {
                Some((s, p)) => (*s, Some(*p)),
                None => (0.0, None),
            };
            let current = perf.and_then(|p| p.current_percentage).unwrap_or(0.0);
            let count = perf.map_or(0, |p| p.content_count);

            let (recommended, reasoning, confidence) = if count < cfg.min_content_for_confidence {
                (
                    pillar.recommended_percentage.max(cfg.exploration_percentage),
                    MixReasoning {
                        primary: "Insufficient data for optimization".into(),
                        factors: vec![
                            format!("Only {count} pieces of content in this pillar"),
                            format!(
                                "Need at least {} for confident recommendations",
                                cfg.min_content_for_confidence
                            ),
                        ],
                        action: Some("Increase testing of this content type".into()),
                    },
                    40,
                )
            } else if score > avg * cfg.high_performer_ratio {
                let mut factors = Vec::new();
                if let Some(ctr) = perf.and_then(|p| p.avg_ctr).filter(|v| *v > 0.0) {
                    factors.push(format!("CTR: {:.2}%", ctr * 100.0));
                }
                if let Some(sr) = perf.and_then(|p| p.avg_save_rate).filter(|v| *v > 0.0) {
                    factors.push(format!("Save rate: {:.2}%", sr * 100.0));
                }
                if let Some(w) = perf.map(|p| p.winner_count).filter(|w| *w > 0) {
                    factors.push(format!("{w} winners"));
                }
                (
                    ((current * 1.25).round() as i32).min(cfg.max_percentage),
                    MixReasoning {
                        primary: format!(
                            "High performer - {}% above average",
                            ((score / avg - 1.0) * 100.0).round()
                        ),
                        factors,
                        action: Some("Increase content production in this pillar".into()),
                    },
                    volume_confidence(70, count, 95),
                )
            } else if score < avg * cfg.low_performer_ratio {
                let below = if avg > 0.0 { (1.0 - score / avg) * 100.0 } else { 0.0 };
                (
                    ((current * 0.75).round() as i32).max(cfg.min_percentage),
                    MixReasoning {
                        primary: format!("Underperforming - {}% below average", below.round()),
                        factors: vec![
                            "Consider refreshing creative approach".into(),
                            "Review timing and targeting".into(),
                        ],
                        action: Some("Reduce allocation, focus on quality over quantity".into()),
                    },
                    volume_confidence(60, count, 85),
                )
            } else {
                (
                    pillar.recommended_percentage,
                    MixReasoning {
                        primary: "Performing at expected levels".into(),
                        factors: vec!["Maintain current allocation".into()],
                        action: None,
                    },
                    volume_confidence(65, count, 90),
                )
            };

            MixRecommendation {
                pillar_id: pillar.id,
                pillar_name: pillar.name.clone(),
                platform: PLATFORM.to_string(),
                recommended_percentage: recommended.clamp(cfg.min_percentage, cfg.max_percentage),
                current_percentage: Some(current.round() as i32),
                reasoning,
                confidence_score: confidence,
                generated_at: now,
                valid_until: Some(now + Duration::days(cfg.validity_days)),
            }
        })
        .collect();

    normalize(&mut out);
    out
}

/// Rescales to a total of exactly 100 using largest remainders, so each value
/// is its proportional share rounded up or down.
fn normalize(recs: &mut [MixRecommendation]) {
    let total: i64 = recs.iter().map(|r| i64::from(r.recommended_percentage)).sum();
    if total <= 0 {
        return;
    }

    let mut remainders: Vec<(usize, i64)> = Vec::with_capacity(recs.len());
    let mut assigned = 0i64;
    for (i, r) in recs.iter_mut().enumerate() {
        let scaled = i64::from(r.recommended_percentage) * 100;
        r.recommended_percentage = (scaled / total) as i32;
        assigned += scaled / total;
        remainders.push((i, scaled % total));
    }

    remainders.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    for (i, _) in remainders.into_iter().take((100 - assigned).max(0) as usize) {
        recs[i].recommended_percentage += 1;
    }
}

/// What to do about the gap between recommended and current share, most
/// urgent first.
pub fn gap_actions(recs: &[MixRecommendation]) -> Vec<GapAction> {
    let mut out: Vec<GapAction> = recs
        .iter()
        .map(|r| {
            let gap = r.recommended_percentage - r.current_percentage.unwrap_or(0);
            let name = &r.pillar_name;
            let (action, priority, suggestion) = match gap {
                g if g > 10 => (
                    GapDirection::Increase,
                    Priority::High,
                    format!("Create {} more {name} posts this week", (g + 4) / 5),
                ),
                g if g > 5 => (
                    GapDirection::Increase,
                    Priority::Medium,
                    format!("Slightly increase {name} content"),
                ),
                g if g < -10 => (
                    GapDirection::Decrease,
                    Priority::High,
                    format!("Reduce {name} content and reallocate to higher performers"),
                ),
                g if g < -5 => (
                    GapDirection::Decrease,
                    Priority::Medium,
                    format!("Consider reducing {name} frequency"),
                ),
                _ => (
                    GapDirection::Maintain,
                    Priority::Low,
                    format!("{name} mix is on target"),
                ),
            };
            GapAction {
                pillar_id: r.pillar_id,
                pillar_name: name.clone(),
                action,
                gap,
                priority,
                suggestion,
            }
        })
        .collect();

    out.sort_by_key(|a| a.priority);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 0, 0, 0).unwrap()
    }

    fn pillars() -> Vec<ContentPillar> {
        [
            ("Product showcase", 25),
            ("Lifestyle", 20),
            ("How-to", 20),
            ("Behind the scenes", 15),
            ("User content", 10),
            ("Seasonal", 10),
        ]
        .iter()
        .enumerate()
        .map(|(i, (name, pct))| ContentPillar {
            id: Uuid::from_u128(i as u128 + 1),
            name: name.to_string(),
            description: None,
            recommended_percentage: *pct,
            display_order: i as i32,
        })
        .collect()
    }

    fn perf(pillar: u128, count: i64, ctr: f64, save_rate: f64, winners: f64, share: f64) -> PillarPerformance {
        PillarPerformance {
            pillar_id: Uuid::from_u128(pillar),
            content_count: count,
            avg_ctr: Some(ctr),
            avg_save_rate: Some(save_rate),
            winner_percentage: Some(winners),
            current_percentage: Some(share),
            ..Default::default()
        }
    }

    fn total(recs: &[MixRecommendation]) -> i32 {
        recs.iter().map(|r| r.recommended_percentage).sum()
    }

    #[test]
    fn no_data_returns_defaults() {
        let recs = recommend_mix(&pillars(), &[], &MixConfig::default(), now());
        assert_eq!(recs.len(), 6);
        assert!(recs.iter().all(|r| r.confidence_score == 50));
        assert_eq!(recs[0].recommended_percentage, 25);
        assert_eq!(recs[0].valid_until, None);
    }

    #[test]
    fn high_and_low_performers_move_and_sum_to_100() {
        let data = vec![
            perf(1, 12, 0.05, 0.04, 40.0, 30.0),
            perf(2, 10, 0.01, 0.01, 10.0, 20.0),
            perf(3, 8, 0.002, 0.001, 0.0, 20.0),
            perf(4, 6, 0.01, 0.01, 10.0, 10.0),
            perf(5, 2, 0.01, 0.01, 0.0, 10.0),
            perf(6, 5, 0.01, 0.01, 10.0, 10.0),
        ];
        let recs = recommend_mix(&pillars(), &data, &MixConfig::default(), now());
        assert_eq!(total(&recs), 100);

        let by = |id: u128| recs.iter().find(|r| r.pillar_id == Uuid::from_u128(id)).unwrap();
        assert!(by(1).reasoning.primary.starts_with("High performer"));
        assert_eq!(by(1).confidence_score, 94);
        assert!(by(3).reasoning.primary.starts_with("Underperforming"));
        assert_eq!(by(3).confidence_score, 76);
        assert_eq!(by(5).confidence_score, 40);
        assert_eq!(by(5).reasoning.primary, "Insufficient data for optimization");
        assert!(by(1).recommended_percentage > by(3).recommended_percentage);
    }

    #[test]
    fn normalization_always_hits_100() {
        let cfg = MixConfig::default();
        for seed in 0..50u32 {
            let data: Vec<_> = (1..=6u128)
                .map(|p| {
                    let k = f64::from((seed * 7 + p as u32 * 13) % 17);
                    perf(p, 3 + (k as i64 % 9), 0.002 * k, 0.001 * k, k * 2.0, 5.0 + k)
                })
                .collect();
            let recs = recommend_mix(&pillars(), &data, &cfg, now());
            assert_eq!(total(&recs), 100, "seed {seed}");
        }
    }

    #[test]
    fn aggregation_computes_shares() {
        let pillars = pillars();
        let item = |pillar: Option<u128>, imp: i64, clicks: i64, winner: bool| ContentItemMetrics {
            content_id: Uuid::new_v4(),
            pillar_id: pillar.map(Uuid::from_u128),
            impressions: imp,
            clicks,
            saves: clicks / 2,
            is_winner: winner,
        };
        let items = vec![
            item(Some(1), 1000, 20, true),
            item(Some(1), 1000, 40, false),
            item(Some(2), 0, 0, false),
            item(Some(2), 500, 5, false),
            item(None, 900, 9, true),
        ];
        let agg = aggregate_pillar_performance(&pillars, &items);
        assert_eq!(agg.len(), 2);

        let p1 = &agg[0];
        assert_eq!(p1.content_count, 2);
        assert!((p1.avg_ctr.unwrap() - 0.03).abs() < 1e-12);
        assert_eq!(p1.winner_percentage, Some(50.0));
        assert_eq!(p1.current_percentage, Some(50.0));

        let p2 = &agg[1];
        assert!((p2.avg_ctr.unwrap() - 0.01).abs() < 1e-12);
        assert_eq!(p2.impressions, 500);
    }

    #[test]
    fn gaps_are_prioritized() {
        let rec = |id: u128, recommended: i32, current: i32| MixRecommendation {
            pillar_id: Uuid::from_u128(id),
            pillar_name: format!("P{id}"),
            platform: PLATFORM.into(),
            recommended_percentage: recommended,
            current_percentage: Some(current),
            reasoning: MixReasoning::default(),
            confidence_score: 60,
            generated_at: now(),
            valid_until: None,
        };
        let actions = gap_actions(&[rec(1, 20, 18), rec(2, 30, 12), rec(3, 10, 17), rec(4, 5, 25)]);
        let order: Vec<_> = actions.iter().map(|a| (a.gap, a.priority)).collect();
        assert_eq!(
            order,
            vec![
                (18, Priority::High),
                (-20, Priority::High),
                (-7, Priority::Medium),
                (2, Priority::Low),
            ]
        );
        assert_eq!(actions[0].suggestion, "Create 4 more P2 posts this week");
        assert_eq!(actions[2].action, GapDirection::Decrease);
    }
}
