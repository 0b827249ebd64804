use crate::domain::rule::{default_rules, Rule, RuleRow};
use crate::error::EngineResult;
use anyhow::Context;
use uuid::Uuid;

/// Active rules in evaluation order. Rows that no longer decode (unknown
/// metric, broken thresholds) are skipped with a warning.
pub async fn active_rules(pool: &sqlx::PgPool, user_id: Uuid) -> EngineResult<Vec<Rule>> {
    let rows: Vec<RuleRow> = sqlx::query_as(
        "SELECT id, name, metric, comparison, threshold_value, threshold_min, threshold_max, \
         action_type, action_config, min_spend, min_days_active, min_conversions, priority \
         FROM performance_rules WHERE user_id = $1 AND is_active ORDER BY priority ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("select performance_rules failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let rule_id = row.id;
        match Rule::try_from(row) {
            Ok(rule) => out.push(rule),
            Err(err) => tracing::warn!(%user_id, %rule_id, error = %err, "skipping undecodable rule"),
        }
    }
    Ok(out)
}

/// Gives a user the default rule set unless they already have rules.
/// Returns how many rules were created.
pub async fn seed_default_rules(pool: &sqlx::PgPool, user_id: Uuid) -> EngineResult<usize> {
    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let existing: i64 = sqlx::query_scalar("SELECT count(*) FROM performance_rules WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await
        .context("count performance_rules failed")?;
    if existing > 0 {
        return Ok(0);
    }

    let rules = default_rules();
    for rule in &rules {
        insert_rule(&mut tx, user_id, rule).await?;
    }

    tx.commit().await.context("commit transaction failed")?;
    tracing::info!(%user_id, count = rules.len(), "seeded default rules");
    Ok(rules.len())
}

pub async fn insert_rule(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    rule: &Rule,
) -> anyhow::Result<()> {
    let (value, min, max) = rule.comparison.thresholds();
    sqlx::query(
        "INSERT INTO performance_rules (id, user_id, name, metric, comparison, threshold_value, \
         threshold_min, threshold_max, action_type, action_config, min_spend, min_days_active, \
         min_conversions, priority) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
    )
    .bind(rule.id)
    .bind(user_id)
    .bind(&rule.name)
    .bind(rule.metric.as_str())
    .bind(rule.comparison.as_str())
    .bind(value)
    .bind(min)
    .bind(max)
    .bind(rule.action_type.as_str())
    .bind(sqlx::types::Json(rule.action_config))
    .bind(rule.guard.min_spend)
    .bind(rule.guard.min_days_active)
    .bind(rule.guard.min_conversions)
    .bind(rule.priority)
    .execute(&mut **tx)
    .await
    .context("insert performance_rules failed")?;
    Ok(())
}
