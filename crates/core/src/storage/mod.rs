pub mod actions;
pub mod aggregates;
pub mod creative_health;
pub mod lock;
pub mod pillars;
pub mod recommendations;
pub mod rules;
pub mod snapshots;

use anyhow::Context;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}
