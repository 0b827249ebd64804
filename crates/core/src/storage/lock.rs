use anyhow::Context;
use uuid::Uuid;

// Session-scoped advisory locks guard against overlapping batch runs of the
// same job for the same user. They are best effort: a crashed worker's lock
// goes away with its connection.
const LOCK_NAMESPACE: i64 = 0x4144_5049_4C54; // "ADPILT"

fn fold_uuid(id: Uuid) -> i64 {
    let (hi, lo) = id.as_u64_pair();
    (hi ^ lo) as i64
}

fn fold_str(s: &str) -> i64 {
    // FNV-1a; stable across builds, unlike `DefaultHasher`.
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in s.bytes() {
        h ^= u64::from(b);
        h = h.wrapping_mul(0x0100_0000_01b3);
    }
    h as i64
}

pub fn job_lock_key(job: &str, user_id: Uuid) -> i64 {
    LOCK_NAMESPACE ^ fold_str(job) ^ fold_uuid(user_id)
}

/// Key for the transaction-scoped lock serialising budget batches per user.
pub fn budget_batch_key(user_id: Uuid) -> i64 {
    job_lock_key("budget-batch", user_id)
}

/// Holds a session advisory lock on a dedicated connection until released.
pub struct JobLock {
    conn: sqlx::pool::PoolConnection<sqlx::Postgres>,
    key: i64,
}

impl JobLock {
    pub async fn release(mut self) -> anyhow::Result<()> {
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(self.key)
            .execute(&mut *self.conn)
            .await
            .with_context(|| format!("failed to release advisory lock (key={})", self.key))?;
        Ok(())
    }
}

/// `None` when another run already holds the lock.
pub async fn try_acquire_job_lock(
    pool: &sqlx::PgPool,
    job: &str,
    user_id: Uuid,
) -> anyhow::Result<Option<JobLock>> {
    let key = job_lock_key(job, user_id);
    let mut conn = pool
        .acquire()
        .await
        .context("failed to acquire connection for advisory lock")?;
    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("failed to acquire advisory lock (key={key})"))?;

    Ok(acquired.0.then_some(JobLock { conn, key }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_differ_per_job_and_user() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        assert_eq!(job_lock_key("content-mix", a), job_lock_key("content-mix", a));
        assert_ne!(job_lock_key("content-mix", a), job_lock_key("content-mix", b));
        assert_ne!(job_lock_key("content-mix", a), job_lock_key("creative-health", a));
    }
}
