pub mod ads;
pub mod domain;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod scoring;
pub mod stats;
pub mod storage;
pub mod time;

pub use error::{EngineError, EngineResult};

pub mod config {
    use anyhow::Context;

    const DEFAULT_AD_PLATFORM_TIMEOUT_SECS: u64 = 20;
    const DEFAULT_WORKER_CONCURRENCY: usize = 8;
    const DEFAULT_PORT: u16 = 3000;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub pinterest_api_base_url: Option<String>,
        pub ad_platform_timeout_secs: u64,
        pub worker_concurrency: usize,
        pub port: u16,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let ad_platform_timeout_secs = match std::env::var("AD_PLATFORM_TIMEOUT_SECS") {
                Ok(s) => s
                    .trim()
                    .parse::<u64>()
                    .with_context(|| format!("invalid AD_PLATFORM_TIMEOUT_SECS: {s}"))?,
                Err(_) => DEFAULT_AD_PLATFORM_TIMEOUT_SECS,
            };
            let worker_concurrency = std::env::var("WORKER_CONCURRENCY")
                .ok()
                .and_then(|s| s.trim().parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_WORKER_CONCURRENCY);
            let port = std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PORT);

            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                pinterest_api_base_url: std::env::var("PINTEREST_API_BASE_URL")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                ad_platform_timeout_secs,
                worker_concurrency,
                port,
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }
    }
}
