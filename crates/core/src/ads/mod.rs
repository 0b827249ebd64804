pub mod pinterest;

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdAccount {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Side effect on the ad platform. Amounts are already in platform units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlatformAction {
    Pause,
    SetDailyBudget { amount: i64 },
}

#[async_trait::async_trait]
pub trait AdPlatformClient: Send + Sync {
    fn platform_name(&self) -> &'static str;

    async fn get_ad_accounts(&self) -> anyhow::Result<Vec<AdAccount>>;

    async fn pause_campaign(&self, campaign_id: &str) -> anyhow::Result<()>;

    async fn set_daily_budget(&self, campaign_id: &str, amount: i64) -> anyhow::Result<()>;
}

/// Resolves the ad-platform client acting on behalf of one user.
#[async_trait::async_trait]
pub trait AdClientFactory: Send + Sync {
    async fn for_user(&self, user_id: Uuid) -> EngineResult<Arc<dyn AdPlatformClient>>;
}

pub fn to_platform_units(amount: f64, multiplier: f64) -> i64 {
    (amount * multiplier).round() as i64
}

/// Runs `action` once. Failures surface as [`EngineError::Platform`] with the
/// platform's message intact.
pub async fn execute(
    client: &dyn AdPlatformClient,
    campaign_id: &str,
    action: PlatformAction,
) -> Result<(), EngineError> {
    let res = match action {
        PlatformAction::Pause => client.pause_campaign(campaign_id).await,
        PlatformAction::SetDailyBudget { amount } => {
            client.set_daily_budget(campaign_id, amount).await
        }
    };
    res.map_err(|e| {
        tracing::warn!(
            platform = client.platform_name(),
            campaign_id,
            ?action,
            error = %e,
            "ad platform call failed"
        );
        EngineError::platform(&e)
    })
}
