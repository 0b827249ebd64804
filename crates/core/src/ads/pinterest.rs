use crate::ads::{AdAccount, AdClientFactory, AdPlatformClient};
use crate::config::Settings;
use crate::error::{EngineError, EngineResult};
use crate::storage::snapshots::pinterest_access_token;
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_BASE_URL: &str = "https://api.pinterest.com/v5";

/// Shared HTTP client; hands out a per-user [`PinterestAdsClient`] for each
/// connected access token.
#[derive(Debug, Clone)]
pub struct PinterestConnector {
    http: reqwest::Client,
    base_url: String,
}

impl PinterestConnector {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.ad_platform_timeout_secs))
            .build()
            .context("failed to build pinterest http client")?;

        Ok(Self {
            http,
            base_url: settings
                .pinterest_api_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    pub fn client(&self, access_token: impl Into<String>) -> PinterestAdsClient {
        PinterestAdsClient {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            access_token: access_token.into(),
        }
    }
}

/// Looks up each user's connected token before handing out a client.
#[derive(Debug, Clone)]
pub struct PinterestClientFactory {
    pool: sqlx::PgPool,
    connector: PinterestConnector,
}

impl PinterestClientFactory {
    pub fn new(pool: sqlx::PgPool, connector: PinterestConnector) -> Self {
        Self { pool, connector }
    }
}

#[async_trait::async_trait]
impl AdClientFactory for PinterestClientFactory {
    async fn for_user(&self, user_id: Uuid) -> EngineResult<Arc<dyn AdPlatformClient>> {
        let token = pinterest_access_token(&self.pool, user_id)
            .await?
            .ok_or_else(|| EngineError::Platform("Pinterest not connected".to_string()))?;
        Ok(Arc::new(self.connector.client(token)))
    }
}

#[derive(Debug, Clone)]
pub struct PinterestAdsClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Paged<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Serialize)]
struct CampaignPatch<'a> {
    id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    daily_spend_cap: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

impl PinterestAdsClient {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> anyhow::Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.access_token))
                .context("access token is not a valid header value")?,
        );
        Ok(headers)
    }

    async fn check(res: reqwest::Response) -> anyhow::Result<String> {
        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read pinterest response body")?;
        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| format!("Pinterest API error: {status}"));
            anyhow::bail!(message);
        }
        Ok(text)
    }

    /// Campaign updates are scoped to an ad account; the first one wins.
    async fn primary_ad_account(&self) -> anyhow::Result<String> {
        self.get_ad_accounts()
            .await?
            .into_iter()
            .next()
            .map(|a| a.id)
            .context("No ad account found")
    }

    async fn patch_campaign(&self, patch: CampaignPatch<'_>) -> anyhow::Result<()> {
        let account = self.primary_ad_account().await?;
        let res = self
            .http
            .patch(self.url(&format!("/ad_accounts/{account}/campaigns")))
            .headers(self.headers()?)
            .json(&[patch])
            .send()
            .await
            .context("pinterest campaign update request failed")?;
        Self::check(res).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AdPlatformClient for PinterestAdsClient {
    fn platform_name(&self) -> &'static str {
        "pinterest"
    }

    async fn get_ad_accounts(&self) -> anyhow::Result<Vec<AdAccount>> {
        let res = self
            .http
            .get(self.url("/ad_accounts"))
            .headers(self.headers()?)
            .send()
            .await
            .context("pinterest ad_accounts request failed")?;
        let text = Self::check(res).await?;
        let page = serde_json::from_str::<Paged<AdAccount>>(&text)
            .with_context(|| format!("failed to parse ad_accounts response: {text}"))?;
        Ok(page.items)
    }

    async fn pause_campaign(&self, campaign_id: &str) -> anyhow::Result<()> {
        self.patch_campaign(CampaignPatch {
            id: campaign_id,
            status: Some("PAUSED"),
            daily_spend_cap: None,
        })
        .await
    }

    async fn set_daily_budget(&self, campaign_id: &str, amount: i64) -> anyhow::Result<()> {
        self.patch_campaign(CampaignPatch {
            id: campaign_id,
            status: None,
            daily_spend_cap: Some(amount),
        })
        .await
    }
}
