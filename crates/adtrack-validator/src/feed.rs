// crates/adtrack-validator/src/feed.rs

use {
    crate::error::{Result, ValidatorError},
    adtrack_common::{config::Setting, types::CampaignType},
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    std::time::Duration,
    tracing::debug,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedCampaign {
    pub id: String,
    #[serde(rename = "type")]
    pub campaign_type: CampaignType,
    /// Days a sale may still be refunded.
    #[serde(default)]
    pub refund_period_days: Option<u64>,
}

/// One pull of the authoritative campaign and settings feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSnapshot {
    pub result: bool,
    #[serde(default)]
    pub active_miners: Vec<String>,
    #[serde(default)]
    pub active_validators: Vec<String>,
    #[serde(default)]
    pub campaigns: Vec<FeedCampaign>,
    #[serde(default)]
    pub settings: Vec<Setting>,
}

#[async_trait]
pub trait FeedClient: Send + Sync + 'static {
    async fn fetch(&self) -> Result<FeedSnapshot>;
}

pub struct HttpFeedClient {
    client: reqwest::Client,
    url: String,
}

impl HttpFeedClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ValidatorError::Feed(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch(&self) -> Result<FeedSnapshot> {
        debug!("Fetching feed from {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ValidatorError::Feed(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ValidatorError::Feed(format!("HTTP error: {}", response.status())));
        }

        response
            .json::<FeedSnapshot>()
            .await
            .map_err(|e| ValidatorError::Feed(format!("Failed to parse feed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_parses_with_missing_lists() {
        let json = r#"{
            "result": true,
            "campaigns": [
                {"id": "c1", "type": "CPA", "refund_period_days": 14},
                {"id": "c2", "type": "REGULAR"}
            ],
            "settings": [{"name": "Wsales", "value": "0.6"}]
        }"#;

        let snapshot: FeedSnapshot = serde_json::from_str(json).unwrap();
        assert!(snapshot.active_miners.is_empty());
        assert_eq!(snapshot.campaigns[0].campaign_type, CampaignType::Cpa);
        assert_eq!(snapshot.campaigns[0].refund_period_days, Some(14));
        assert_eq!(snapshot.campaigns[1].refund_period_days, None);
        assert_eq!(snapshot.settings[0].name, "Wsales");
    }
}
