use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

/// Which rating formula applies to a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CampaignType {
    Regular,
    Cpa,
}

impl CampaignType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignType::Regular => "REGULAR",
            CampaignType::Cpa => "CPA",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "REGULAR" => Some(CampaignType::Regular),
            "CPA" => Some(CampaignType::Cpa),
            _ => None,
        }
    }
}

/// An advertiser offer miners can claim. One row per id, deactivated rather
/// than deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub campaign_type: CampaignType,
    /// Active flag, changed only by a sync against the feed.
    pub status: bool,
    pub last_active_block: u64,
    /// Normalization cap for REGULAR ratings. Zero means "not computed yet".
    #[serde(default)]
    pub umax: f64,
    /// Refund window length in blocks.
    pub cpa_blocks: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(id: impl Into<String>, campaign_type: CampaignType, block: u64, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            campaign_type,
            status: true,
            last_active_block: block,
            umax: 0.0,
            cpa_blocks: None,
            created_at: now,
            updated_at: now,
        }
    }
}
