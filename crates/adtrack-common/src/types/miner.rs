use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

/// Liveness evidence for a miner. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerPing {
    pub hotkey: String,
    pub block: u64,
    pub created_at: DateTime<Utc>,
}

/// Resolves a campaign item (the per-assignment sub-id) to the miner that claimed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerAssignment {
    pub unique_id: String,
    pub hotkey: String,
    pub campaign_id: String,
}
