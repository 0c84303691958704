// crates/adtrack-validator/src/chain.rs

use {
    crate::error::Result,
    adtrack_common::utils::block_at,
    async_trait::async_trait,
    chrono::Utc,
    std::collections::BTreeMap,
    tracing::info,
};

/// Identity and weight submission on the incentive chain.
#[async_trait]
pub trait Chain: Send + Sync + 'static {
    async fn current_block(&self) -> Result<u64>;

    /// Scores are per miner hotkey and already clamped to `[0, 1]`.
    async fn set_weights(&self, weights: &BTreeMap<String, f64>) -> Result<()>;
}

/// Derives the block height from wall-clock time and logs weights instead of
/// submitting them.
#[derive(Debug, Default)]
pub struct LocalChain;

impl LocalChain {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Chain for LocalChain {
    async fn current_block(&self) -> Result<u64> {
        Ok(block_at(Utc::now()))
    }

    async fn set_weights(&self, weights: &BTreeMap<String, f64>) -> Result<()> {
        info!("Setting weights for {} miners: {:?}", weights.len(), weights);
        Ok(())
    }
}
