// crates/adtrack-validator/src/context.rs

use {
    crate::{
        chain::Chain, feed::FeedClient, metrics::Metrics, peers::PeerClient,
        scheduler::PeriodicGuard, watermark::Watermark,
    },
    adtrack_common::config::{FormulaParams, ValidatorConfig},
    adtrack_store::Stores,
    std::sync::Arc,
};

/// Everything the control loop reads and mutates between cycles.
pub struct ValidatorContext {
    pub config: ValidatorConfig,
    pub stores: Stores,
    pub peers: Arc<dyn PeerClient>,
    pub feed: Arc<dyn FeedClient>,
    pub chain: Arc<dyn Chain>,
    pub metrics: Arc<Metrics>,
    /// Latest parameters published by the feed.
    pub params: FormulaParams,
    pub active_miners: Vec<String>,
    pub active_validators: Vec<String>,
    pub watermark: Watermark,
    pub guard: PeriodicGuard,
    pub last_evaluated: Option<u64>,
}

impl ValidatorContext {
    pub fn new(
        config: ValidatorConfig,
        stores: Stores,
        peers: Arc<dyn PeerClient>,
        feed: Arc<dyn FeedClient>,
        chain: Arc<dyn Chain>,
    ) -> Self {
        Self {
            config,
            stores,
            peers,
            feed,
            chain,
            metrics: Arc::new(Metrics::new()),
            params: FormulaParams::default(),
            active_miners: Vec::new(),
            active_validators: Vec::new(),
            watermark: Watermark::default(),
            guard: PeriodicGuard::default(),
            last_evaluated: None,
        }
    }

    /// Validators to pull from, without this node.
    pub fn sync_peers(&self) -> Vec<String> {
        self.active_validators
            .iter()
            .filter(|hotkey| **hotkey != self.config.hotkey)
            .cloned()
            .collect()
    }
}
