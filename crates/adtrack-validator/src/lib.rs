//! adtrack-validator runs the validator side of the incentive network.
//! It reconciles visit observations from miners and peer validators, applies
//! commerce events to visits and turns the result into per-miner weights.

pub mod aggregate;
pub mod campaigns;
pub mod chain;
pub mod context;
pub mod error;
pub mod feed;
pub mod metrics;
pub mod peers;
pub mod queue;
pub mod rating;
pub mod reconcile;
pub mod scheduler;
pub mod watermark;

use tracing_subscriber::EnvFilter;

pub use {
    chain::{Chain, LocalChain},
    context::ValidatorContext,
    error::{Result, ValidatorError},
    feed::{FeedClient, FeedSnapshot, HttpFeedClient},
    metrics::Metrics,
    peers::{HttpPeerClient, PeerClient},
    scheduler::{PeriodicGuard, Task, Validator},
    watermark::Watermark,
};

/// Install the global subscriber. `RUST_LOG` wins over `level`.
pub fn init_logging(level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "adtrack_validator={level},adtrack_store={level},adtrack_rewards={level},adtrack_common={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(true)
        .init();
}
