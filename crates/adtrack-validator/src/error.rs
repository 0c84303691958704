// crates/adtrack-validator/src/error.rs

use {adtrack_store::StoreError, thiserror::Error};

#[derive(Debug, Error)]
pub enum ValidatorError {
    /// A refund referenced a visit with no sale in the queue.
    #[error("Refund not expected without order: {0}")]
    RefundNotExpectedWithoutOrder(String),

    #[error("No active campaigns found")]
    NoActiveCampaigns,

    #[error("Invalid visit {id}: {reason}")]
    InvalidVisit { id: String, reason: String },

    #[error("Peer {peer} error: {reason}")]
    Peer { peer: String, reason: String },

    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Chain error: {0}")]
    Chain(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Common error: {0}")]
    Common(#[from] adtrack_common::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ValidatorError {
    pub fn peer(peer: impl Into<String>, reason: impl ToString) -> Self {
        Self::Peer {
            peer: peer.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ValidatorError>;
