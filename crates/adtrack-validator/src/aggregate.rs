// crates/adtrack-validator/src/aggregate.rs

use {
    crate::error::{Result, ValidatorError},
    adtrack_common::types::AggregationQuery,
    adtrack_rewards::campaign_umax,
    adtrack_store::{Store, UnitOfWork},
    chrono::{DateTime, Utc},
    std::collections::BTreeMap,
    tracing::debug,
};

/// Refresh `umax` of every active campaign from the best miner's unique
/// visits in `[from_block, to_block]`.
pub async fn calculate_umax(
    store: &dyn Store,
    from_block: u64,
    to_block: u64,
    now: DateTime<Utc>,
) -> Result<BTreeMap<String, f64>> {
    let mut uow = UnitOfWork::begin(store).await?;

    let result = async {
        let campaigns = uow.active_campaigns().await?;
        let query = AggregationQuery::for_campaigns(campaigns.iter().map(|c| c.id.clone()))
            .blocks(Some(from_block), Some(to_block));
        let data = uow.aggregate(&query).await?;

        let mut umax = BTreeMap::new();
        for mut campaign in campaigns {
            let value = data.get(&campaign.id).map(campaign_umax).unwrap_or(0.0);
            debug!("Campaign {} umax {}", campaign.id, value);
            if campaign.umax != value {
                campaign.umax = value;
                campaign.updated_at = now;
                uow.put_campaign(&campaign).await?;
            }
            umax.insert(campaign.id, value);
        }
        Ok::<_, ValidatorError>(umax)
    }
    .await;

    uow.finish(result).await
}
