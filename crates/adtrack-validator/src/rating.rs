// crates/adtrack-validator/src/rating.rs

//! Per-miner scores for weight emission
//!
//! REGULAR campaigns are rated over the last `evaluate_miners_blocks` blocks,
//! CPA campaigns over the sales of the last [`REWARD_SALE_PERIOD_DAYS`] days
//! together with the miners' reputation over `mr_blocks`.

use {
    crate::error::{Result, ValidatorError},
    adtrack_common::{
        config::FormulaParams,
        types::{AggregationQuery, CampaignType, MinersReputation},
        utils::{blocks_before, days, days_to_blocks, saturating_sub},
    },
    adtrack_rewards::RatingCalculator,
    adtrack_store::{Session, Store, UnitOfWork},
    chrono::{DateTime, Utc},
    std::collections::{BTreeMap, BTreeSet},
    tracing::{debug, info},
};

pub const REWARD_SALE_PERIOD_DAYS: u64 = 30;

/// Sales per miner in `campaign_id` since `since`, limited to the `alive`
/// miners. Alive miners without sales there score zero.
async fn campaign_reputation(
    session: &mut dyn Session,
    campaign_id: &str,
    alive: &BTreeSet<String>,
    since: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<MinersReputation> {
    let query = AggregationQuery::for_campaigns([campaign_id]).dates(Some(since), Some(now));
    let mut reputation = session.miners_reputation(&query).await?;
    reputation.retain(|hotkey, _| alive.contains(hotkey));
    for hotkey in alive {
        reputation.entry(hotkey.clone()).or_insert(0.0);
    }
    Ok(reputation)
}

/// Combined score per miner across the campaigns active within the last
/// [`REWARD_SALE_PERIOD_DAYS`] worth of blocks, i.e. with `last_active_block`
/// in `[current_block - period, current_block]`.
pub async fn calculate_ratings(
    store: &dyn Store,
    params: &FormulaParams,
    ndigits: u32,
    current_block: u64,
    now: DateTime<Utc>,
) -> Result<BTreeMap<String, f64>> {
    let mut uow = UnitOfWork::begin(store).await?;

    let result = async {
        let active_from = current_block.saturating_sub(days_to_blocks(REWARD_SALE_PERIOD_DAYS));
        let campaigns = uow.active_campaigns_between(active_from, current_block).await?;
        if campaigns.is_empty() {
            return Err(ValidatorError::NoActiveCampaigns);
        }

        let calculator = RatingCalculator::new(params.clone(), ndigits);
        let reputation_from = blocks_before(now, params.mr_blocks);
        let alive = uow.miners_pinged_since(reputation_from).await?;
        let from_block = current_block.saturating_sub(params.evaluate_miners_blocks);
        let sale_from = saturating_sub(now, days(REWARD_SALE_PERIOD_DAYS));

        let mut per_campaign = Vec::with_capacity(campaigns.len());
        for campaign in &campaigns {
            let query = AggregationQuery::for_campaigns([campaign.id.clone()]);
            let (query, reputation) = match campaign.campaign_type {
                CampaignType::Regular => (
                    query.blocks(Some(from_block), Some(current_block)),
                    MinersReputation::new(),
                ),
                CampaignType::Cpa => (
                    query.dates(Some(sale_from), Some(now)),
                    campaign_reputation(&mut *uow, &campaign.id, &alive, reputation_from, now).await?,
                ),
            };

            let data = uow.aggregate(&query).await?;
            let miners = data.get(&campaign.id).cloned().unwrap_or_default();
            let scores =
                calculator.campaign_scores(campaign.campaign_type, &miners, &reputation, campaign.umax);
            debug!("Campaign {} scored {} miners", campaign.id, scores.len());
            per_campaign.push(scores);
        }

        let combined = calculator.combine(&per_campaign, campaigns.len());
        info!(
            "Rated {} miners over {} campaigns at block {}",
            combined.len(),
            campaigns.len(),
            current_block
        );
        Ok(combined)
    }
    .await;

    uow.finish(result).await
}

/// Whether ratings are due at `current_block`.
pub fn should_evaluate(current_block: u64, last_evaluated: Option<u64>, every_blocks: u64) -> bool {
    if every_blocks == 0 {
        return false;
    }
    match last_evaluated {
        Some(last) if current_block <= last => false,
        Some(last) => current_block % every_blocks == 0 || current_block - last >= every_blocks,
        None => true,
    }
}
