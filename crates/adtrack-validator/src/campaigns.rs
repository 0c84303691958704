// crates/adtrack-validator/src/campaigns.rs

//! Campaign and miner bookkeeping driven by the feed and by miner pings

use {
    crate::{
        error::{Result, ValidatorError},
        feed::FeedCampaign,
        peers::PingResponse,
    },
    adtrack_common::{
        types::{Campaign, MinerPing},
        utils::days_to_blocks,
    },
    adtrack_store::{Store, UnitOfWork},
    chrono::{DateTime, Utc},
    std::collections::{BTreeMap, HashSet},
    tracing::{info, warn},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CampaignSyncReport {
    pub active: usize,
    pub deactivated: usize,
}

/// Make the local campaign table match the feed's active list.
///
/// Listed campaigns are upserted as active; local campaigns the feed no longer
/// lists are deactivated, never deleted.
pub async fn sync_active_campaigns(
    store: &dyn Store,
    feed_campaigns: &[FeedCampaign],
    current_block: u64,
    now: DateTime<Utc>,
) -> Result<CampaignSyncReport> {
    let mut uow = UnitOfWork::begin(store).await?;

    let result = async {
        let listed: HashSet<&str> = feed_campaigns.iter().map(|c| c.id.as_str()).collect();
        let mut report = CampaignSyncReport::default();

        for mut campaign in uow.active_campaigns().await? {
            if !listed.contains(campaign.id.as_str()) {
                campaign.status = false;
                campaign.updated_at = now;
                uow.put_campaign(&campaign).await?;
                report.deactivated += 1;
            }
        }

        for entry in feed_campaigns {
            let mut campaign = match uow.get_campaign(&entry.id).await? {
                Some(campaign) => campaign,
                None => Campaign::new(entry.id.clone(), entry.campaign_type, current_block, now),
            };
            campaign.campaign_type = entry.campaign_type;
            campaign.status = true;
            campaign.last_active_block = current_block;
            campaign.cpa_blocks = entry.refund_period_days.map(days_to_blocks);
            campaign.updated_at = now;
            uow.put_campaign(&campaign).await?;
            report.active += 1;
        }

        Ok::<_, ValidatorError>(report)
    }
    .await;

    let report = uow.finish(result).await?;
    if report.deactivated > 0 {
        info!("Deactivated {} campaigns missing from the feed", report.deactivated);
    }
    Ok(report)
}

/// Store liveness and claimed campaign items of the miners that answered a ping.
pub async fn record_pings(
    store: &dyn Store,
    responses: &BTreeMap<String, PingResponse>,
    now: DateTime<Utc>,
) -> Result<usize> {
    let mut uow = UnitOfWork::begin(store).await?;

    let result = async {
        for (hotkey, response) in responses {
            uow.add_miner_ping(&MinerPing {
                hotkey: hotkey.clone(),
                block: response.block,
                created_at: now,
            })
            .await?;

            for assignment in &response.assignments {
                if assignment.hotkey != *hotkey {
                    warn!(
                        "Miner {} claimed item {} for {}, skipping",
                        hotkey, assignment.unique_id, assignment.hotkey
                    );
                    continue;
                }
                uow.put_assignment(assignment).await?;
            }
        }
        Ok::<_, ValidatorError>(responses.len())
    }
    .await;

    uow.finish(result).await
}
