// crates/adtrack-validator/src/queue.rs

//! Sale/refund queue
//!
//! Commerce events arrive independently of the visits they refer to. They
//! are parked as [`OrderQueueItem`]s keyed by visit id and applied to the
//! visit once it exists:
//!
//! ```text
//! PENDING -> VISIT_NOT_FOUND  visit not there yet, retried next pass
//!         -> PROCESSED        deltas applied
//!         -> ERROR            apply failed, retried while attempts remain
//! ```
//!
//! Deltas are increments measured against the payload last applied to the
//! visit, so replaying an item changes nothing.

use {
    crate::error::{Result, ValidatorError},
    adtrack_common::{
        config::FormulaParams,
        types::{
            OrderDetails, OrderHistoryEntry, OrderQueueItem, OrderQueueStatus, SaleAction, SaleEvent,
            SalesStatus, VisitRecord,
        },
        utils::blocks_before,
    },
    adtrack_store::{Session, Store, Stores, UnitOfWork},
    chrono::{DateTime, Utc},
    tracing::{debug, error, info, warn},
};

/// Park a commerce event for `id`.
pub async fn submit(
    store: &dyn Store,
    id: &str,
    event: SaleEvent,
    now: DateTime<Utc>,
) -> Result<OrderQueueItem> {
    let SaleEvent {
        action,
        order_details,
    } = event;
    let mut uow = UnitOfWork::begin(store).await?;

    let result = async {
        let existing = uow.get_queue_item(id).await?;
        let item = match (existing, action) {
            (None, SaleAction::Sale) => OrderQueueItem::new_sale(id, order_details, now),
            (None, SaleAction::Refund) => {
                return Err(ValidatorError::RefundNotExpectedWithoutOrder(id.to_string()))
            }
            (Some(item), SaleAction::Refund) if item.order_info.is_none() => {
                return Err(ValidatorError::RefundNotExpectedWithoutOrder(id.to_string()))
            }
            (Some(mut item), action) => {
                match action {
                    SaleAction::Sale => item.order_info = Some(order_details),
                    SaleAction::Refund => item.refund_info = Some(order_details),
                }
                item.status = OrderQueueStatus::Pending;
                item.attempts = 0;
                item
            }
        };

        uow.put_queue_item(&item).await?;
        Ok(item)
    }
    .await;

    let item = uow.finish(result).await?;
    info!("Queued {:?} for visit {}", action, id);
    Ok(item)
}

/// A visit that received new deltas, with the miner holding its campaign item.
#[derive(Debug, Clone)]
pub struct AppliedOrder {
    pub visit: VisitRecord,
    pub hotkey: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct QueueReport {
    pub applied: Vec<AppliedOrder>,
    pub unchanged: u64,
    pub not_found: u64,
    pub failed: u64,
}

/// Apply pending items to their visits. Each item is its own unit of work.
pub async fn process(
    stores: &Stores,
    params: &FormulaParams,
    now: DateTime<Utc>,
    limit: usize,
    max_attempts: u32,
) -> Result<QueueReport> {
    let items = {
        let mut uow = UnitOfWork::begin(stores.active.as_ref()).await?;
        let result = uow.queue_items_for_processing(limit, max_attempts).await;
        uow.finish(result).await?
    };

    let mut report = QueueReport::default();
    for item in items {
        let id = item.id.clone();
        match process_item(stores.active.as_ref(), item, params, now).await {
            Ok(ItemOutcome::Applied { visit, hotkey }) => {
                if let Some(hotkey) = &hotkey {
                    record_history(stores.main.as_ref(), &visit, hotkey, now).await;
                }
                report.applied.push(AppliedOrder { visit, hotkey });
            }
            Ok(ItemOutcome::Unchanged) => report.unchanged += 1,
            Ok(ItemOutcome::VisitNotFound) => report.not_found += 1,
            Ok(ItemOutcome::Failed) => report.failed += 1,
            Err(e) => {
                error!("Queue item {} could not be processed: {}", id, e);
                report.failed += 1;
            }
        }
    }

    if !report.applied.is_empty() || report.not_found > 0 || report.failed > 0 {
        info!(
            "Order queue pass: {} applied, {} waiting for visit, {} failed",
            report.applied.len(),
            report.not_found,
            report.failed
        );
    }
    Ok(report)
}

enum ItemOutcome {
    Applied {
        visit: VisitRecord,
        hotkey: Option<String>,
    },
    Unchanged,
    VisitNotFound,
    Failed,
}

async fn process_item(
    store: &dyn Store,
    mut item: OrderQueueItem,
    params: &FormulaParams,
    now: DateTime<Utc>,
) -> Result<ItemOutcome> {
    let mut uow = UnitOfWork::begin(store).await?;
    let result = apply_item(&mut *uow, &mut item, params, now).await;
    uow.finish(result).await
}

async fn apply_item(
    session: &mut dyn Session,
    item: &mut OrderQueueItem,
    params: &FormulaParams,
    now: DateTime<Utc>,
) -> Result<ItemOutcome> {
    item.last_processing_date = now;

    let Some(mut visit) = session.get_visit(&item.id).await? else {
        debug!("Visit {} not found for queued order", item.id);
        item.status = OrderQueueStatus::VisitNotFound;
        session.put_queue_item(item).await?;
        return Ok(ItemOutcome::VisitNotFound);
    };

    let cutoff = completion_cutoff(session, &visit, params, now).await?;
    match apply_deltas(&mut visit, item, cutoff, now) {
        Ok(changed) => {
            item.status = OrderQueueStatus::Processed;
            item.attempts = 0;
            session.put_queue_item(item).await?;
            if !changed {
                return Ok(ItemOutcome::Unchanged);
            }

            visit.updated_at = now;
            session.put_visit(&visit).await?;
            let hotkey = match &visit.campaign_item {
                Some(unique_id) => session.get_assignment(unique_id).await?.map(|a| a.hotkey),
                None => None,
            };
            Ok(ItemOutcome::Applied { visit, hotkey })
        }
        Err(e) => {
            item.status = OrderQueueStatus::Error;
            item.attempts += 1;
            error!(
                "Failed to apply order {} (attempt {}): {}",
                item.id, item.attempts, e
            );
            session.put_queue_item(item).await?;
            Ok(ItemOutcome::Failed)
        }
    }
}

/// Sales dated before the returned instant are past their refund window.
async fn completion_cutoff(
    session: &mut dyn Session,
    visit: &VisitRecord,
    params: &FormulaParams,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let campaign = match &visit.campaign_id {
        Some(campaign_id) => session.get_campaign(campaign_id).await?,
        None => None,
    };
    let blocks = campaign
        .and_then(|campaign| campaign.cpa_blocks)
        .unwrap_or(params.cpa_blocks);
    Ok(blocks_before(now, blocks))
}

fn payload_totals(details: Option<&OrderDetails>) -> Result<(u64, f64)> {
    match details {
        Some(details) => Ok((details.item_count(), details.amount()?)),
        None => Ok((0, 0.0)),
    }
}

/// Bring `visit` in line with the payloads carried by `item`.
/// Returns whether anything changed.
pub fn apply_deltas(
    visit: &mut VisitRecord,
    item: &OrderQueueItem,
    completion_cutoff: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let mut changed = false;

    if let Some(order) = &item.order_info {
        if visit.order_info.as_ref() != Some(order) {
            let (old_items, old_amount) = payload_totals(visit.order_info.as_ref())?;
            let (new_items, new_amount) = payload_totals(Some(order))?;

            visit.sales = (visit.sales + new_items).saturating_sub(old_items);
            visit.sale_amount = (visit.sale_amount + new_amount - old_amount).max(0.0);
            visit.order_info = Some(order.clone());
            visit.sale_date = order.sale_date.or(visit.sale_date).or(Some(now));
            changed = true;
        }
    }

    if let Some(refund) = &item.refund_info {
        if visit.refund_info.as_ref() != Some(refund) {
            if visit.is_completed() {
                warn!("Refund for visit {} arrived after its refund window, ignoring", visit.id);
            } else {
                let (old_items, old_amount) = payload_totals(visit.refund_info.as_ref())?;
                let (new_items, new_amount) = payload_totals(Some(refund))?;

                visit.refund = (visit.refund + new_items).saturating_sub(old_items);
                visit.sale_amount = (visit.sale_amount - (new_amount - old_amount)).max(0.0);
                visit.refund_info = Some(refund.clone());
                changed = true;
            }
        }
    }

    if visit.sales_status == SalesStatus::New {
        if let Some(sale_date) = visit.sale_date {
            if sale_date < completion_cutoff {
                visit.sales_status = SalesStatus::Completed;
                changed = true;
            }
        }
    }

    Ok(changed)
}

async fn record_history(store: &dyn Store, visit: &VisitRecord, hotkey: &str, now: DateTime<Utc>) {
    let entry = OrderHistoryEntry {
        id: visit.id.clone(),
        hotkey: hotkey.to_string(),
        visit: visit.clone(),
        created_at: now,
    };

    let written = async {
        let mut uow = UnitOfWork::begin(store).await?;
        let result = uow.add_order_history(&entry).await;
        uow.finish(result).await
    }
    .await;

    if let Err(e) = written {
        error!("Failed to record order history for visit {}: {}", visit.id, e);
    }
}

/// Mark NEW sales of every active campaign COMPLETED once their refund window
/// has elapsed.
pub async fn complete_sales(store: &dyn Store, params: &FormulaParams, now: DateTime<Utc>) -> Result<u64> {
    let mut uow = UnitOfWork::begin(store).await?;

    let result = async {
        let mut completed = 0;
        for campaign in uow.active_campaigns().await? {
            let blocks = campaign.cpa_blocks.unwrap_or(params.cpa_blocks);
            let cutoff = blocks_before(now, blocks);
            let changed = uow.complete_sales_before(&campaign.id, cutoff, now).await?;
            if changed > 0 {
                debug!("Completed {} sales of campaign {}", changed, campaign.id);
            }
            completed += changed;
        }
        Ok::<_, ValidatorError>(completed)
    }
    .await;

    uow.finish(result).await
}
