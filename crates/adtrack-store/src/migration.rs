//! Active -> history archival
//!
//! Rows older than the cutoff are copied to the history store in bounded
//! batches and deleted from the active store once the copy is committed. Rows
//! already present in history are not copied again, so an interrupted run can
//! simply be repeated. The main store is never touched.

use {
    crate::{
        error::{Result, StoreError},
        traits::Store,
        unit_of_work::UnitOfWork,
    },
    chrono::{DateTime, Utc},
    tracing::{debug, info, warn},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub visits_moved: u64,
    pub queue_items_moved: u64,
}

pub async fn migrate(
    active: &dyn Store,
    history: &dyn Store,
    cutoff: DateTime<Utc>,
    batch_size: usize,
) -> Result<MigrationReport> {
    info!("Migrating rows created before {} to {}", cutoff, history.name());
    let report = MigrationReport {
        visits_moved: migrate_visits(active, history, cutoff, batch_size).await?,
        queue_items_moved: migrate_queue_items(active, history, cutoff, batch_size).await?,
    };
    info!(
        "Migration finished: {} visits, {} queue items",
        report.visits_moved, report.queue_items_moved
    );
    Ok(report)
}

async fn migrate_visits(
    active: &dyn Store,
    history: &dyn Store,
    cutoff: DateTime<Utc>,
    batch_size: usize,
) -> Result<u64> {
    let mut moved = 0;
    loop {
        let mut uow = UnitOfWork::begin(active).await?;
        let batch = uow.visits_created_before(cutoff, batch_size).await;
        let batch = uow.finish(batch).await?;
        if batch.is_empty() {
            break;
        }
        let ids: Vec<String> = batch.iter().map(|v| v.id.clone()).collect();

        let mut uow = UnitOfWork::begin(history).await?;
        let copied = async {
            let existing = uow.existing_visit_ids(&ids).await?;
            let mut copied = 0u64;
            for record in batch.iter().filter(|v| !existing.contains(&v.id)) {
                uow.put_visit(record).await?;
                copied += 1;
            }
            Ok::<_, StoreError>(copied)
        }
        .await;
        let copied = uow.finish(copied).await?;
        debug!("Copied {} of {} visits to history", copied, ids.len());

        let mut uow = UnitOfWork::begin(active).await?;
        let deleted = uow.delete_visits(&ids).await;
        let deleted = uow.finish(deleted).await?;
        if deleted == 0 {
            warn!("Visit batch could not be removed from the active store, stopping");
            break;
        }
        moved += deleted;
    }
    Ok(moved)
}

async fn migrate_queue_items(
    active: &dyn Store,
    history: &dyn Store,
    cutoff: DateTime<Utc>,
    batch_size: usize,
) -> Result<u64> {
    let mut moved = 0;
    loop {
        let mut uow = UnitOfWork::begin(active).await?;
        let batch = uow.queue_items_created_before(cutoff, batch_size).await;
        let batch = uow.finish(batch).await?;
        if batch.is_empty() {
            break;
        }
        let ids: Vec<String> = batch.iter().map(|item| item.id.clone()).collect();

        let mut uow = UnitOfWork::begin(history).await?;
        let copied = async {
            let existing = uow.existing_queue_ids(&ids).await?;
            for item in batch.iter().filter(|item| !existing.contains(&item.id)) {
                uow.put_queue_item(item).await?;
            }
            Ok::<_, StoreError>(())
        }
        .await;
        uow.finish(copied).await?;

        let mut uow = UnitOfWork::begin(active).await?;
        let deleted = uow.delete_queue_items(&ids).await;
        let deleted = uow.finish(deleted).await?;
        if deleted == 0 {
            warn!("Queue batch could not be removed from the active store, stopping");
            break;
        }
        moved += deleted;
    }
    Ok(moved)
}
