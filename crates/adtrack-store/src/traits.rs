use {
    crate::error::Result,
    adtrack_common::types::{
        AggregatedData, AggregationQuery, Campaign, MinerAssignment, MinerPing, MinersReputation,
        OrderHistoryEntry, OrderQueueItem, VisitRecord,
    },
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    std::{
        collections::{BTreeSet, HashSet},
        sync::Arc,
    },
};

/// A durable store holding the validator entities.
///
/// The active, history and main stores all implement this trait over the same
/// schema; they differ only in what the validator keeps in them.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Label used in logs.
    fn name(&self) -> &str;

    /// Open a unit of work. Nothing is visible to other sessions until commit.
    async fn begin(&self) -> Result<Box<dyn Session>>;

    /// Close the store (close connections, release resources).
    async fn close(&self) -> Result<()>;
}

/// One transactional unit of work against a [`Store`].
///
/// Dropping a session without committing discards its writes.
#[async_trait]
pub trait Session: Send {
    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;

    // Visits

    async fn get_visit(&mut self, id: &str) -> Result<Option<VisitRecord>>;

    /// Insert or replace the record with `record.id`.
    async fn put_visit(&mut self, record: &VisitRecord) -> Result<()>;

    /// Whether a record for (ip, campaign) exists with `created_at > after`.
    async fn visit_exists_after(
        &mut self,
        ip_address: &str,
        campaign_id: &str,
        after: DateTime<Utc>,
    ) -> Result<bool>;

    /// Whether a record for (ip, campaign) exists with `created_at < before`.
    async fn visit_exists_before(
        &mut self,
        ip_address: &str,
        campaign_id: &str,
        before: DateTime<Utc>,
    ) -> Result<bool>;

    /// Records with `created_at > offset` (all records when `offset` is `None`),
    /// oldest first, at most `limit`.
    async fn visits_after(
        &mut self,
        offset: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<VisitRecord>>;

    /// Mark NEW records of `campaign_id` whose `sale_date < cutoff` as COMPLETED.
    /// Returns the number of records changed.
    async fn complete_sales_before(
        &mut self,
        campaign_id: &str,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64>;

    /// Group matching records by (campaign, assigned miner). Records whose
    /// campaign item has no assignment are left out.
    async fn aggregate(&mut self, query: &AggregationQuery) -> Result<AggregatedData>;

    /// Summed sales per assigned miner over the matching records.
    async fn miners_reputation(&mut self, query: &AggregationQuery) -> Result<MinersReputation>;

    // Campaigns

    async fn get_campaign(&mut self, id: &str) -> Result<Option<Campaign>>;

    async fn put_campaign(&mut self, campaign: &Campaign) -> Result<()>;

    async fn active_campaigns(&mut self) -> Result<Vec<Campaign>>;

    /// Active campaigns whose `last_active_block` lies in `[from_block, to_block]`,
    /// both ends inclusive.
    async fn active_campaigns_between(&mut self, from_block: u64, to_block: u64) -> Result<Vec<Campaign>>;

    // Sale/refund queue

    async fn get_queue_item(&mut self, id: &str) -> Result<Option<OrderQueueItem>>;

    async fn put_queue_item(&mut self, item: &OrderQueueItem) -> Result<()>;

    /// Items not yet processed, oldest `last_processing_date` first. Items in
    /// ERROR are included only while `attempts < max_attempts`.
    async fn queue_items_for_processing(
        &mut self,
        limit: usize,
        max_attempts: u32,
    ) -> Result<Vec<OrderQueueItem>>;

    // Miners

    async fn add_miner_ping(&mut self, ping: &MinerPing) -> Result<()>;

    /// Hotkeys with at least one ping at or after `since`.
    async fn miners_pinged_since(&mut self, since: DateTime<Utc>) -> Result<BTreeSet<String>>;

    async fn put_assignment(&mut self, assignment: &MinerAssignment) -> Result<()>;

    async fn get_assignment(&mut self, unique_id: &str) -> Result<Option<MinerAssignment>>;

    // Order history

    async fn add_order_history(&mut self, entry: &OrderHistoryEntry) -> Result<()>;

    async fn order_history(&mut self, hotkey: &str, limit: usize) -> Result<Vec<OrderHistoryEntry>>;

    // Archival

    /// Records with `created_at < cutoff`, oldest first.
    async fn visits_created_before(
        &mut self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<VisitRecord>>;

    async fn existing_visit_ids(&mut self, ids: &[String]) -> Result<HashSet<String>>;

    async fn delete_visits(&mut self, ids: &[String]) -> Result<u64>;

    /// Queue items with `created_at < cutoff`, oldest first.
    async fn queue_items_created_before(
        &mut self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OrderQueueItem>>;

    async fn existing_queue_ids(&mut self, ids: &[String]) -> Result<HashSet<String>>;

    async fn delete_queue_items(&mut self, ids: &[String]) -> Result<u64>;
}

/// Factory trait for creating store instances
#[async_trait]
pub trait StoreFactory: Send + Sync + 'static {
    async fn create_store(&self, name: &str) -> Result<Arc<dyn Store>>;
}
