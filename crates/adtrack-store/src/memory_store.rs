//! In-process store
//!
//! Every table lives behind one async mutex. A session takes the lock for its
//! whole lifetime and works on a copy of the tables, which replaces the shared
//! state on commit.

use {
    crate::{
        error::Result,
        traits::{Session, Store},
    },
    adtrack_common::types::{
        AggregatedData, AggregationQuery, Campaign, MinerAssignment, MinerPing, MinersReputation,
        OrderHistoryEntry, OrderQueueItem, OrderQueueStatus, SalesStatus, VisitRecord,
    },
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    std::{
        collections::{BTreeMap, BTreeSet, HashSet},
        sync::Arc,
    },
    tokio::sync::{Mutex, OwnedMutexGuard},
};

#[derive(Debug, Clone, Default)]
struct Tables {
    visits: BTreeMap<String, VisitRecord>,
    campaigns: BTreeMap<String, Campaign>,
    queue: BTreeMap<String, OrderQueueItem>,
    pings: Vec<MinerPing>,
    assignments: BTreeMap<String, MinerAssignment>,
    history: Vec<OrderHistoryEntry>,
}

impl Tables {
    fn hotkey_for(&self, record: &VisitRecord) -> Option<&str> {
        record
            .campaign_item
            .as_ref()
            .and_then(|item| self.assignments.get(item))
            .map(|assignment| assignment.hotkey.as_str())
    }
}

pub struct MemoryStore {
    name: String,
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Arc::new(Mutex::new(Tables::default())),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn begin(&self) -> Result<Box<dyn Session>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemorySession { guard, working }))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct MemorySession {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

fn oldest_first<T, F>(mut rows: Vec<T>, key: F, limit: usize) -> Vec<T>
where
    F: Fn(&T) -> (DateTime<Utc>, String),
{
    rows.sort_by_key(|row| key(row));
    rows.truncate(limit);
    rows
}

#[async_trait]
impl Session for MemorySession {
    async fn commit(self: Box<Self>) -> Result<()> {
        let MemorySession { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    async fn get_visit(&mut self, id: &str) -> Result<Option<VisitRecord>> {
        Ok(self.working.visits.get(id).cloned())
    }

    async fn put_visit(&mut self, record: &VisitRecord) -> Result<()> {
        self.working.visits.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn visit_exists_after(
        &mut self,
        ip_address: &str,
        campaign_id: &str,
        after: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self.working.visits.values().any(|v| {
            v.ip_address == ip_address
                && v.campaign_id.as_deref() == Some(campaign_id)
                && v.created_at > after
        }))
    }

    async fn visit_exists_before(
        &mut self,
        ip_address: &str,
        campaign_id: &str,
        before: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self.working.visits.values().any(|v| {
            v.ip_address == ip_address
                && v.campaign_id.as_deref() == Some(campaign_id)
                && v.created_at < before
        }))
    }

    async fn visits_after(
        &mut self,
        offset: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<VisitRecord>> {
        let rows: Vec<VisitRecord> = self
            .working
            .visits
            .values()
            .filter(|v| offset.map_or(true, |offset| v.created_at > offset))
            .cloned()
            .collect();
        Ok(oldest_first(rows, |v| (v.created_at, v.id.clone()), limit))
    }

    async fn complete_sales_before(
        &mut self,
        campaign_id: &str,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut changed = 0;
        for visit in self.working.visits.values_mut() {
            let due = visit.campaign_id.as_deref() == Some(campaign_id)
                && visit.sales_status == SalesStatus::New
                && visit.sale_date.is_some_and(|date| date < cutoff);
            if due {
                visit.sales_status = SalesStatus::Completed;
                visit.updated_at = now;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn aggregate(&mut self, query: &AggregationQuery) -> Result<AggregatedData> {
        let mut data = AggregatedData::new();
        for visit in self.working.visits.values().filter(|v| query.matches(v)) {
            let (Some(campaign_id), Some(hotkey)) =
                (visit.campaign_id.as_ref(), self.working.hotkey_for(visit))
            else {
                continue;
            };
            data.entry(campaign_id.clone())
                .or_default()
                .entry(hotkey.to_string())
                .or_default()
                .add(visit);
        }
        Ok(data)
    }

    async fn miners_reputation(&mut self, query: &AggregationQuery) -> Result<MinersReputation> {
        let mut reputation = MinersReputation::new();
        for visit in self.working.visits.values().filter(|v| query.matches(v)) {
            if let Some(hotkey) = self.working.hotkey_for(visit) {
                *reputation.entry(hotkey.to_string()).or_default() += visit.sales as f64;
            }
        }
        Ok(reputation)
    }

    async fn get_campaign(&mut self, id: &str) -> Result<Option<Campaign>> {
        Ok(self.working.campaigns.get(id).cloned())
    }

    async fn put_campaign(&mut self, campaign: &Campaign) -> Result<()> {
        self.working.campaigns.insert(campaign.id.clone(), campaign.clone());
        Ok(())
    }

    async fn active_campaigns(&mut self) -> Result<Vec<Campaign>> {
        Ok(self
            .working
            .campaigns
            .values()
            .filter(|c| c.status)
            .cloned()
            .collect())
    }

    async fn active_campaigns_between(&mut self, from_block: u64, to_block: u64) -> Result<Vec<Campaign>> {
        Ok(self
            .working
            .campaigns
            .values()
            .filter(|c| c.status && (from_block..=to_block).contains(&c.last_active_block))
            .cloned()
            .collect())
    }

    async fn get_queue_item(&mut self, id: &str) -> Result<Option<OrderQueueItem>> {
        Ok(self.working.queue.get(id).cloned())
    }

    async fn put_queue_item(&mut self, item: &OrderQueueItem) -> Result<()> {
        self.working.queue.insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn queue_items_for_processing(
        &mut self,
        limit: usize,
        max_attempts: u32,
    ) -> Result<Vec<OrderQueueItem>> {
        let rows: Vec<OrderQueueItem> = self
            .working
            .queue
            .values()
            .filter(|item| match item.status {
                OrderQueueStatus::Processed => false,
                OrderQueueStatus::Error => item.attempts < max_attempts,
                OrderQueueStatus::Pending | OrderQueueStatus::VisitNotFound => true,
            })
            .cloned()
            .collect();
        Ok(oldest_first(rows, |item| (item.last_processing_date, item.id.clone()), limit))
    }

    async fn add_miner_ping(&mut self, ping: &MinerPing) -> Result<()> {
        self.working.pings.push(ping.clone());
        Ok(())
    }

    async fn miners_pinged_since(&mut self, since: DateTime<Utc>) -> Result<BTreeSet<String>> {
        Ok(self
            .working
            .pings
            .iter()
            .filter(|ping| ping.created_at >= since)
            .map(|ping| ping.hotkey.clone())
            .collect())
    }

    async fn put_assignment(&mut self, assignment: &MinerAssignment) -> Result<()> {
        self.working
            .assignments
            .insert(assignment.unique_id.clone(), assignment.clone());
        Ok(())
    }

    async fn get_assignment(&mut self, unique_id: &str) -> Result<Option<MinerAssignment>> {
        Ok(self.working.assignments.get(unique_id).cloned())
    }

    async fn add_order_history(&mut self, entry: &OrderHistoryEntry) -> Result<()> {
        self.working.history.push(entry.clone());
        Ok(())
    }

    async fn order_history(&mut self, hotkey: &str, limit: usize) -> Result<Vec<OrderHistoryEntry>> {
        let mut entries: Vec<_> = self
            .working
            .history
            .iter()
            .filter(|entry| entry.hotkey == hotkey)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn visits_created_before(
        &mut self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<VisitRecord>> {
        let rows: Vec<VisitRecord> = self
            .working
            .visits
            .values()
            .filter(|v| v.created_at < cutoff)
            .cloned()
            .collect();
        Ok(oldest_first(rows, |v| (v.created_at, v.id.clone()), limit))
    }

    async fn existing_visit_ids(&mut self, ids: &[String]) -> Result<HashSet<String>> {
        Ok(ids
            .iter()
            .filter(|id| self.working.visits.contains_key(id.as_str()))
            .cloned()
            .collect())
    }

    async fn delete_visits(&mut self, ids: &[String]) -> Result<u64> {
        Ok(ids
            .iter()
            .filter(|id| self.working.visits.remove(id.as_str()).is_some())
            .count() as u64)
    }

    async fn queue_items_created_before(
        &mut self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OrderQueueItem>> {
        let rows: Vec<OrderQueueItem> = self
            .working
            .queue
            .values()
            .filter(|item| item.created_at < cutoff)
            .cloned()
            .collect();
        Ok(oldest_first(rows, |item| (item.created_at, item.id.clone()), limit))
    }

    async fn existing_queue_ids(&mut self, ids: &[String]) -> Result<HashSet<String>> {
        Ok(ids
            .iter()
            .filter(|id| self.working.queue.contains_key(id.as_str()))
            .cloned()
            .collect())
    }

    async fn delete_queue_items(&mut self, ids: &[String]) -> Result<u64> {
        Ok(ids
            .iter()
            .filter(|id| self.working.queue.remove(id.as_str()).is_some())
            .count() as u64)
    }
}
