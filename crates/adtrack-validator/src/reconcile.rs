// crates/adtrack-validator/src/reconcile.rs

//! Visit reconciliation
//!
//! Every visit id resolves to one canonical [`VisitRecord`]. Miner reports,
//! local tracker observations and records pulled from other validators are
//! all folded into it here.
//!
//! Uniqueness and return-visit flags are decided when the record is created
//! and never revisited. Validator-observed fields take the latest observation:
//! local tracker reports always apply, while a copy pulled from a peer applies
//! only when it is newer than the stored record. Miner-observed fields are
//! only filled in when missing.

use {
    crate::error::{Result, ValidatorError},
    adtrack_common::{
        types::{IncomingVisit, SalesSnapshot, SalesStatus, VisitRecord},
        utils::saturating_sub,
    },
    adtrack_store::{Session, Store, UnitOfWork},
    chrono::{DateTime, Duration, Utc},
    tracing::{debug, warn},
};

/// Time frame a merge is evaluated in.
#[derive(Debug, Clone, Copy)]
pub struct MergeContext {
    pub now: DateTime<Utc>,
    pub unique_window: Duration,
    pub return_window: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    Created(VisitRecord),
    Updated(VisitRecord),
    Unchanged(VisitRecord),
}

impl MergeOutcome {
    pub fn record(&self) -> &VisitRecord {
        match self {
            MergeOutcome::Created(record)
            | MergeOutcome::Updated(record)
            | MergeOutcome::Unchanged(record) => record,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            MergeOutcome::Created(_) => "created",
            MergeOutcome::Updated(_) => "updated",
            MergeOutcome::Unchanged(_) => "unchanged",
        }
    }

    fn is_write(&self) -> bool {
        !matches!(self, MergeOutcome::Unchanged(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub skipped: u64,
}

impl MergeReport {
    fn record(&mut self, outcome: &MergeOutcome) {
        match outcome {
            MergeOutcome::Created(_) => self.created += 1,
            MergeOutcome::Updated(_) => self.updated += 1,
            MergeOutcome::Unchanged(_) => self.unchanged += 1,
        }
    }
}

/// Fold `incoming` into `existing`, or create the record when there is none.
///
/// Only creation touches the session, to decide uniqueness and return visits.
pub async fn merge_visit(
    session: &mut dyn Session,
    existing: Option<VisitRecord>,
    incoming: IncomingVisit,
    ctx: &MergeContext,
) -> Result<MergeOutcome> {
    match existing {
        Some(existing) => Ok(update_record(existing, &incoming, ctx.now)),
        None => create_record(session, incoming, ctx).await.map(MergeOutcome::Created),
    }
}

async fn create_record(
    session: &mut dyn Session,
    incoming: IncomingVisit,
    ctx: &MergeContext,
) -> Result<VisitRecord> {
    let ip_address = incoming.ip_address.clone().ok_or_else(|| ValidatorError::InvalidVisit {
        id: incoming.id.clone(),
        reason: "missing ip address".to_string(),
    })?;

    let (is_unique, return_in_site) = match &incoming.campaign_id {
        Some(campaign_id) => {
            let unique_since = saturating_sub(ctx.now, ctx.unique_window);
            let returning_before = saturating_sub(ctx.now, ctx.return_window);
            let seen_recently = session
                .visit_exists_after(&ip_address, campaign_id, unique_since)
                .await?;
            let seen_before = session
                .visit_exists_before(&ip_address, campaign_id, returning_before)
                .await?;
            (!seen_recently, seen_before)
        }
        None => (false, false),
    };

    let sales = incoming.sales.unwrap_or_else(empty_sales);
    let counters = incoming.counters.unwrap_or_default();

    Ok(VisitRecord {
        id: incoming.id,
        ip_address,
        user_agent: incoming.user_agent.unwrap_or_default(),
        country: incoming.country,
        country_code: incoming.country_code,
        device: incoming.device,
        campaign_id: incoming.campaign_id,
        campaign_item: incoming.campaign_item,
        referer: incoming.referer,
        miner_hotkey: incoming.miner_hotkey,
        miner_block: incoming.miner_block,
        validator_hotkey: incoming.validator_hotkey,
        validator_block: incoming.validator_block,
        is_unique,
        return_in_site,
        at: incoming.at.unwrap_or(false),
        counters,
        sales_status: sales.sales_status,
        refund: sales.refund,
        sales: sales.sales,
        sale_amount: sales.sale_amount,
        order_info: sales.order_info,
        refund_info: sales.refund_info,
        sale_date: sales.sale_date,
        created_at: incoming.created_at.unwrap_or(ctx.now),
        updated_at: incoming.updated_at.unwrap_or(ctx.now),
    })
}

fn empty_sales() -> SalesSnapshot {
    SalesSnapshot {
        sales_status: SalesStatus::New,
        refund: 0,
        sales: 0,
        sale_amount: 0.0,
        order_info: None,
        refund_info: None,
        sale_date: None,
    }
}

fn fill<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(value);
    }
}

fn overwrite<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        slot.clone_from(value);
    }
}

fn update_record(existing: VisitRecord, incoming: &IncomingVisit, now: DateTime<Utc>) -> MergeOutcome {
    let mut merged = existing.clone();

    // miner-observed
    if merged.ip_address.is_empty() {
        if let Some(ip) = &incoming.ip_address {
            merged.ip_address.clone_from(ip);
        }
    }
    if merged.user_agent.is_empty() {
        if let Some(user_agent) = &incoming.user_agent {
            merged.user_agent.clone_from(user_agent);
        }
    }
    fill(&mut merged.referer, &incoming.referer);
    fill(&mut merged.device, &incoming.device);
    fill(&mut merged.country, &incoming.country);
    fill(&mut merged.country_code, &incoming.country_code);
    fill(&mut merged.campaign_id, &incoming.campaign_id);
    fill(&mut merged.campaign_item, &incoming.campaign_item);
    fill(&mut merged.miner_hotkey, &incoming.miner_hotkey);
    fill(&mut merged.miner_block, &incoming.miner_block);

    // validator-observed, unless this is a stale peer copy
    let newer = incoming.updated_at.map_or(true, |updated_at| updated_at > existing.updated_at);
    if newer {
        overwrite(&mut merged.validator_hotkey, &incoming.validator_hotkey);
        overwrite(&mut merged.validator_block, &incoming.validator_block);
        if let Some(at) = incoming.at {
            merged.at = at;
        }
        if let Some(counters) = incoming.counters {
            merged.counters = counters;
        }
    }

    // sales snapshots only travel with dated peer copies
    if let Some(sales) = &incoming.sales {
        if incoming.updated_at.is_some() && newer {
            adopt_sales(&mut merged, sales);
        }
    }

    if merged == existing {
        return MergeOutcome::Unchanged(existing);
    }
    merged.updated_at = now;
    MergeOutcome::Updated(merged)
}

fn adopt_sales(record: &mut VisitRecord, sales: &SalesSnapshot) {
    record.refund = sales.refund;
    record.sales = sales.sales;
    record.sale_amount = sales.sale_amount;
    record.order_info.clone_from(&sales.order_info);
    record.refund_info.clone_from(&sales.refund_info);
    record.sale_date = sales.sale_date.or(record.sale_date);
    if !record.is_completed() {
        record.sales_status = sales.sales_status;
    }
}

/// Merge a batch of observations in one unit of work.
///
/// Observations that cannot form a record are skipped with a warning; store
/// failures roll the whole batch back.
pub async fn merge_visits(
    store: &dyn Store,
    incoming: Vec<IncomingVisit>,
    ctx: &MergeContext,
) -> Result<MergeReport> {
    let mut uow = UnitOfWork::begin(store).await?;

    let result = async {
        let mut report = MergeReport::default();
        for visit in incoming {
            let id = visit.id.clone();
            let existing = uow.get_visit(&id).await?;
            let outcome = match merge_visit(&mut *uow, existing, visit, ctx).await {
                Ok(outcome) => outcome,
                Err(ValidatorError::InvalidVisit { id, reason }) => {
                    warn!("Skipping visit {}: {}", id, reason);
                    report.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if outcome.is_write() {
                uow.put_visit(outcome.record()).await?;
            }
            debug!("Merged visit {} ({})", id, outcome.kind());
            report.record(&outcome);
        }
        Ok::<_, ValidatorError>(report)
    }
    .await;

    uow.finish(result).await
}

/// Records this validator serves to peers pulling after `offset`.
pub async fn visits_after(
    store: &dyn Store,
    offset: Option<DateTime<Utc>>,
    limit: usize,
) -> Result<Vec<VisitRecord>> {
    let mut uow = UnitOfWork::begin(store).await?;
    let result = uow.visits_after(offset, limit).await.map_err(ValidatorError::from);
    uow.finish(result).await
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        adtrack_common::types::{BehaviorCounters, VisitSource},
        adtrack_store::MemoryStore,
        chrono::TimeZone,
    };

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()
    }

    fn ctx(now: DateTime<Utc>) -> MergeContext {
        MergeContext {
            now,
            unique_window: Duration::hours(2),
            return_window: Duration::hours(1),
        }
    }

    fn miner_report(id: &str) -> IncomingVisit {
        let mut visit = IncomingVisit::new(id, VisitSource::Miner);
        visit.ip_address = Some("10.1.1.1".into());
        visit.user_agent = Some("ua".into());
        visit.campaign_id = Some("c1".into());
        visit.campaign_item = Some("item-1".into());
        visit.referer = Some("https://ref.example".into());
        visit.miner_hotkey = Some("miner-1".into());
        visit.miner_block = Some(100);
        visit
    }

    #[tokio::test]
    async fn test_validator_fields_overwrite_and_miner_fields_stick() {
        let store = MemoryStore::new("active");
        merge_visits(&store, vec![miner_report("v1")], &ctx(at(10))).await.unwrap();

        let mut observed = IncomingVisit::new("v1", VisitSource::Validator);
        observed.referer = Some("https://other.example".into());
        observed.validator_hotkey = Some("validator-1".into());
        observed.validator_block = Some(105);
        observed.at = Some(true);
        observed.counters = Some(BehaviorCounters {
            count_through_rate_click: 2,
            visit_duration: 30,
            ..BehaviorCounters::default()
        });

        let report = merge_visits(&store, vec![observed], &ctx(at(11))).await.unwrap();
        assert_eq!(report.updated, 1);

        let stored = visits_after(&store, None, 10).await.unwrap().remove(0);
        assert_eq!(stored.referer.as_deref(), Some("https://ref.example"));
        assert_eq!(stored.validator_block, Some(105));
        assert_eq!(stored.counters.count_through_rate_click, 2);
        assert!(stored.at);
        assert_eq!(stored.created_at, at(10));
        assert_eq!(stored.updated_at, at(11));
    }

    #[tokio::test]
    async fn test_missing_ip_is_skipped() {
        let store = MemoryStore::new("active");
        let report = merge_visits(
            &store,
            vec![IncomingVisit::new("bare", VisitSource::Validator), miner_report("ok")],
            &ctx(at(10)),
        )
        .await
        .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.created, 1);
    }

    #[test]
    fn test_newer_sales_snapshot_is_adopted_but_never_reopens() {
        let mut existing = VisitRecord {
            id: "v1".into(),
            ip_address: "10.1.1.1".into(),
            user_agent: "ua".into(),
            country: None,
            country_code: None,
            device: None,
            campaign_id: Some("c1".into()),
            campaign_item: None,
            referer: None,
            miner_hotkey: None,
            miner_block: None,
            validator_hotkey: None,
            validator_block: None,
            is_unique: true,
            return_in_site: false,
            at: false,
            counters: BehaviorCounters::default(),
            sales_status: SalesStatus::Completed,
            refund: 0,
            sales: 1,
            sale_amount: 10.0,
            order_info: None,
            refund_info: None,
            sale_date: Some(at(1)),
            created_at: at(1),
            updated_at: at(2),
        };

        let mut peer_copy: IncomingVisit = existing.clone().into();
        let mut sales = existing.sales_snapshot();
        sales.sales = 3;
        sales.sale_amount = 30.0;
        sales.sales_status = SalesStatus::New;
        peer_copy.sales = Some(sales);
        peer_copy.updated_at = Some(at(3));

        let merged = match update_record(existing.clone(), &peer_copy, at(4)) {
            MergeOutcome::Updated(record) => record,
            other => panic!("expected update, got {other:?}"),
        };
        assert_eq!(merged.sales, 3);
        assert_eq!(merged.sales_status, SalesStatus::Completed);

        // an older copy is ignored
        existing.updated_at = at(5);
        assert!(matches!(
            update_record(existing, &peer_copy, at(6)),
            MergeOutcome::Unchanged(_)
        ));
    }

    #[tokio::test]
    async fn test_stale_peer_copy_keeps_newer_counters() {
        let store = MemoryStore::new("active");
        let mut observed = miner_report("v1");
        observed.validator_block = Some(120);
        observed.counters = Some(BehaviorCounters {
            count_through_rate_click: 5,
            ..BehaviorCounters::default()
        });
        merge_visits(&store, vec![observed], &ctx(at(12))).await.unwrap();

        let mut peer_copy: IncomingVisit = visits_after(&store, None, 10).await.unwrap().remove(0).into();
        peer_copy.validator_hotkey = Some("validator-2".into());
        peer_copy.validator_block = Some(110);
        peer_copy.at = Some(true);
        peer_copy.counters = Some(BehaviorCounters {
            count_through_rate_click: 2,
            ..BehaviorCounters::default()
        });
        peer_copy.updated_at = Some(at(10));

        let report = merge_visits(&store, vec![peer_copy.clone()], &ctx(at(13))).await.unwrap();
        assert_eq!(report.unchanged, 1);
        let stored = visits_after(&store, None, 10).await.unwrap().remove(0);
        assert_eq!(stored.counters.count_through_rate_click, 5);
        assert_eq!(stored.validator_block, Some(120));
        assert!(!stored.at);

        // the same copy, once newer than the stored record, wins
        peer_copy.updated_at = Some(at(14));
        merge_visits(&store, vec![peer_copy], &ctx(at(15))).await.unwrap();
        let stored = visits_after(&store, None, 10).await.unwrap().remove(0);
        assert_eq!(stored.counters.count_through_rate_click, 2);
        assert_eq!(stored.validator_hotkey.as_deref(), Some("validator-2"));
    }

    #[tokio::test]
    async fn test_oversized_windows_do_not_panic() {
        let store = MemoryStore::new("active");
        let ctx = MergeContext {
            now: at(10),
            unique_window: Duration::MAX,
            return_window: Duration::MAX,
        };
        let report = merge_visits(&store, vec![miner_report("v1"), miner_report("v2")], &ctx)
            .await
            .unwrap();
        assert_eq!(report.created, 2);

        let stored = visits_after(&store, None, 10).await.unwrap();
        assert!(stored.iter().all(|v| !v.return_in_site));
        assert_eq!(stored.iter().filter(|v| v.is_unique).count(), 1);
    }
}
