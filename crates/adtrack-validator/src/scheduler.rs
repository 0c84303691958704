// crates/adtrack-validator/src/scheduler.rs

//! Validator control loop
//!
//! Every cycle runs the sub-tasks in a fixed order. Each is throttled to its
//! own period by a [`PeriodicGuard`] and each failure is logged and counted
//! without stopping the cycle.

use {
    crate::{
        aggregate::calculate_umax,
        campaigns::{record_pings, sync_active_campaigns},
        context::ValidatorContext,
        error::{Result, ValidatorError},
        metrics::Metrics,
        peers::{broadcast, NotifyOrderRequest, PingRequest, SyncVisitsRequest},
        queue::{self, QueueReport},
        rating::{calculate_ratings, should_evaluate},
        reconcile::{self, MergeContext, MergeReport},
    },
    adtrack_common::{
        config::FormulaParams,
        types::{IncomingVisit, OrderQueueItem, SaleEvent, VisitRecord},
        utils::saturating_sub,
    },
    adtrack_store::{migrate, MigrationReport, UnitOfWork},
    chrono::Utc,
    std::{
        collections::{BTreeMap, HashMap},
        fmt,
        sync::Arc,
        time::Duration,
    },
    tokio::{
        sync::mpsc,
        time::{self, Instant},
    },
    tracing::{debug, error, info, warn},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {
    Migrate,
    Ping,
    SyncVisits,
    ProcessOrders,
    CompleteSales,
    Evaluate,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Task::Migrate => "migrate",
            Task::Ping => "ping",
            Task::SyncVisits => "sync visits",
            Task::ProcessOrders => "process orders",
            Task::CompleteSales => "complete sales",
            Task::Evaluate => "evaluate",
        };
        f.write_str(name)
    }
}

/// Lets each task through at most once per period.
#[derive(Debug, Default)]
pub struct PeriodicGuard {
    last_run: HashMap<Task, Instant>,
}

impl PeriodicGuard {
    /// Whether `task` may run at `now`. A `true` answer counts as a run.
    pub fn ready(&mut self, task: Task, period: Duration, now: Instant) -> bool {
        match self.last_run.get(&task) {
            Some(last) if now.saturating_duration_since(*last) < period => false,
            _ => {
                self.last_run.insert(task, now);
                true
            }
        }
    }
}

pub struct Validator {
    ctx: ValidatorContext,
    shutdown_rx: mpsc::Receiver<()>,
}

impl Validator {
    pub fn new(ctx: ValidatorContext) -> (Self, mpsc::Sender<()>) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        (Self { ctx, shutdown_rx }, shutdown_tx)
    }

    pub fn context(&self) -> &ValidatorContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut ValidatorContext {
        &mut self.ctx
    }

    pub async fn run(&mut self) -> Result<()> {
        info!("Starting validator {}", self.ctx.config.hotkey);
        let mut ticker = time::interval(self.ctx.config.scheduler.cycle());
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(_) = self.shutdown_rx.recv() => {
                    info!("Received shutdown signal");
                    break;
                }

                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
            }
        }

        self.ctx.stores.close().await?;
        info!("Validator shutdown complete: {:?}", self.ctx.metrics);
        Ok(())
    }

    /// One pass over all sub-tasks.
    pub async fn run_cycle(&mut self) {
        let now = Instant::now();
        let scheduler = self.ctx.config.scheduler.clone();

        if self.ctx.guard.ready(Task::Migrate, Duration::from_secs(scheduler.migration_period_secs), now) {
            let result = self.migrate().await;
            self.report(Task::Migrate, result);
        }

        if self.ctx.guard.ready(Task::Ping, Duration::from_secs(scheduler.ping_period_secs), now) {
            let result = self.ping().await;
            self.report(Task::Ping, result);
        }

        let result = self.sync_visits().await;
        self.report(Task::SyncVisits, result);

        let result = self.process_orders().await;
        self.report(Task::ProcessOrders, result);

        if self.ctx.guard.ready(
            Task::CompleteSales,
            Duration::from_secs(scheduler.sales_completion_secs),
            now,
        ) {
            let result = self.complete_sales().await;
            self.report(Task::CompleteSales, result);
        }

        let result = self.evaluate().await;
        self.report(Task::Evaluate, result);

        debug!("Cycle finished: {:?}", self.ctx.metrics);
    }

    fn report<T>(&self, task: Task, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(ValidatorError::NoActiveCampaigns) => {
                warn!("Skipping {}: no active campaigns", task);
                None
            }
            Err(e) => {
                error!("Task {} failed: {}", task, e);
                Metrics::increment(&self.ctx.metrics.task_failures);
                None
            }
        }
    }

    pub async fn migrate(&mut self) -> Result<MigrationReport> {
        let cutoff = saturating_sub(Utc::now(), self.ctx.config.migration_age());
        let report = migrate(
            self.ctx.stores.active.as_ref(),
            self.ctx.stores.history.as_ref(),
            cutoff,
            self.ctx.config.migration_batch_size,
        )
        .await?;
        Metrics::add(&self.ctx.metrics.visits_migrated, report.visits_moved);
        Ok(report)
    }

    /// Refresh campaigns and settings from the feed, then ping the active miners.
    pub async fn ping(&mut self) -> Result<()> {
        let snapshot = self.ctx.feed.fetch().await?;
        if !snapshot.result {
            warn!("Feed returned an unsuccessful snapshot, keeping cached state");
            return Ok(());
        }

        let now = Utc::now();
        let block = self.ctx.chain.current_block().await?;
        self.ctx.params = FormulaParams::from_settings(&snapshot.settings);
        self.ctx.active_miners = snapshot.active_miners;
        self.ctx.active_validators = snapshot.active_validators;

        let sync = sync_active_campaigns(self.ctx.stores.active.as_ref(), &snapshot.campaigns, block, now).await?;
        info!("Synced {} active campaigns at block {}", sync.active, block);

        let campaigns = {
            let mut uow = UnitOfWork::begin(self.ctx.stores.active.as_ref()).await?;
            let result = uow.active_campaigns().await;
            uow.finish(result).await?
        };
        let request = Arc::new(PingRequest {
            hotkey: self.ctx.config.hotkey.clone(),
            block,
            active_miners: self.ctx.active_miners.clone(),
            active_validators: self.ctx.active_validators.clone(),
            campaigns,
            settings: snapshot.settings,
        });

        let peers = self.ctx.peers.clone();
        let responses = broadcast(
            &self.ctx.active_miners,
            self.ctx.config.scheduler.max_concurrent_requests,
            self.ctx.config.scheduler.peer_timeout(),
            |peer| {
                let peers = peers.clone();
                let request = request.clone();
                async move { peers.ping(&peer, &request).await }
            },
        )
        .await;

        let answered = record_pings(self.ctx.stores.active.as_ref(), &responses, Utc::now()).await?;
        info!("{} of {} miners answered ping", answered, self.ctx.active_miners.len());
        Ok(())
    }

    /// Pull visits observed by other validators after the sync offset.
    pub async fn sync_visits(&mut self) -> Result<MergeReport> {
        let validators = self.ctx.sync_peers();
        if validators.is_empty() {
            return Ok(MergeReport::default());
        }

        let request = Arc::new(SyncVisitsRequest {
            offset: self.ctx.watermark.offset(),
            limit: self.ctx.config.scheduler.sync_limit,
        });
        let peers = self.ctx.peers.clone();
        let responses = broadcast(
            &validators,
            self.ctx.config.scheduler.max_concurrent_requests,
            self.ctx.config.scheduler.peer_timeout(),
            |peer| {
                let peers = peers.clone();
                let request = request.clone();
                async move { peers.sync_visits(&peer, &request).await }
            },
        )
        .await;

        let mut incoming = Vec::new();
        for (peer, records) in &responses {
            for record in records {
                if record.campaign_item.is_none() {
                    warn!("Visit {} from {} has no campaign item, skipping", record.id, peer);
                    continue;
                }
                incoming.push(IncomingVisit::from(record.clone()));
            }
        }

        let ctx = MergeContext {
            now: Utc::now(),
            unique_window: self.ctx.params.unique_window(),
            return_window: self.ctx.config.return_window(),
        };
        let report = reconcile::merge_visits(self.ctx.stores.active.as_ref(), incoming, &ctx).await?;

        let previous = self.ctx.watermark.offset();
        let offset = self.ctx.watermark.advance(&responses);
        if offset != previous {
            debug!("Sync offset moved to {:?}", offset);
        }

        Metrics::add(&self.ctx.metrics.visits_created, report.created);
        Metrics::add(&self.ctx.metrics.visits_updated, report.updated);
        Metrics::add(&self.ctx.metrics.visits_skipped, report.skipped);
        Ok(report)
    }

    /// Drain the sale/refund queue and tell miners about their updated visits.
    pub async fn process_orders(&mut self) -> Result<QueueReport> {
        let report = queue::process(
            &self.ctx.stores,
            &self.ctx.params,
            Utc::now(),
            self.ctx.config.scheduler.queue_batch_size,
            self.ctx.config.scheduler.queue_max_attempts,
        )
        .await?;

        Metrics::add(&self.ctx.metrics.queue_processed, report.applied.len() as u64);
        Metrics::add(&self.ctx.metrics.queue_not_found, report.not_found);
        Metrics::add(&self.ctx.metrics.queue_errors, report.failed);

        let timeout = self.ctx.config.scheduler.peer_timeout();
        for applied in &report.applied {
            let Some(hotkey) = &applied.hotkey else {
                continue;
            };
            let request = NotifyOrderRequest {
                visit: applied.visit.clone(),
            };
            match time::timeout(timeout, self.ctx.peers.notify_order(hotkey, &request)).await {
                Ok(Ok(())) => debug!("Notified {} of order on visit {}", hotkey, applied.visit.id),
                Ok(Err(e)) => warn!("Failed to notify {} of visit {}: {}", hotkey, applied.visit.id, e),
                Err(_) => warn!("Notifying {} of visit {} timed out", hotkey, applied.visit.id),
            }
        }
        Ok(report)
    }

    pub async fn complete_sales(&mut self) -> Result<u64> {
        let completed =
            queue::complete_sales(self.ctx.stores.active.as_ref(), &self.ctx.params, Utc::now()).await?;
        Metrics::add(&self.ctx.metrics.sales_completed, completed);
        Ok(completed)
    }

    /// Rate miners and emit weights when an evaluation is due.
    pub async fn evaluate(&mut self) -> Result<Option<BTreeMap<String, f64>>> {
        let block = self.ctx.chain.current_block().await?;
        let every = self.ctx.params.evaluate_miners_blocks;
        if !should_evaluate(block, self.ctx.last_evaluated, every) {
            return Ok(None);
        }
        self.ctx.last_evaluated = Some(block);

        let now = Utc::now();
        let store = self.ctx.stores.active.as_ref();
        calculate_umax(store, block.saturating_sub(every), block, now).await?;
        let scores = calculate_ratings(store, &self.ctx.params, self.ctx.config.ndigits, block, now).await?;

        self.ctx.chain.set_weights(&scores).await?;
        Metrics::increment(&self.ctx.metrics.weights_set);
        Ok(Some(scores))
    }

    /// Commerce ingestion.
    pub async fn submit_order(&self, id: &str, event: SaleEvent) -> Result<OrderQueueItem> {
        queue::submit(self.ctx.stores.active.as_ref(), id, event, Utc::now()).await
    }

    /// Miner reports and local tracker observations.
    pub async fn record_visits(&self, visits: Vec<IncomingVisit>) -> Result<MergeReport> {
        let ctx = MergeContext {
            now: Utc::now(),
            unique_window: self.ctx.params.unique_window(),
            return_window: self.ctx.config.return_window(),
        };
        let report = reconcile::merge_visits(self.ctx.stores.active.as_ref(), visits, &ctx).await?;
        Metrics::add(&self.ctx.metrics.visits_created, report.created);
        Metrics::add(&self.ctx.metrics.visits_updated, report.updated);
        Ok(report)
    }

    /// Answer another validator's pull.
    pub async fn serve_visits(&self, request: &SyncVisitsRequest) -> Result<Vec<VisitRecord>> {
        reconcile::visits_after(self.ctx.stores.active.as_ref(), request.offset, request.limit).await
    }
}
