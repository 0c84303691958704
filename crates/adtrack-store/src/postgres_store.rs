use {
    crate::{
        error::{Result, StoreError},
        traits::{Session, Store},
    },
    adtrack_common::{
        config::PostgresConfig,
        types::{
            AggregatedData, AggregationQuery, AggregationSchema, BehaviorCounters, Campaign,
            CampaignType, Device, MinerAssignment, MinerPing, MinersReputation, OrderDetails,
            OrderHistoryEntry, OrderQueueItem, OrderQueueStatus, SalesStatus, VisitRecord,
        },
    },
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    sqlx::{
        postgres::{PgPool, PgPoolOptions, PgRow},
        types::Json,
        Postgres, Row, Transaction,
    },
    std::collections::{BTreeSet, HashSet},
    tracing::info,
};

const VISIT_COLUMNS: &str = r#"
    id, ip_address, user_agent, country, country_code, device, campaign_id, campaign_item,
    referer, miner_hotkey, miner_block, validator_hotkey, validator_block, is_unique,
    return_in_site, at, count_image_click, count_mouse_movement, count_read_more_click,
    count_through_rate_click, visit_duration, sales_status, refund, sales, sale_amount,
    order_info, refund_info, sale_date, created_at, updated_at
"#;

const QUEUE_COLUMNS: &str =
    "id, order_info, refund_info, status, attempts, created_at, last_processing_date";

/// One statement per entry: prepared queries carry a single command.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS visits (
        id TEXT PRIMARY KEY,
        ip_address TEXT NOT NULL,
        user_agent TEXT NOT NULL,
        country TEXT,
        country_code TEXT,
        device TEXT,
        campaign_id TEXT,
        campaign_item TEXT,
        referer TEXT,
        miner_hotkey TEXT,
        miner_block BIGINT,
        validator_hotkey TEXT,
        validator_block BIGINT,
        is_unique BOOLEAN NOT NULL DEFAULT FALSE,
        return_in_site BOOLEAN NOT NULL DEFAULT FALSE,
        at BOOLEAN NOT NULL DEFAULT FALSE,
        count_image_click BIGINT NOT NULL DEFAULT 0,
        count_mouse_movement BIGINT NOT NULL DEFAULT 0,
        count_read_more_click BIGINT NOT NULL DEFAULT 0,
        count_through_rate_click BIGINT NOT NULL DEFAULT 0,
        visit_duration BIGINT NOT NULL DEFAULT 0,
        sales_status TEXT NOT NULL DEFAULT 'NEW',
        refund BIGINT NOT NULL DEFAULT 0,
        sales BIGINT NOT NULL DEFAULT 0,
        sale_amount DOUBLE PRECISION NOT NULL DEFAULT 0,
        order_info JSONB,
        refund_info JSONB,
        sale_date TIMESTAMP WITH TIME ZONE,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL,
        updated_at TIMESTAMP WITH TIME ZONE NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS visits_ip_campaign_idx ON visits(ip_address, campaign_id, created_at)",
    "CREATE INDEX IF NOT EXISTS visits_created_at_idx ON visits(created_at)",
    "CREATE INDEX IF NOT EXISTS visits_campaign_item_idx ON visits(campaign_item)",
    r#"
    CREATE TABLE IF NOT EXISTS campaigns (
        id TEXT PRIMARY KEY,
        campaign_type TEXT NOT NULL,
        status BOOLEAN NOT NULL,
        last_active_block BIGINT NOT NULL,
        umax DOUBLE PRECISION NOT NULL DEFAULT 0,
        cpa_blocks BIGINT,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL,
        updated_at TIMESTAMP WITH TIME ZONE NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS order_queue (
        id TEXT PRIMARY KEY,
        order_info JSONB,
        refund_info JSONB,
        status TEXT NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL,
        last_processing_date TIMESTAMP WITH TIME ZONE NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS order_queue_status_idx ON order_queue(status, last_processing_date)",
    r#"
    CREATE TABLE IF NOT EXISTS miner_pings (
        id BIGSERIAL PRIMARY KEY,
        hotkey TEXT NOT NULL,
        block BIGINT NOT NULL,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS miner_pings_created_at_idx ON miner_pings(created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS miner_assignments (
        unique_id TEXT PRIMARY KEY,
        hotkey TEXT NOT NULL,
        campaign_id TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS order_history (
        id TEXT NOT NULL,
        hotkey TEXT NOT NULL,
        visit JSONB NOT NULL,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS order_history_hotkey_idx ON order_history(hotkey, created_at)",
];

/// PostgreSQL storage implementation
pub struct PostgresStore {
    name: String,
    pool: PgPool,
}

impl PostgresStore {
    pub async fn new(name: impl Into<String>, config: PostgresConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.connection_string)
            .await?;

        let store = Self {
            name: name.into(),
            pool,
        };

        if config.create_tables {
            store.initialize_schema().await?;
        }

        info!("Connected {} store to PostgreSQL", store.name);
        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn begin(&self) -> Result<Box<dyn Session>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresSession { tx }))
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

struct PostgresSession {
    tx: Transaction<'static, Postgres>,
}

fn to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_db(value: i64) -> u64 {
    value.max(0) as u64
}

fn corrupt(table: &'static str, reason: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        table,
        reason: reason.into(),
    }
}

fn visit_from_row(row: &PgRow) -> Result<VisitRecord> {
    let device = row
        .try_get::<Option<String>, _>("device")?
        .map(|d| Device::parse(&d).ok_or_else(|| corrupt("visits", format!("unknown device {d}"))))
        .transpose()?;
    let status: String = row.try_get("sales_status")?;
    let sales_status = SalesStatus::parse(&status)
        .ok_or_else(|| corrupt("visits", format!("unknown sales status {status}")))?;

    Ok(VisitRecord {
        id: row.try_get("id")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        country: row.try_get("country")?,
        country_code: row.try_get("country_code")?,
        device,
        campaign_id: row.try_get("campaign_id")?,
        campaign_item: row.try_get("campaign_item")?,
        referer: row.try_get("referer")?,
        miner_hotkey: row.try_get("miner_hotkey")?,
        miner_block: row.try_get::<Option<i64>, _>("miner_block")?.map(from_db),
        validator_hotkey: row.try_get("validator_hotkey")?,
        validator_block: row.try_get::<Option<i64>, _>("validator_block")?.map(from_db),
        is_unique: row.try_get("is_unique")?,
        return_in_site: row.try_get("return_in_site")?,
        at: row.try_get("at")?,
        counters: BehaviorCounters {
            count_image_click: from_db(row.try_get("count_image_click")?),
            count_mouse_movement: from_db(row.try_get("count_mouse_movement")?),
            count_read_more_click: from_db(row.try_get("count_read_more_click")?),
            count_through_rate_click: from_db(row.try_get("count_through_rate_click")?),
            visit_duration: from_db(row.try_get("visit_duration")?),
        },
        sales_status,
        refund: from_db(row.try_get("refund")?),
        sales: from_db(row.try_get("sales")?),
        sale_amount: row.try_get("sale_amount")?,
        order_info: row
            .try_get::<Option<Json<OrderDetails>>, _>("order_info")?
            .map(|json| json.0),
        refund_info: row
            .try_get::<Option<Json<OrderDetails>>, _>("refund_info")?
            .map(|json| json.0),
        sale_date: row.try_get("sale_date")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn campaign_from_row(row: &PgRow) -> Result<Campaign> {
    let campaign_type: String = row.try_get("campaign_type")?;
    Ok(Campaign {
        id: row.try_get("id")?,
        campaign_type: CampaignType::parse(&campaign_type)
            .ok_or_else(|| corrupt("campaigns", format!("unknown type {campaign_type}")))?,
        status: row.try_get("status")?,
        last_active_block: from_db(row.try_get("last_active_block")?),
        umax: row.try_get("umax")?,
        cpa_blocks: row.try_get::<Option<i64>, _>("cpa_blocks")?.map(from_db),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn queue_item_from_row(row: &PgRow) -> Result<OrderQueueItem> {
    let status: String = row.try_get("status")?;
    Ok(OrderQueueItem {
        id: row.try_get("id")?,
        order_info: row
            .try_get::<Option<Json<OrderDetails>>, _>("order_info")?
            .map(|json| json.0),
        refund_info: row
            .try_get::<Option<Json<OrderDetails>>, _>("refund_info")?
            .map(|json| json.0),
        status: OrderQueueStatus::parse(&status)
            .ok_or_else(|| corrupt("order_queue", format!("unknown status {status}")))?,
        attempts: row.try_get::<i32, _>("attempts")?.max(0) as u32,
        created_at: row.try_get("created_at")?,
        last_processing_date: row.try_get("last_processing_date")?,
    })
}

fn limit_to_db(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl Session for PostgresSession {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }

    async fn get_visit(&mut self, id: &str) -> Result<Option<VisitRecord>> {
        let row = sqlx::query(&format!("SELECT {VISIT_COLUMNS} FROM visits WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(visit_from_row).transpose()
    }

    async fn put_visit(&mut self, record: &VisitRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO visits (
                id, ip_address, user_agent, country, country_code, device, campaign_id, campaign_item,
                referer, miner_hotkey, miner_block, validator_hotkey, validator_block, is_unique,
                return_in_site, at, count_image_click, count_mouse_movement, count_read_more_click,
                count_through_rate_click, visit_duration, sales_status, refund, sales, sale_amount,
                order_info, refund_info, sale_date, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30)
            ON CONFLICT (id)
            DO UPDATE SET
                ip_address = EXCLUDED.ip_address,
                user_agent = EXCLUDED.user_agent,
                country = EXCLUDED.country,
                country_code = EXCLUDED.country_code,
                device = EXCLUDED.device,
                campaign_id = EXCLUDED.campaign_id,
                campaign_item = EXCLUDED.campaign_item,
                referer = EXCLUDED.referer,
                miner_hotkey = EXCLUDED.miner_hotkey,
                miner_block = EXCLUDED.miner_block,
                validator_hotkey = EXCLUDED.validator_hotkey,
                validator_block = EXCLUDED.validator_block,
                is_unique = EXCLUDED.is_unique,
                return_in_site = EXCLUDED.return_in_site,
                at = EXCLUDED.at,
                count_image_click = EXCLUDED.count_image_click,
                count_mouse_movement = EXCLUDED.count_mouse_movement,
                count_read_more_click = EXCLUDED.count_read_more_click,
                count_through_rate_click = EXCLUDED.count_through_rate_click,
                visit_duration = EXCLUDED.visit_duration,
                sales_status = EXCLUDED.sales_status,
                refund = EXCLUDED.refund,
                sales = EXCLUDED.sales,
                sale_amount = EXCLUDED.sale_amount,
                order_info = EXCLUDED.order_info,
                refund_info = EXCLUDED.refund_info,
                sale_date = EXCLUDED.sale_date,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.ip_address)
        .bind(&record.user_agent)
        .bind(&record.country)
        .bind(&record.country_code)
        .bind(record.device.map(|d| d.as_str()))
        .bind(&record.campaign_id)
        .bind(&record.campaign_item)
        .bind(&record.referer)
        .bind(&record.miner_hotkey)
        .bind(record.miner_block.map(to_db))
        .bind(&record.validator_hotkey)
        .bind(record.validator_block.map(to_db))
        .bind(record.is_unique)
        .bind(record.return_in_site)
        .bind(record.at)
        .bind(to_db(record.counters.count_image_click))
        .bind(to_db(record.counters.count_mouse_movement))
        .bind(to_db(record.counters.count_read_more_click))
        .bind(to_db(record.counters.count_through_rate_click))
        .bind(to_db(record.counters.visit_duration))
        .bind(record.sales_status.as_str())
        .bind(to_db(record.refund))
        .bind(to_db(record.sales))
        .bind(record.sale_amount)
        .bind(record.order_info.as_ref().map(Json))
        .bind(record.refund_info.as_ref().map(Json))
        .bind(record.sale_date)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn visit_exists_after(
        &mut self,
        ip_address: &str,
        campaign_id: &str,
        after: DateTime<Utc>,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM visits WHERE ip_address = $1 AND campaign_id = $2 AND created_at > $3)",
        )
        .bind(ip_address)
        .bind(campaign_id)
        .bind(after)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn visit_exists_before(
        &mut self,
        ip_address: &str,
        campaign_id: &str,
        before: DateTime<Utc>,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM visits WHERE ip_address = $1 AND campaign_id = $2 AND created_at < $3)",
        )
        .bind(ip_address)
        .bind(campaign_id)
        .bind(before)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn visits_after(
        &mut self,
        offset: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<VisitRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {VISIT_COLUMNS} FROM visits
            WHERE ($1::TIMESTAMPTZ IS NULL OR created_at > $1)
            ORDER BY created_at ASC, id ASC
            LIMIT $2
            "#
        ))
        .bind(offset)
        .bind(limit_to_db(limit))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(visit_from_row).collect()
    }

    async fn complete_sales_before(
        &mut self,
        campaign_id: &str,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE visits
            SET sales_status = 'COMPLETED', updated_at = $3
            WHERE campaign_id = $1 AND sales_status = 'NEW' AND sale_date < $2
            "#,
        )
        .bind(campaign_id)
        .bind(cutoff)
        .bind(now)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn aggregate(&mut self, query: &AggregationQuery) -> Result<AggregatedData> {
        let rows = sqlx::query(
            r#"
            SELECT
                v.campaign_id AS campaign_id,
                a.hotkey AS hotkey,
                COUNT(*)::BIGINT AS visits,
                SUM(CASE WHEN v.is_unique THEN 1 ELSE 0 END)::BIGINT AS visits_unique,
                SUM(CASE WHEN v.at THEN 1 ELSE 0 END)::BIGINT AS at_count,
                SUM(v.count_through_rate_click)::BIGINT AS count_through_rate_click,
                SUM(v.sales)::BIGINT AS total_sales,
                SUM(v.refund)::BIGINT AS total_refunds,
                SUM(v.sale_amount)::DOUBLE PRECISION AS sales_amount
            FROM visits v
            JOIN miner_assignments a ON v.campaign_item = a.unique_id
            WHERE v.campaign_id IS NOT NULL
              AND (cardinality($1::TEXT[]) = 0 OR v.campaign_id = ANY($1))
              AND ($2::BIGINT IS NULL OR v.validator_block >= $2)
              AND ($3::BIGINT IS NULL OR v.validator_block <= $3)
              AND ($4::TIMESTAMPTZ IS NULL OR v.created_at >= $4)
              AND ($5::TIMESTAMPTZ IS NULL OR v.created_at <= $5)
            GROUP BY v.campaign_id, a.hotkey
            "#,
        )
        .bind(&query.campaign_ids)
        .bind(query.from_block.map(to_db))
        .bind(query.to_block.map(to_db))
        .bind(query.from_date)
        .bind(query.to_date)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut data = AggregatedData::new();
        for row in rows {
            let campaign_id: String = row.try_get("campaign_id")?;
            let hotkey: String = row.try_get("hotkey")?;
            let schema = AggregationSchema {
                visits: from_db(row.try_get("visits")?),
                visits_unique: from_db(row.try_get("visits_unique")?),
                at: from_db(row.try_get("at_count")?),
                count_through_rate_click: from_db(row.try_get("count_through_rate_click")?),
                total_sales: from_db(row.try_get("total_sales")?),
                total_refunds: from_db(row.try_get("total_refunds")?),
                sales_amount: row.try_get("sales_amount")?,
            };
            data.entry(campaign_id).or_default().insert(hotkey, schema);
        }
        Ok(data)
    }

    async fn miners_reputation(&mut self, query: &AggregationQuery) -> Result<MinersReputation> {
        let rows = sqlx::query(
            r#"
            SELECT a.hotkey AS hotkey, SUM(v.sales)::DOUBLE PRECISION AS total_sales
            FROM visits v
            JOIN miner_assignments a ON v.campaign_item = a.unique_id
            WHERE v.campaign_id IS NOT NULL
              AND (cardinality($1::TEXT[]) = 0 OR v.campaign_id = ANY($1))
              AND ($2::BIGINT IS NULL OR v.validator_block >= $2)
              AND ($3::BIGINT IS NULL OR v.validator_block <= $3)
              AND ($4::TIMESTAMPTZ IS NULL OR v.created_at >= $4)
              AND ($5::TIMESTAMPTZ IS NULL OR v.created_at <= $5)
            GROUP BY a.hotkey
            "#,
        )
        .bind(&query.campaign_ids)
        .bind(query.from_block.map(to_db))
        .bind(query.to_block.map(to_db))
        .bind(query.from_date)
        .bind(query.to_date)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut reputation = MinersReputation::new();
        for row in rows {
            reputation.insert(row.try_get("hotkey")?, row.try_get("total_sales")?);
        }
        Ok(reputation)
    }

    async fn get_campaign(&mut self, id: &str) -> Result<Option<Campaign>> {
        let row = sqlx::query("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(campaign_from_row).transpose()
    }

    async fn put_campaign(&mut self, campaign: &Campaign) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO campaigns (id, campaign_type, status, last_active_block, umax, cpa_blocks, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id)
            DO UPDATE SET
                campaign_type = EXCLUDED.campaign_type,
                status = EXCLUDED.status,
                last_active_block = EXCLUDED.last_active_block,
                umax = EXCLUDED.umax,
                cpa_blocks = EXCLUDED.cpa_blocks,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&campaign.id)
        .bind(campaign.campaign_type.as_str())
        .bind(campaign.status)
        .bind(to_db(campaign.last_active_block))
        .bind(campaign.umax)
        .bind(campaign.cpa_blocks.map(to_db))
        .bind(campaign.created_at)
        .bind(campaign.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn active_campaigns(&mut self) -> Result<Vec<Campaign>> {
        let rows = sqlx::query("SELECT * FROM campaigns WHERE status = TRUE ORDER BY id")
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(campaign_from_row).collect()
    }

    async fn active_campaigns_between(&mut self, from_block: u64, to_block: u64) -> Result<Vec<Campaign>> {
        let rows = sqlx::query(
            "SELECT * FROM campaigns WHERE status = TRUE AND last_active_block BETWEEN $1 AND $2 ORDER BY id",
        )
        .bind(to_db(from_block))
        .bind(to_db(to_block))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(campaign_from_row).collect()
    }

    async fn get_queue_item(&mut self, id: &str) -> Result<Option<OrderQueueItem>> {
        let row = sqlx::query(&format!("SELECT {QUEUE_COLUMNS} FROM order_queue WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(queue_item_from_row).transpose()
    }

    async fn put_queue_item(&mut self, item: &OrderQueueItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_queue (id, order_info, refund_info, status, attempts, created_at, last_processing_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id)
            DO UPDATE SET
                order_info = EXCLUDED.order_info,
                refund_info = EXCLUDED.refund_info,
                status = EXCLUDED.status,
                attempts = EXCLUDED.attempts,
                last_processing_date = EXCLUDED.last_processing_date
            "#,
        )
        .bind(&item.id)
        .bind(item.order_info.as_ref().map(Json))
        .bind(item.refund_info.as_ref().map(Json))
        .bind(item.status.as_str())
        .bind(i32::try_from(item.attempts).unwrap_or(i32::MAX))
        .bind(item.created_at)
        .bind(item.last_processing_date)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn queue_items_for_processing(
        &mut self,
        limit: usize,
        max_attempts: u32,
    ) -> Result<Vec<OrderQueueItem>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {QUEUE_COLUMNS} FROM order_queue
            WHERE status IN ('PENDING', 'VISIT_NOT_FOUND')
               OR (status = 'ERROR' AND attempts < $2)
            ORDER BY last_processing_date ASC, id ASC
            LIMIT $1
            "#
        ))
        .bind(limit_to_db(limit))
        .bind(i32::try_from(max_attempts).unwrap_or(i32::MAX))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(queue_item_from_row).collect()
    }

    async fn add_miner_ping(&mut self, ping: &MinerPing) -> Result<()> {
        sqlx::query("INSERT INTO miner_pings (hotkey, block, created_at) VALUES ($1, $2, $3)")
            .bind(&ping.hotkey)
            .bind(to_db(ping.block))
            .bind(ping.created_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn miners_pinged_since(&mut self, since: DateTime<Utc>) -> Result<BTreeSet<String>> {
        let hotkeys: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT hotkey FROM miner_pings WHERE created_at >= $1")
                .bind(since)
                .fetch_all(&mut *self.tx)
                .await?;
        Ok(hotkeys.into_iter().collect())
    }

    async fn put_assignment(&mut self, assignment: &MinerAssignment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO miner_assignments (unique_id, hotkey, campaign_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (unique_id)
            DO UPDATE SET hotkey = EXCLUDED.hotkey, campaign_id = EXCLUDED.campaign_id
            "#,
        )
        .bind(&assignment.unique_id)
        .bind(&assignment.hotkey)
        .bind(&assignment.campaign_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_assignment(&mut self, unique_id: &str) -> Result<Option<MinerAssignment>> {
        let row = sqlx::query("SELECT unique_id, hotkey, campaign_id FROM miner_assignments WHERE unique_id = $1")
            .bind(unique_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(|row| {
            Ok(MinerAssignment {
                unique_id: row.try_get("unique_id")?,
                hotkey: row.try_get("hotkey")?,
                campaign_id: row.try_get("campaign_id")?,
            })
        })
        .transpose()
    }

    async fn add_order_history(&mut self, entry: &OrderHistoryEntry) -> Result<()> {
        sqlx::query("INSERT INTO order_history (id, hotkey, visit, created_at) VALUES ($1, $2, $3, $4)")
            .bind(&entry.id)
            .bind(&entry.hotkey)
            .bind(Json(&entry.visit))
            .bind(entry.created_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn order_history(&mut self, hotkey: &str, limit: usize) -> Result<Vec<OrderHistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, hotkey, visit, created_at FROM order_history
            WHERE hotkey = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(hotkey)
        .bind(limit_to_db(limit))
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(OrderHistoryEntry {
                    id: row.try_get("id")?,
                    hotkey: row.try_get("hotkey")?,
                    visit: row.try_get::<Json<VisitRecord>, _>("visit")?.0,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn visits_created_before(
        &mut self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<VisitRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {VISIT_COLUMNS} FROM visits WHERE created_at < $1 ORDER BY created_at ASC, id ASC LIMIT $2"
        ))
        .bind(cutoff)
        .bind(limit_to_db(limit))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(visit_from_row).collect()
    }

    async fn existing_visit_ids(&mut self, ids: &[String]) -> Result<HashSet<String>> {
        let found: Vec<String> = sqlx::query_scalar("SELECT id FROM visits WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(found.into_iter().collect())
    }

    async fn delete_visits(&mut self, ids: &[String]) -> Result<u64> {
        let result = sqlx::query("DELETE FROM visits WHERE id = ANY($1)")
            .bind(ids)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn queue_items_created_before(
        &mut self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OrderQueueItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {QUEUE_COLUMNS} FROM order_queue WHERE created_at < $1 ORDER BY created_at ASC, id ASC LIMIT $2"
        ))
        .bind(cutoff)
        .bind(limit_to_db(limit))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(queue_item_from_row).collect()
    }

    async fn existing_queue_ids(&mut self, ids: &[String]) -> Result<HashSet<String>> {
        let found: Vec<String> = sqlx::query_scalar("SELECT id FROM order_queue WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(found.into_iter().collect())
    }

    async fn delete_queue_items(&mut self, ids: &[String]) -> Result<u64> {
        let result = sqlx::query("DELETE FROM order_queue WHERE id = ANY($1)")
            .bind(ids)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }
}
