use {
    super::order::OrderDetails,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Device {
    Pc,
    Mobile,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Pc => "PC",
            Device::Mobile => "MOBILE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PC" => Some(Device::Pc),
            "MOBILE" => Some(Device::Mobile),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SalesStatus {
    #[default]
    New,
    Completed,
}

impl SalesStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SalesStatus::New => "NEW",
            SalesStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "NEW" => Some(SalesStatus::New),
            "COMPLETED" => Some(SalesStatus::Completed),
            _ => None,
        }
    }
}

/// Who reported an incoming visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisitSource {
    Miner,
    Validator,
}

/// Behavioral counters observed by the validator's tracking script.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorCounters {
    pub count_image_click: u64,
    pub count_mouse_movement: u64,
    pub count_read_more_click: u64,
    pub count_through_rate_click: u64,
    /// Seconds.
    pub visit_duration: u64,
}

/// Canonical tracking record, one per visit id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitRecord {
    pub id: String,
    pub ip_address: String,
    pub user_agent: String,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub device: Option<Device>,
    pub campaign_id: Option<String>,
    pub campaign_item: Option<String>,
    pub referer: Option<String>,
    pub miner_hotkey: Option<String>,
    pub miner_block: Option<u64>,
    pub validator_hotkey: Option<String>,
    pub validator_block: Option<u64>,
    pub is_unique: bool,
    pub return_in_site: bool,
    /// Attention flag reported by the tracking script.
    pub at: bool,
    #[serde(flatten)]
    pub counters: BehaviorCounters,
    pub sales_status: SalesStatus,
    pub refund: u64,
    pub sales: u64,
    pub sale_amount: f64,
    pub order_info: Option<OrderDetails>,
    pub refund_info: Option<OrderDetails>,
    pub sale_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VisitRecord {
    pub fn is_completed(&self) -> bool {
        self.sales_status == SalesStatus::Completed
    }

    /// Commerce fields as one unit, used when a peer's copy carries a newer sale state.
    pub fn sales_snapshot(&self) -> SalesSnapshot {
        SalesSnapshot {
            sales_status: self.sales_status,
            refund: self.refund,
            sales: self.sales,
            sale_amount: self.sale_amount,
            order_info: self.order_info.clone(),
            refund_info: self.refund_info.clone(),
            sale_date: self.sale_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesSnapshot {
    pub sales_status: SalesStatus,
    pub refund: u64,
    pub sales: u64,
    pub sale_amount: f64,
    pub order_info: Option<OrderDetails>,
    pub refund_info: Option<OrderDetails>,
    pub sale_date: Option<DateTime<Utc>>,
}

/// A partial visit observation from a miner report, the local tracker or a peer.
/// Absent fields mean "not observed by this reporter".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingVisit {
    pub id: String,
    pub source: VisitSource,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub device: Option<Device>,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub campaign_item: Option<String>,
    #[serde(default)]
    pub referer: Option<String>,
    #[serde(default)]
    pub miner_hotkey: Option<String>,
    #[serde(default)]
    pub miner_block: Option<u64>,
    #[serde(default)]
    pub validator_hotkey: Option<String>,
    #[serde(default)]
    pub validator_block: Option<u64>,
    #[serde(default)]
    pub at: Option<bool>,
    #[serde(default)]
    pub counters: Option<BehaviorCounters>,
    #[serde(default)]
    pub sales: Option<SalesSnapshot>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl IncomingVisit {
    /// An empty observation for `id`, filled in by the caller.
    pub fn new(id: impl Into<String>, source: VisitSource) -> Self {
        Self {
            id: id.into(),
            source,
            ip_address: None,
            user_agent: None,
            country: None,
            country_code: None,
            device: None,
            campaign_id: None,
            campaign_item: None,
            referer: None,
            miner_hotkey: None,
            miner_block: None,
            validator_hotkey: None,
            validator_block: None,
            at: None,
            counters: None,
            sales: None,
            created_at: None,
            updated_at: None,
        }
    }
}

impl From<VisitRecord> for IncomingVisit {
    /// A record pulled from another validator.
    fn from(record: VisitRecord) -> Self {
        let sales = record.sales_snapshot();
        Self {
            id: record.id,
            source: VisitSource::Validator,
            ip_address: Some(record.ip_address),
            user_agent: Some(record.user_agent),
            country: record.country,
            country_code: record.country_code,
            device: record.device,
            campaign_id: record.campaign_id,
            campaign_item: record.campaign_item,
            referer: record.referer,
            miner_hotkey: record.miner_hotkey,
            miner_block: record.miner_block,
            validator_hotkey: record.validator_hotkey,
            validator_block: record.validator_block,
            at: Some(record.at),
            counters: Some(record.counters),
            sales: Some(sales),
            created_at: Some(record.created_at),
            updated_at: Some(record.updated_at),
        }
    }
}
