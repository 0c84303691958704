use {
    super::visit::VisitRecord,
    crate::errors::{Error, Result},
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub province: String,
    pub country: String,
    #[serde(rename = "countryCode", alias = "country_code")]
    pub country_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub id: String,
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub browser_ip: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,
    /// Decimal string as received from the shop.
    pub price: String,
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub discount: Option<String>,
    #[serde(default)]
    pub gift_card: Option<bool>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Commerce payload attached to a sale or a refund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetails {
    #[serde(rename = "totalAmount", alias = "total_amount")]
    pub total_amount: String,
    pub items: Vec<OrderItem>,
    #[serde(rename = "customerInfo", alias = "customer_info")]
    pub customer_info: CustomerInfo,
    #[serde(rename = "clientInfo", alias = "client_info")]
    pub client_info: ClientInfo,
    #[serde(rename = "paymentMethod", alias = "payment_method")]
    pub payment_method: String,
    #[serde(default)]
    pub sale_date: Option<DateTime<Utc>>,
}

impl OrderDetails {
    pub fn amount(&self) -> Result<f64> {
        self.total_amount
            .trim()
            .parse::<f64>()
            .map_err(|_| Error::Serialization(format!("invalid total amount {:?}", self.total_amount)))
    }

    /// Number of units in the order. Items without a quantity count once.
    pub fn item_count(&self) -> u64 {
        self.items
            .iter()
            .map(|item| u64::from(item.quantity.unwrap_or(1)))
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleAction {
    Sale,
    Refund,
}

/// A commerce notification as submitted by the ingestion boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleEvent {
    #[serde(rename = "type")]
    pub action: SaleAction,
    pub order_details: OrderDetails,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderQueueStatus {
    #[default]
    Pending,
    VisitNotFound,
    Processed,
    Error,
}

impl OrderQueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderQueueStatus::Pending => "PENDING",
            OrderQueueStatus::VisitNotFound => "VISIT_NOT_FOUND",
            OrderQueueStatus::Processed => "PROCESSED",
            OrderQueueStatus::Error => "ERROR",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(OrderQueueStatus::Pending),
            "VISIT_NOT_FOUND" => Some(OrderQueueStatus::VisitNotFound),
            "PROCESSED" => Some(OrderQueueStatus::Processed),
            "ERROR" => Some(OrderQueueStatus::Error),
            _ => None,
        }
    }
}

/// A pending commerce event keyed by the visit id it refers to.
///
/// `refund_info` is only ever set on an item that already carries `order_info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderQueueItem {
    pub id: String,
    pub order_info: Option<OrderDetails>,
    pub refund_info: Option<OrderDetails>,
    pub status: OrderQueueStatus,
    /// Failed apply attempts since the last submitted event.
    #[serde(default)]
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub last_processing_date: DateTime<Utc>,
}

impl OrderQueueItem {
    pub fn new_sale(id: impl Into<String>, order_info: OrderDetails, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            order_info: Some(order_info),
            refund_info: None,
            status: OrderQueueStatus::Pending,
            attempts: 0,
            created_at: now,
            last_processing_date: now,
        }
    }
}

/// Snapshot of a visit at the moment an order was applied to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderHistoryEntry {
    pub id: String,
    pub hotkey: String,
    pub visit: VisitRecord,
    pub created_at: DateTime<Utc>,
}
