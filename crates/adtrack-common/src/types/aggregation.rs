use {
    super::visit::VisitRecord,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::collections::BTreeMap,
};

/// Summary counters for one (campaign, miner) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationSchema {
    pub visits: u64,
    pub visits_unique: u64,
    /// Number of visits with the attention flag set.
    pub at: u64,
    pub count_through_rate_click: u64,
    pub total_sales: u64,
    pub total_refunds: u64,
    pub sales_amount: f64,
}

impl AggregationSchema {
    pub fn add(&mut self, record: &VisitRecord) {
        self.visits += 1;
        self.visits_unique += u64::from(record.is_unique);
        self.at += u64::from(record.at);
        self.count_through_rate_click += record.counters.count_through_rate_click;
        self.total_sales += record.sales;
        self.total_refunds += record.refund;
        self.sales_amount += record.sale_amount;
    }
}

/// campaign id -> miner hotkey -> counters
pub type AggregatedData = BTreeMap<String, BTreeMap<String, AggregationSchema>>;

/// miner hotkey -> summed sales
pub type MinersReputation = BTreeMap<String, f64>;

/// Filter for an aggregation pass. An empty campaign list selects every campaign.
///
/// Block bounds apply to `validator_block` and are inclusive on both ends;
/// a record without a validator block never matches a block-bounded query.
/// Date bounds apply to `created_at` and are inclusive on both ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationQuery {
    pub campaign_ids: Vec<String>,
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
}

impl AggregationQuery {
    pub fn for_campaigns<I, S>(campaign_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            campaign_ids: campaign_ids.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn blocks(mut self, from_block: Option<u64>, to_block: Option<u64>) -> Self {
        self.from_block = from_block;
        self.to_block = to_block;
        self
    }

    pub fn dates(mut self, from_date: Option<DateTime<Utc>>, to_date: Option<DateTime<Utc>>) -> Self {
        self.from_date = from_date;
        self.to_date = to_date;
        self
    }

    pub fn matches(&self, record: &VisitRecord) -> bool {
        let Some(campaign_id) = record.campaign_id.as_ref() else {
            return false;
        };
        if !self.campaign_ids.is_empty() && !self.campaign_ids.iter().any(|c| c == campaign_id) {
            return false;
        }

        if self.from_block.is_some() || self.to_block.is_some() {
            let Some(block) = record.validator_block else {
                return false;
            };
            if self.from_block.is_some_and(|from| block < from) {
                return false;
            }
            if self.to_block.is_some_and(|to| block > to) {
                return false;
            }
        }

        if self.from_date.is_some_and(|from| record.created_at < from) {
            return false;
        }
        if self.to_date.is_some_and(|to| record.created_at > to) {
            return false;
        }
        true
    }
}
