#![allow(dead_code)]

use {
    adtrack_common::{
        config::ValidatorConfig,
        types::{
            Address, BehaviorCounters, ClientInfo, CustomerInfo, IncomingVisit, OrderDetails, OrderItem,
            SalesStatus, VisitRecord, VisitSource,
        },
    },
    adtrack_store::Stores,
    adtrack_validator::{
        chain::Chain,
        feed::{FeedClient, FeedSnapshot},
        peers::{NotifyOrderRequest, PeerClient, PingRequest, PingResponse, SyncVisitsRequest},
        Result, Validator, ValidatorContext,
    },
    async_trait::async_trait,
    chrono::{DateTime, TimeZone, Utc},
    mockall::mock,
    std::{collections::BTreeMap, sync::Arc},
};

mock! {
    pub Peers {}

    #[async_trait]
    impl PeerClient for Peers {
        async fn ping(&self, peer: &str, request: &PingRequest) -> Result<PingResponse>;
        async fn sync_visits(&self, peer: &str, request: &SyncVisitsRequest) -> Result<Vec<VisitRecord>>;
        async fn notify_order(&self, peer: &str, request: &NotifyOrderRequest) -> Result<()>;
    }
}

mock! {
    pub Feed {}

    #[async_trait]
    impl FeedClient for Feed {
        async fn fetch(&self) -> Result<FeedSnapshot>;
    }
}

mock! {
    pub Ledger {}

    #[async_trait]
    impl Chain for Ledger {
        async fn current_block(&self) -> Result<u64>;
        async fn set_weights(&self, weights: &BTreeMap<String, f64>) -> Result<()>;
    }
}

pub const HOTKEY: &str = "validator-1";

pub fn ts(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()
}

pub fn validator(peers: MockPeers, feed: MockFeed, chain: MockLedger) -> Validator {
    let config = ValidatorConfig {
        hotkey: HOTKEY.to_string(),
        ..ValidatorConfig::default()
    };
    let ctx = ValidatorContext::new(
        config,
        Stores::in_memory(),
        Arc::new(peers),
        Arc::new(feed),
        Arc::new(chain),
    );
    let (validator, _shutdown_tx) = Validator::new(ctx);
    validator
}

pub fn chain_at(block: u64) -> MockLedger {
    let mut chain = MockLedger::new();
    chain.expect_current_block().returning(move || Ok(block));
    chain
}

/// What the local tracker reports for a visit on campaign `c1`.
pub fn observed(id: &str, ip: &str, validator_block: u64) -> IncomingVisit {
    let mut visit = IncomingVisit::new(id, VisitSource::Validator);
    visit.ip_address = Some(ip.to_string());
    visit.user_agent = Some("Mozilla/5.0".to_string());
    visit.campaign_id = Some("c1".to_string());
    visit.campaign_item = Some("item-1".to_string());
    visit.validator_hotkey = Some(HOTKEY.to_string());
    visit.validator_block = Some(validator_block);
    visit.counters = Some(BehaviorCounters::default());
    visit
}

/// A record as served by another validator.
pub fn peer_visit(id: &str, created_at: DateTime<Utc>) -> VisitRecord {
    VisitRecord {
        id: id.to_string(),
        ip_address: format!("10.0.0.{}", created_at.timestamp() % 250),
        user_agent: "Mozilla/5.0".to_string(),
        country: Some("Canada".to_string()),
        country_code: Some("CA".to_string()),
        device: None,
        campaign_id: Some("c1".to_string()),
        campaign_item: Some("item-1".to_string()),
        referer: None,
        miner_hotkey: Some("miner-1".to_string()),
        miner_block: Some(10),
        validator_hotkey: Some("validator-2".to_string()),
        validator_block: Some(20),
        is_unique: true,
        return_in_site: false,
        at: false,
        counters: BehaviorCounters::default(),
        sales_status: SalesStatus::New,
        refund: 0,
        sales: 0,
        sale_amount: 0.0,
        order_info: None,
        refund_info: None,
        sale_date: None,
        created_at,
        updated_at: created_at,
    }
}

pub fn order(amount: &str, quantity: u32, sale_date: DateTime<Utc>) -> OrderDetails {
    OrderDetails {
        total_amount: amount.to_string(),
        items: vec![OrderItem {
            name: "mug".to_string(),
            price: amount.to_string(),
            quantity: Some(quantity),
            discount: None,
            gift_card: None,
            currency: None,
        }],
        customer_info: CustomerInfo {
            id: "customer-1".to_string(),
            address: Address {
                province: "ON".to_string(),
                country: "Canada".to_string(),
                country_code: "CA".to_string(),
            },
        },
        client_info: ClientInfo {
            browser_ip: "10.1.1.1".to_string(),
            user_agent: "Mozilla/5.0".to_string(),
        },
        payment_method: "card".to_string(),
        sale_date: Some(sale_date),
    }
}
