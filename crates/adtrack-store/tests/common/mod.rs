use {
    adtrack_common::types::{BehaviorCounters, SalesStatus, VisitRecord},
    chrono::{DateTime, TimeZone, Utc},
};

pub fn ts(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()
}

pub fn visit(id: &str, campaign: &str, item: &str, created_at: DateTime<Utc>) -> VisitRecord {
    VisitRecord {
        id: id.to_string(),
        ip_address: "192.168.1.10".to_string(),
        user_agent: "Mozilla/5.0".to_string(),
        country: Some("Canada".to_string()),
        country_code: Some("CA".to_string()),
        device: None,
        campaign_id: Some(campaign.to_string()),
        campaign_item: Some(item.to_string()),
        referer: None,
        miner_hotkey: Some("miner-hotkey".to_string()),
        miner_block: Some(10),
        validator_hotkey: Some("validator-hotkey".to_string()),
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
