mod common;

use {
    adtrack_common::types::{
        AggregationQuery, Campaign, CampaignType, MinerAssignment, MinerPing, OrderQueueStatus,
        SalesStatus,
    },
    adtrack_store::{MemoryStore, Store, StoreError, UnitOfWork},
    chrono::Duration,
    common::{ts, visit},
    tokio_test::assert_ok,
};

#[tokio::test]
async fn test_commit_publishes_and_drop_discards() {
    let store = MemoryStore::new("active");

    let mut uow = assert_ok!(UnitOfWork::begin(&store).await);
    assert_ok!(uow.put_visit(&visit("a", "c1", "i1", ts(1))).await);
    assert_ok!(uow.commit().await);

    {
        let mut session = assert_ok!(store.begin().await);
        assert_ok!(session.put_visit(&visit("b", "c1", "i1", ts(2))).await);
        // dropped without commit
    }

    let mut uow = assert_ok!(UnitOfWork::begin(&store).await);
    assert!(assert_ok!(uow.get_visit("a").await).is_some());
    assert!(assert_ok!(uow.get_visit("b").await).is_none());
}

#[tokio::test]
async fn test_finish_rolls_back_on_error() {
    let store = MemoryStore::new("active");

    let mut uow = assert_ok!(UnitOfWork::begin(&store).await);
    let written = uow.put_visit(&visit("a", "c1", "i1", ts(1))).await;
    let failed: Result<(), StoreError> = written.and(Err(StoreError::Config("boom".into())));
    assert!(uow.finish(failed).await.is_err());

    let mut uow = assert_ok!(UnitOfWork::begin(&store).await);
    assert!(assert_ok!(uow.get_visit("a").await).is_none());
}

#[tokio::test]
async fn test_visit_existence_windows() {
    let store = MemoryStore::new("active");
    let mut uow = assert_ok!(UnitOfWork::begin(&store).await);
    assert_ok!(uow.put_visit(&visit("a", "c1", "i1", ts(5))).await);

    let ip = "192.168.1.10";
    assert!(assert_ok!(uow.visit_exists_after(ip, "c1", ts(4)).await));
    assert!(!assert_ok!(uow.visit_exists_after(ip, "c1", ts(5)).await));
    assert!(assert_ok!(uow.visit_exists_before(ip, "c1", ts(6)).await));
    assert!(!assert_ok!(uow.visit_exists_before(ip, "c1", ts(5)).await));
    assert!(!assert_ok!(uow.visit_exists_after(ip, "c2", ts(0)).await));
    assert!(!assert_ok!(uow.visit_exists_after("10.0.0.1", "c1", ts(0)).await));
}

#[tokio::test]
async fn test_visits_after_is_ordered_and_limited() {
    let store = MemoryStore::new("active");
    let mut uow = assert_ok!(UnitOfWork::begin(&store).await);
    for (id, hour) in [("c", 3), ("a", 1), ("b", 2), ("d", 4)] {
        assert_ok!(uow.put_visit(&visit(id, "c1", "i1", ts(hour))).await);
    }

    let page = assert_ok!(uow.visits_after(Some(ts(1)), 2).await);
    let ids: Vec<_> = page.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "c"]);

    let all = assert_ok!(uow.visits_after(None, 10).await);
    assert_eq!(all.len(), 4);
}

#[tokio::test]
async fn test_aggregate_joins_assignments() {
    let store = MemoryStore::new("active");
    let mut uow = assert_ok!(UnitOfWork::begin(&store).await);

    assert_ok!(
        uow.put_assignment(&MinerAssignment {
            unique_id: "i1".into(),
            hotkey: "miner-1".into(),
            campaign_id: "c1".into(),
        })
        .await
    );
    let mut sold = visit("a", "c1", "i1", ts(1));
    sold.sales = 2;
    sold.sale_amount = 40.0;
    sold.at = true;
    assert_ok!(uow.put_visit(&sold).await);
    let mut repeat = visit("b", "c1", "i1", ts(2));
    repeat.is_unique = false;
    assert_ok!(uow.put_visit(&repeat).await);
    assert_ok!(uow.put_visit(&visit("orphan", "c1", "unassigned", ts(3))).await);

    let data = assert_ok!(uow.aggregate(&AggregationQuery::for_campaigns(["c1"])).await);
    let schema = data["c1"]["miner-1"];
    assert_eq!(data.len(), 1);
    assert_eq!(data["c1"].len(), 1);
    assert_eq!(schema.visits, 2);
    assert_eq!(schema.visits_unique, 1);
    assert_eq!(schema.at, 1);
    assert_eq!(schema.total_sales, 2);
    assert!((schema.sales_amount - 40.0).abs() < 1e-9);

    let reputation = assert_ok!(uow.miners_reputation(&AggregationQuery::default()).await);
    assert_eq!(reputation.get("miner-1"), Some(&2.0));

    let empty = assert_ok!(uow.aggregate(&AggregationQuery::for_campaigns(["missing"])).await);
    assert!(empty.is_empty());
}

#[tokio::test]
async fn test_complete_sales_before_cutoff() {
    let store = MemoryStore::new("active");
    let mut uow = assert_ok!(UnitOfWork::begin(&store).await);

    let mut old = visit("old", "c1", "i1", ts(1));
    old.sale_date = Some(ts(1));
    let mut fresh = visit("fresh", "c1", "i1", ts(1));
    fresh.sale_date = Some(ts(10));
    let no_sale = visit("none", "c1", "i1", ts(1));
    for record in [&old, &fresh, &no_sale] {
        assert_ok!(uow.put_visit(record).await);
    }

    let changed = assert_ok!(uow.complete_sales_before("c1", ts(5), ts(12)).await);
    assert_eq!(changed, 1);
    let old = assert_ok!(uow.get_visit("old").await).unwrap();
    assert_eq!(old.sales_status, SalesStatus::Completed);
    assert_eq!(old.updated_at, ts(12));
    assert_eq!(
        assert_ok!(uow.get_visit("fresh").await).unwrap().sales_status,
        SalesStatus::New
    );

    assert_eq!(assert_ok!(uow.complete_sales_before("c1", ts(5), ts(13)).await), 0);
}

#[tokio::test]
async fn test_queue_selection_order_and_attempt_cap() {
    use adtrack_common::types::{Address, ClientInfo, CustomerInfo, OrderDetails, OrderQueueItem};

    let details = OrderDetails {
        total_amount: "10".into(),
        items: vec![],
        customer_info: CustomerInfo {
            id: "c".into(),
            address: Address {
                province: "p".into(),
                country: "c".into(),
                country_code: "CC".into(),
            },
        },
        client_info: ClientInfo {
            browser_ip: "1.1.1.1".into(),
            user_agent: "ua".into(),
        },
        payment_method: "card".into(),
        sale_date: None,
    };

    let store = MemoryStore::new("active");
    let mut uow = assert_ok!(UnitOfWork::begin(&store).await);

    let mut items = Vec::new();
    for (id, hour, status, attempts) in [
        ("late", 5, OrderQueueStatus::Pending, 0),
        ("early", 1, OrderQueueStatus::VisitNotFound, 0),
        ("done", 0, OrderQueueStatus::Processed, 0),
        ("retry", 2, OrderQueueStatus::Error, 1),
        ("exhausted", 3, OrderQueueStatus::Error, 3),
    ] {
        let mut item = OrderQueueItem::new_sale(id, details.clone(), ts(hour));
        item.status = status;
        item.attempts = attempts;
        items.push(item);
    }
    for item in &items {
        assert_ok!(uow.put_queue_item(item).await);
    }

    let selected = assert_ok!(uow.queue_items_for_processing(10, 3).await);
    let ids: Vec<_> = selected.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["early", "retry", "late"]);

    let limited = assert_ok!(uow.queue_items_for_processing(1, 3).await);
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn test_campaigns_and_pings() {
    let store = MemoryStore::new("active");
    let mut uow = assert_ok!(UnitOfWork::begin(&store).await);

    let mut inactive = Campaign::new("c2", CampaignType::Cpa, 10, ts(1));
    inactive.status = false;
    assert_ok!(uow.put_campaign(&Campaign::new("c1", CampaignType::Regular, 10, ts(1))).await);
    assert_ok!(uow.put_campaign(&inactive).await);

    let active = assert_ok!(uow.active_campaigns().await);
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, "c1");

    assert_ok!(uow.put_campaign(&Campaign::new("c3", CampaignType::Cpa, 50, ts(1))).await);
    let ids = |campaigns: Vec<Campaign>| campaigns.into_iter().map(|c| c.id).collect::<Vec<_>>();
    let mut both = ids(assert_ok!(uow.active_campaigns_between(10, 50).await));
    both.sort();
    assert_eq!(both, vec!["c1".to_string(), "c3".to_string()]);
    assert_eq!(ids(assert_ok!(uow.active_campaigns_between(11, 60).await)), vec!["c3".to_string()]);
    assert_eq!(ids(assert_ok!(uow.active_campaigns_between(0, 49).await)), vec!["c1".to_string()]);
    assert!(assert_ok!(uow.active_campaigns_between(51, 100).await).is_empty());

    for (hotkey, hour) in [("m1", 1), ("m2", 5), ("m2", 6)] {
        assert_ok!(
            uow.add_miner_ping(&MinerPing {
                hotkey: hotkey.into(),
                block: 1,
                created_at: ts(hour),
            })
            .await
        );
    }
    let recent = assert_ok!(uow.miners_pinged_since(ts(1) + Duration::minutes(1)).await);
    assert_eq!(recent.into_iter().collect::<Vec<_>>(), vec!["m2".to_string()]);
}
