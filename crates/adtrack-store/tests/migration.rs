mod common;

use {
    adtrack_common::types::{OrderHistoryEntry, SalesStatus},
    adtrack_store::{migrate, Stores, UnitOfWork},
    common::{ts, visit},
    tokio_test::assert_ok,
};

async fn seed(stores: &Stores) {
    let mut uow = assert_ok!(UnitOfWork::begin(stores.active.as_ref()).await);
    for (id, hour) in [("old-1", 1), ("old-2", 2), ("old-3", 3), ("new-1", 10)] {
        assert_ok!(uow.put_visit(&visit(id, "c1", "i1", ts(hour))).await);
    }
    assert_ok!(uow.commit().await);

    let mut uow = assert_ok!(UnitOfWork::begin(stores.main.as_ref()).await);
    assert_ok!(
        uow.add_order_history(&OrderHistoryEntry {
            id: "old-1".into(),
            hotkey: "miner-1".into(),
            visit: visit("old-1", "c1", "i1", ts(1)),
            created_at: ts(1),
        })
        .await
    );
    assert_ok!(uow.commit().await);
}

#[tokio::test]
async fn test_migrate_moves_old_rows_in_batches() {
    let stores = Stores::in_memory();
    seed(&stores).await;

    let report = assert_ok!(migrate(stores.active.as_ref(), stores.history.as_ref(), ts(5), 2).await);
    assert_eq!(report.visits_moved, 3);
    assert_eq!(report.queue_items_moved, 0);

    let mut active = assert_ok!(UnitOfWork::begin(stores.active.as_ref()).await);
    let remaining = assert_ok!(active.visits_after(None, 100).await);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, "new-1");

    let mut history = assert_ok!(UnitOfWork::begin(stores.history.as_ref()).await);
    let archived = assert_ok!(history.visits_after(None, 100).await);
    let ids: Vec<_> = archived.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(ids, vec!["old-1", "old-2", "old-3"]);

    let mut main = assert_ok!(UnitOfWork::begin(stores.main.as_ref()).await);
    assert_eq!(assert_ok!(main.order_history("miner-1", 10).await).len(), 1);
}

#[tokio::test]
async fn test_migrate_after_partial_copy_keeps_history_copy() {
    let stores = Stores::in_memory();
    seed(&stores).await;

    // A previous run copied old-1 but died before deleting it from active.
    let mut archived = visit("old-1", "c1", "i1", ts(1));
    archived.sales_status = SalesStatus::Completed;
    let mut uow = assert_ok!(UnitOfWork::begin(stores.history.as_ref()).await);
    assert_ok!(uow.put_visit(&archived).await);
    assert_ok!(uow.commit().await);

    let report = assert_ok!(migrate(stores.active.as_ref(), stores.history.as_ref(), ts(5), 1000).await);
    assert_eq!(report.visits_moved, 3);

    let mut history = assert_ok!(UnitOfWork::begin(stores.history.as_ref()).await);
    let rows = assert_ok!(history.visits_after(None, 100).await);
    assert_eq!(rows.len(), 3);
    let first = assert_ok!(history.get_visit("old-1").await).unwrap();
    assert_eq!(first.sales_status, SalesStatus::Completed);
    drop(history);

    let again = assert_ok!(migrate(stores.active.as_ref(), stores.history.as_ref(), ts(5), 1000).await);
    assert_eq!(again.visits_moved, 0);
}
