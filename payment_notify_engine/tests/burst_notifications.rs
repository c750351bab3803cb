use chrono::Utc;
use futures_util::future::join_all;
use log::*;
use payment_notify_engine::{
    ack::{AckDecision, ProcessingResult},
    db_types::{AuditEventType, MinorUnits, NewOrder, OrderId, OrderStatusType},
    reconciler::ReconcileOutcome,
    test_utils::{
        fixtures::{alipay_trade_params, stripe_event_body, GatewayFixture},
        prepare_env::{prepare_test_env, random_db_path},
    },
    NotificationApi,
    OrderStore,
    ProcessingSettings,
    SqliteDatabase,
};
use tokio::runtime::Runtime;

const NUM_DELIVERIES: usize = 20;

#[test]
fn burst_of_duplicate_deliveries() {
    info!("🚀️ Starting duplicate delivery burst test");
    let sys = Runtime::new().expect("Could not start runtime");
    sys.block_on(async move {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
        let fixture = GatewayFixture::new();
        let api = NotificationApi::new(db.clone(), fixture.keys.clone(), ProcessingSettings::default());
        let id = OrderId::from("BURST-1");
        db.insert_order(NewOrder::new(id.clone(), MinorUnits::from(9900), "CNY")).await.expect("Error inserting order");

        let deliveries = (0..NUM_DELIVERIES)
            .map(|_| {
                let params = alipay_trade_params("BURST-1", "T1", "TRADE_SUCCESS", "99.00");
                fixture.alipay_notification(&params, Utc::now())
            })
            .collect::<Vec<_>>();
        info!("🚀️ Delivering the same notification {NUM_DELIVERIES} times concurrently");
        let receipts = join_all(deliveries.iter().map(|raw| api.process_notification(raw))).await;

        let applied = receipts
            .iter()
            .filter(|r| matches!(r.result, ProcessingResult::Reconciled(ReconcileOutcome::Applied(_))))
            .count();
        assert_eq!(applied, 1);
        // Losers either saw the committed record or the live reservation. Nothing else is acceptable.
        for r in &receipts {
            assert!(matches!(
                r.result,
                ProcessingResult::Reconciled(_) | ProcessingResult::DuplicateSameDigest { .. } | ProcessingResult::InFlight
            ));
        }
        let order = db.fetch_order(&id).await.expect("Error fetching order").expect("Order is missing");
        assert_eq!(order.status, OrderStatusType::Paid);
        let trail = db.fetch_audit_events(&id).await.expect("Error fetching audit trail");
        assert_eq!(trail.iter().filter(|e| e.event_type == AuditEventType::StatusChanged).count(), 1);
        db.close().await;
    });
    info!("🚀️ test complete");
}

#[test]
fn burst_of_distinct_orders() {
    let sys = Runtime::new().expect("Could not start runtime");
    sys.block_on(async move {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
        let fixture = GatewayFixture::new();
        let api = NotificationApi::new(db.clone(), fixture.keys.clone(), ProcessingSettings::default());
        for i in 0..NUM_DELIVERIES {
            let order = NewOrder::new(OrderId::new(format!("ORD-{i}")), MinorUnits::from(1000 + i as i64), "USD");
            db.insert_order(order).await.expect("Error inserting order");
        }
        let deliveries = (0..NUM_DELIVERIES)
            .map(|i| {
                let body = stripe_event_body(&format!("evt_{i}"), "payment_intent.succeeded", &format!("ORD-{i}"), 1000 + i as i64);
                fixture.stripe_notification(&body, Utc::now())
            })
            .collect::<Vec<_>>();
        let receipts = join_all(deliveries.iter().map(|raw| api.process_notification(raw))).await;
        assert!(receipts.iter().all(|r| r.decision == AckDecision::Acknowledge));
        for i in 0..NUM_DELIVERIES {
            let order = db.fetch_order(&OrderId::new(format!("ORD-{i}"))).await.unwrap().unwrap();
            assert_eq!(order.status, OrderStatusType::Paid);
        }
        db.close().await;
    });
}
