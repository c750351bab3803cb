use chrono::{Duration, Utc};
use cucumber::given;
use payment_notify_engine::{
    db_types::{GatewayId, MinorUnits, NewOrder, OrderId},
    normalizer::normalize,
    test_utils::fixtures::alipay_trade_params,
    IdempotencyStore,
    OrderStore,
};

use crate::cucumber::{notification_world::NotificationSystem, NotificationWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut NotificationWorld) {
    let system = NotificationSystem::new().await;
    world.system = Some(system);
}

#[given(expr = "an order {word} for {word} {word}")]
async fn an_order(world: &mut NotificationWorld, order_id: String, amount: String, currency: String) {
    let amount = MinorUnits::from_major_str(&amount).expect("Invalid amount");
    let order = NewOrder::new(OrderId::from(order_id), amount, &currency);
    world.system().db.insert_order(order).await.expect("Error inserting order");
}

#[given(expr = "another handler reserved Alipay trade {word} for order {word} and {word} {int} minutes ago")]
async fn stale_reservation(world: &mut NotificationWorld, trade_no: String, order_id: String, amount: String, mins: i64) {
    let params = alipay_trade_params(&order_id, &trade_no, "TRADE_SUCCESS", &amount);
    let then = Utc::now() - Duration::minutes(mins);
    let raw = world.system().gateways.alipay_notification(&params, then);
    let event = normalize(GatewayId::Alipay, &raw.body, then).expect("Could not normalize notification");
    let reserved = world
        .system()
        .db
        .conditional_insert(&event.ledger_key(), event.payload_digest(), then)
        .await
        .expect("Error reserving ledger key");
    assert!(reserved);
    world.last_alipay_params = Some(params);
}
