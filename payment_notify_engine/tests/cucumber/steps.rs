use std::str::FromStr;

use chrono::Utc;
use cucumber::{then, when};
use payment_notify_engine::{
    ack::{AckDecision, ProcessingResult},
    db_types::{GatewayId, LedgerKey, LedgerState, OrderId, OrderStatusType},
    reconciler::{ConflictReason, NoOpReason, ReconcileOutcome},
    test_utils::fixtures::{alipay_trade_params, stripe_event_body},
    verifier::RawNotification,
    IdempotencyStore,
    OrderStore,
};

use crate::cucumber::NotificationWorld;

async fn send_alipay(world: &mut NotificationWorld, params: Vec<(String, String)>) {
    let raw = world.system().gateways.alipay_notification(&params, Utc::now());
    let receipt = world.system().api.process_notification(&raw).await;
    world.last_receipt = Some(receipt);
    world.last_alipay_params = Some(params);
}

#[when(expr = "Alipay notifies trade {word} for order {word} with status {word} and amount {word}")]
async fn alipay_notification(world: &mut NotificationWorld, trade_no: String, order_id: String, status: String, amount: String) {
    let params = alipay_trade_params(&order_id, &trade_no, &status, &amount);
    send_alipay(world, params).await;
}

#[when(expr = "Alipay notifies a full refund of trade {word} for order {word} with amount {word}")]
async fn alipay_refund(world: &mut NotificationWorld, trade_no: String, order_id: String, amount: String) {
    let mut params = alipay_trade_params(&order_id, &trade_no, "TRADE_CLOSED", &amount);
    params.push(("out_biz_no".to_string(), format!("{trade_no}-R1")));
    params.push(("refund_fee".to_string(), amount.clone()));
    params.push(("gmt_refund".to_string(), "2024-05-03 10:00:00".to_string()));
    send_alipay(world, params).await;
}

#[when("Alipay redelivers the last notification")]
async fn alipay_redelivery(world: &mut NotificationWorld) {
    let mut params = world.last_alipay_params.clone().expect("No Alipay notification has been sent yet");
    // Redeliveries carry a fresh notify_id
    for (k, v) in params.iter_mut() {
        if k == "notify_id" {
            *v = format!("ntf{}", rand::random::<u32>());
        }
    }
    send_alipay(world, params).await;
}

#[when(expr = "a tampered Alipay notification arrives for trade {word} and order {word} with amount {word}")]
async fn tampered_alipay(world: &mut NotificationWorld, trade_no: String, order_id: String, amount: String) {
    let params = alipay_trade_params(&order_id, &trade_no, "TRADE_SUCCESS", &amount);
    let body = world.system().gateways.signed_alipay_body(&params);
    let body = body.replace(&format!("total_amount={amount}"), "total_amount=0.01");
    let raw = RawNotification::new(GatewayId::Alipay, body.into_bytes(), Utc::now());
    let receipt = world.system().api.process_notification(&raw).await;
    world.last_receipt = Some(receipt);
}

#[when(expr = "Stripe sends event {word} of type {word} for order {word} with amount {int}")]
async fn stripe_event(world: &mut NotificationWorld, event_id: String, event_type: String, order_id: String, amount: i64) {
    let body = stripe_event_body(&event_id, &event_type, &order_id, amount);
    let raw = world.system().gateways.stripe_notification(&body, Utc::now());
    let receipt = world.system().api.process_notification(&raw).await;
    world.last_receipt = Some(receipt);
}

#[then(expr = "order {word} is {word}")]
async fn order_status(world: &mut NotificationWorld, order_id: String, status: String) {
    let expected = OrderStatusType::from_str(&status).expect("Invalid order status");
    let order = world
        .system()
        .db
        .fetch_order(&OrderId::from(order_id))
        .await
        .expect("Error fetching order")
        .expect("Order does not exist");
    assert_eq!(order.status, expected);
}

#[then("the notification is acknowledged")]
async fn acknowledged(world: &mut NotificationWorld) {
    let receipt = world.receipt();
    assert_eq!(receipt.decision, AckDecision::Acknowledge, "{}", receipt.result);
}

#[then("the notification is rejected")]
async fn rejected(world: &mut NotificationWorld) {
    let receipt = world.receipt();
    assert_eq!(receipt.decision, AckDecision::Reject, "{}", receipt.result);
}

#[then(expr = "the gateway receives {string}")]
async fn gateway_body(world: &mut NotificationWorld, body: String) {
    assert_eq!(world.receipt().response().body, body);
}

#[then(expr = "the outcome is {string}")]
async fn outcome(world: &mut NotificationWorld, expected: String) {
    let result = &world.receipt().result;
    let label = match result {
        ProcessingResult::VerificationFailed { .. } => "verification failed",
        ProcessingResult::NormalizationFailed(_) => "normalization failed",
        ProcessingResult::StoreFailure(_) => "store failure",
        ProcessingResult::InFlight => "in flight",
        ProcessingResult::DuplicateSameDigest { .. } => "duplicate",
        ProcessingResult::DuplicateConflictingDigest => "conflicting duplicate",
        ProcessingResult::Reconciled(ReconcileOutcome::Applied(_)) => "applied",
        ProcessingResult::Reconciled(ReconcileOutcome::NoOp(NoOpReason::UnknownOrder)) => "unknown order",
        ProcessingResult::Reconciled(ReconcileOutcome::NoOp(_)) => "no-op",
        ProcessingResult::Reconciled(ReconcileOutcome::Conflict(ConflictReason::AmountMismatch { .. })) => {
            "amount mismatch"
        },
        ProcessingResult::Reconciled(ReconcileOutcome::Conflict(_)) => "conflict",
    };
    assert_eq!(label, expected, "{result}");
}

#[then(expr = "order {word} has {int} {word} audit event(s)")]
async fn audit_count(world: &mut NotificationWorld, order_id: String, count: usize, event_type: String) {
    let events = world
        .system()
        .db
        .fetch_audit_events(&OrderId::from(order_id))
        .await
        .expect("Error fetching audit trail");
    let n = events.iter().filter(|e| format!("{}", e.event_type) == event_type).count();
    assert_eq!(n, count, "{events:?}");
}

#[then(expr = "the ledger has no record of Alipay transaction {word}")]
async fn no_ledger_record(world: &mut NotificationWorld, tx_id: String) {
    let key = LedgerKey::new(GatewayId::Alipay, tx_id);
    let record = world.system().db.read(&key).await.expect("Error reading ledger");
    assert!(record.is_none(), "{record:?}");
}

#[then(expr = "the ledger has committed Alipay transaction {word} after {int} attempt(s)")]
async fn committed_ledger_record(world: &mut NotificationWorld, tx_id: String, attempts: i64) {
    let key = LedgerKey::new(GatewayId::Alipay, tx_id);
    let record = world.system().db.read(&key).await.expect("Error reading ledger").expect("No ledger record");
    assert_eq!(record.state, LedgerState::Committed);
    assert_eq!(record.attempts, attempts);
}
