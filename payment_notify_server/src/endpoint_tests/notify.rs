use std::net::{IpAddr, SocketAddr};

use actix_web::{http::StatusCode, test::TestRequest, web, web::ServiceConfig};
use chrono::Utc;
use payment_notify_engine::{
    db_types::{NewOrder, OrderId, OrderStatusType},
    test_utils::fixtures::{alipay_trade_params, stripe_event_body, GatewayFixture},
    verifier::{GatewayKeys, STRIPE_SIGNATURE_HEADER},
    MemoryDatabase,
    NotificationApi,
    OrderStore,
    ProcessingSettings,
};
use pns_common::MinorUnits;

use super::helpers::send;
use crate::{config::ServerOptions, server::notify_scope};

const NO_PROXY: ServerOptions = ServerOptions { use_x_forwarded_for: false, use_forwarded: false };

fn configure(db: MemoryDatabase, keys: GatewayKeys, allowlist: Option<Vec<IpAddr>>) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let api = NotificationApi::new(db, keys, ProcessingSettings::default());
        cfg.app_data(web::Data::new(api)).service(notify_scope::<MemoryDatabase>(NO_PROXY, allowlist));
    }
}

async fn db_with_order(order_id: &str, amount: i64, currency: &str) -> MemoryDatabase {
    let db = MemoryDatabase::new();
    db.insert_order(NewOrder::new(OrderId::from(order_id), MinorUnits::from(amount), currency)).await.unwrap();
    db
}

fn alipay_request(body: String) -> TestRequest {
    TestRequest::post()
        .uri("/notify/alipay")
        .insert_header(("Content-Type", "application/x-www-form-urlencoded"))
        .set_payload(body)
}

#[actix_web::test]
async fn alipay_payment_is_acknowledged() {
    let _ = env_logger::try_init().ok();
    let db = db_with_order("O1", 9900, "CNY").await;
    let fixture = GatewayFixture::new();
    let body = fixture.signed_alipay_body(&alipay_trade_params("O1", "T1", "TRADE_SUCCESS", "99.00"));
    let (status, body) = send(alipay_request(body), configure(db.clone(), fixture.keys.clone(), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "success");
    let order = db.fetch_order(&OrderId::from("O1")).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Paid);
}

#[actix_web::test]
async fn tampered_alipay_notification_is_rejected() {
    let _ = env_logger::try_init().ok();
    let db = db_with_order("O1", 9900, "CNY").await;
    let fixture = GatewayFixture::new();
    let body = fixture
        .signed_alipay_body(&alipay_trade_params("O1", "T1", "TRADE_SUCCESS", "99.00"))
        .replace("total_amount=99.00", "total_amount=0.01");
    let (status, body) = send(alipay_request(body), configure(db.clone(), fixture.keys.clone(), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "fail");
    let order = db.fetch_order(&OrderId::from("O1")).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Created);
}

#[actix_web::test]
async fn stripe_event_is_acknowledged() {
    let _ = env_logger::try_init().ok();
    let db = db_with_order("S1", 1250, "USD").await;
    let fixture = GatewayFixture::new();
    let payload = stripe_event_body("evt_1", "payment_intent.succeeded", "S1", 1250);
    let signed = fixture.stripe_notification(&payload, Utc::now());
    let signature = signed.header(STRIPE_SIGNATURE_HEADER).unwrap().to_string();
    let req = TestRequest::post()
        .uri("/notify/stripe")
        .insert_header(("Content-Type", "application/json"))
        .insert_header((STRIPE_SIGNATURE_HEADER, signature))
        .set_payload(payload);
    let (status, body) = send(req, configure(db.clone(), fixture.keys.clone(), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"received":true}"#);
    let order = db.fetch_order(&OrderId::from("S1")).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Paid);
}

#[actix_web::test]
async fn unsigned_stripe_event_is_rejected() {
    let _ = env_logger::try_init().ok();
    let db = db_with_order("S1", 1250, "USD").await;
    let fixture = GatewayFixture::new();
    let payload = stripe_event_body("evt_1", "payment_intent.succeeded", "S1", 1250);
    let req = TestRequest::post().uri("/notify/stripe").set_payload(payload);
    let (status, body) = send(req, configure(db, fixture.keys.clone(), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"received":false}"#);
}

#[actix_web::test]
async fn unknown_gateway() {
    let _ = env_logger::try_init().ok();
    let fixture = GatewayFixture::new();
    let req = TestRequest::post().uri("/notify/paypal").set_payload("{}");
    let (status, _) = send(req, configure(MemoryDatabase::new(), fixture.keys.clone(), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn allow_list() {
    let _ = env_logger::try_init().ok();
    let fixture = GatewayFixture::new();
    let allowed: IpAddr = "110.75.0.1".parse().unwrap();
    let params = alipay_trade_params("O1", "T1", "TRADE_SUCCESS", "99.00");

    let stranger: SocketAddr = "10.0.0.1:40000".parse().unwrap();
    let req = alipay_request(fixture.signed_alipay_body(&params)).peer_addr(stranger);
    let db = db_with_order("O1", 9900, "CNY").await;
    let (status, body) = send(req, configure(db.clone(), fixture.keys.clone(), Some(vec![allowed]))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("not allowed"), "{body}");
    let order = db.fetch_order(&OrderId::from("O1")).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Created);

    let req = alipay_request(fixture.signed_alipay_body(&params)).peer_addr(SocketAddr::new(allowed, 40000));
    let (status, body) = send(req, configure(db, fixture.keys.clone(), Some(vec![allowed]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "success");
}
