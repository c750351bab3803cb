use actix_web::{http::StatusCode, test::TestRequest, web, web::ServiceConfig};
use chrono::Utc;
use payment_notify_engine::{
    db_types::{GatewayId, NewOrder, OrderId, OrderStatusType},
    normalizer::{PaymentEvent, PaymentStatus},
    verifier::GatewayKeys,
    AgreementRedirect,
    GatewayClientError,
    MemoryDatabase,
    NotificationApi,
    OrderApi,
    OrderStore,
    PaymentRedirect,
    ProcessingSettings,
};
use pns_common::MinorUnits;
use serde_json::{json, Value};

use super::{
    helpers::{admin_token, bearer, send},
    mocks::MockGateway,
};
use crate::{
    middleware::AdminTokenMiddlewareFactory,
    routes::{CreateAgreementRoute, CreatePaymentRoute, OrderByIdRoute, SyncOrderRoute},
};

fn configure(db: MemoryDatabase, gateway: MockGateway) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let notifications = NotificationApi::new(db.clone(), GatewayKeys::default(), ProcessingSettings::default());
        cfg.app_data(web::Data::new(OrderApi::new(db)))
            .app_data(web::Data::new(notifications))
            .app_data(web::Data::new(gateway))
            .service(
                web::scope("/api")
                    .wrap(AdminTokenMiddlewareFactory::new(admin_token()))
                    .service(CreatePaymentRoute::<MemoryDatabase, MockGateway>::new())
                    .service(CreateAgreementRoute::<MockGateway>::new())
                    .service(OrderByIdRoute::<MemoryDatabase>::new())
                    .service(SyncOrderRoute::<MemoryDatabase, MockGateway>::new()),
            );
    }
}

fn redirecting_gateway() -> MockGateway {
    let mut gateway = MockGateway::new();
    gateway.expect_create_payment().returning(|req| {
        Ok(PaymentRedirect {
            gateway: req.gateway,
            order_id: req.order_id.clone(),
            url: format!("https://openapi.alipay.com/gateway.do?out_trade_no={}", req.order_id),
        })
    });
    gateway
}

fn payment_body(amount: i64) -> Value {
    json!({"gateway": "alipay", "order_id": "O1", "amount": amount, "currency": "CNY", "subject": "Tea"})
}

#[actix_web::test]
async fn admin_token_is_required() {
    let _ = env_logger::try_init().ok();
    let req = TestRequest::post().uri("/api/payments").set_json(payment_body(9900));
    let (status, body) = send(req, configure(MemoryDatabase::new(), MockGateway::new())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, r#"{"error":"A valid admin token is required"}"#);

    let req = TestRequest::get().uri("/api/orders/O1").insert_header(("Authorization", "Bearer nope"));
    let (status, _) = send(req, configure(MemoryDatabase::new(), MockGateway::new())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn create_payment() {
    let _ = env_logger::try_init().ok();
    let db = MemoryDatabase::new();
    let req = TestRequest::post().uri("/api/payments").insert_header(bearer()).set_json(payment_body(9900));
    let (status, body) = send(req, configure(db.clone(), redirecting_gateway())).await;
    assert_eq!(status, StatusCode::OK);
    let redirect: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(redirect["gateway"], "alipay");
    assert_eq!(redirect["url"], "https://openapi.alipay.com/gateway.do?out_trade_no=O1");
    let order = db.fetch_order(&OrderId::from("O1")).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Pending);
    assert_eq!(order.amount, MinorUnits::from(9900));
}

#[actix_web::test]
async fn conflicting_payment_request() {
    let _ = env_logger::try_init().ok();
    let db = MemoryDatabase::new();
    db.insert_order(NewOrder::new(OrderId::from("O1"), MinorUnits::from(9900), "CNY")).await.unwrap();
    let req = TestRequest::post().uri("/api/payments").insert_header(bearer()).set_json(payment_body(100));
    let (status, body) = send(req, configure(db, MockGateway::new())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains("different amount or currency"), "{body}");
}

#[actix_web::test]
async fn gateway_failure_is_a_bad_gateway() {
    let _ = env_logger::try_init().ok();
    let mut gateway = MockGateway::new();
    gateway
        .expect_create_payment()
        .returning(|_| Err(GatewayClientError::RequestFailed("connection reset".into())));
    let req = TestRequest::post().uri("/api/payments").insert_header(bearer()).set_json(payment_body(9900));
    let (status, _) = send(req, configure(MemoryDatabase::new(), gateway)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[actix_web::test]
async fn fetch_order_with_history() {
    let _ = env_logger::try_init().ok();
    let db = MemoryDatabase::new();
    let req = TestRequest::post().uri("/api/payments").insert_header(bearer()).set_json(payment_body(9900));
    send(req, configure(db.clone(), redirecting_gateway())).await;

    let req = TestRequest::get().uri("/api/orders/O1").insert_header(bearer());
    let (status, body) = send(req, configure(db.clone(), MockGateway::new())).await;
    assert_eq!(status, StatusCode::OK);
    let result: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(result["order"]["status"], "Pending");
    assert_eq!(result["audit_trail"].as_array().map(Vec::len), Some(1));

    let req = TestRequest::get().uri("/api/orders/O2").insert_header(bearer());
    let (status, _) = send(req, configure(db, MockGateway::new())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn sync_order_applies_gateway_state() {
    let _ = env_logger::try_init().ok();
    let db = MemoryDatabase::new();
    db.insert_order(NewOrder::new(OrderId::from("O1"), MinorUnits::from(9900), "CNY")).await.unwrap();
    let mut gateway = MockGateway::new();
    gateway.expect_query_status().times(1).returning(|gateway, order_id| {
        assert_eq!(gateway, GatewayId::Alipay);
        Ok(PaymentEvent::from_gateway_query(
            gateway,
            order_id.clone(),
            "2024050222001",
            PaymentStatus::Succeeded,
            MinorUnits::from(9900),
            Utc::now(),
        ))
    });
    let req = TestRequest::post().uri("/api/orders/O1/sync/alipay").insert_header(bearer());
    let (status, body) = send(req, configure(db.clone(), gateway)).await;
    assert_eq!(status, StatusCode::OK);
    let result: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(result["acknowledged"], true);
    assert_eq!(result["gateway"], "alipay");
    let order = db.fetch_order(&OrderId::from("O1")).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Paid);
}

#[actix_web::test]
async fn sync_with_nothing_at_the_gateway() {
    let _ = env_logger::try_init().ok();
    let mut gateway = MockGateway::new();
    gateway.expect_query_status().returning(|_, order_id| Err(GatewayClientError::NoTransaction(order_id.clone())));
    let req = TestRequest::post().uri("/api/orders/O1/sync/stripe").insert_header(bearer());
    let (status, _) = send(req, configure(MemoryDatabase::new(), gateway)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let req = TestRequest::post().uri("/api/orders/O1/sync/paypal").insert_header(bearer());
    let (status, _) = send(req, configure(MemoryDatabase::new(), MockGateway::new())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn create_agreement() {
    let _ = env_logger::try_init().ok();
    let mut gateway = MockGateway::new();
    gateway.expect_create_agreement().times(1).returning(|req| {
        assert_eq!(req.gateway, GatewayId::Alipay);
        assert_eq!(req.validity_period, "2y");
        Ok(AgreementRedirect {
            gateway: req.gateway,
            agreement_no: req.agreement_no.clone(),
            url: format!("https://openapi.alipay.com/gateway.do?external_agreement_no={}", req.agreement_no),
        })
    });
    let req = TestRequest::post().uri("/api/agreements").insert_header(bearer()).set_json(json!({}));
    let (status, body) = send(req, configure(MemoryDatabase::new(), gateway)).await;
    assert_eq!(status, StatusCode::OK);
    let redirect: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(redirect["gateway"], "alipay");
    let agreement_no = redirect["agreement_no"].as_str().unwrap();
    assert!(agreement_no.starts_with("AGR"), "{agreement_no}");
    assert!(redirect["url"].as_str().unwrap().ends_with(agreement_no));
}

#[actix_web::test]
async fn agreements_need_a_gateway_that_offers_them() {
    let _ = env_logger::try_init().ok();
    let mut gateway = MockGateway::new();
    gateway
        .expect_create_agreement()
        .returning(|req| Err(GatewayClientError::Unsupported(req.gateway, "agreements")));
    let req = TestRequest::post()
        .uri("/api/agreements")
        .insert_header(bearer())
        .set_json(json!({"gateway": "stripe", "agreement_no": "VIP-1"}));
    let (status, body) = send(req, configure(MemoryDatabase::new(), gateway)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("does not support agreements"), "{body}");

    let req = TestRequest::post().uri("/api/agreements").set_json(json!({}));
    let (status, _) = send(req, configure(MemoryDatabase::new(), MockGateway::new())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
