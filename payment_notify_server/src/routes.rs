//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Every store and gateway call below is async for this reason.
//!
//! ## Notification routes
//! `POST /notify/{gateway}` receives gateway callbacks. The handler never fails on a bad notification: the outcome is
//! always expressed as the acknowledgement literal the gateway expects (`success`/`fail` for Alipay,
//! `{"received":true}`/`{"received":false}` for Stripe), with a 200 or 400 status.
//!
//! ## Admin routes
//! Everything under `/api` requires the admin bearer token.
use std::str::FromStr;

use actix_web::{get, http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use log::*;
use payment_notify_engine::{
    ack,
    db_types::{GatewayId, OrderId},
    GatewayClient,
    NotificationApi,
    NotificationStore,
    OrderApi,
    OrderStore,
};

use crate::{
    data_objects::{CreateAgreementParams, CreatePaymentParams, OrderWithHistory, SyncResult},
    errors::ServerError,
    helpers::raw_notification,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

// ----------------------------------------------   Notifications  ----------------------------------------------
route!(notify => Post "/{gateway}" impl NotificationStore);
/// Route handler for gateway notifications.
///
/// The body is passed on as raw bytes. Both gateways sign the exact bytes they send, so it must not be parsed (or
/// re-encoded) before verification.
pub async fn notify<B: NotificationStore>(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    api: web::Data<NotificationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let gateway = GatewayId::from_str(&path.into_inner()).map_err(|e| ServerError::NoRecordFound(e.to_string()))?;
    debug!("💻️ Received {gateway} notification ({} bytes)", body.len());
    let notification = raw_notification(gateway, &req, &body);
    let receipt = api.process_notification(&notification).await;
    let response = receipt.response();
    let status = StatusCode::from_u16(response.status).map_err(|e| ServerError::Unspecified(e.to_string()))?;
    Ok(HttpResponse::build(status).content_type(response.content_type).body(response.body))
}

// ----------------------------------------------   Payments  ----------------------------------------------------
route!(create_payment => Post "/payments" impl OrderStore, GatewayClient);
/// Registers an order and creates a payment for it at the requested gateway. The response carries the URL the buyer
/// should be sent to.
pub async fn create_payment<B: OrderStore, G: GatewayClient>(
    body: web::Json<CreatePaymentParams>,
    api: web::Data<OrderApi<B>>,
    client: web::Data<G>,
) -> Result<HttpResponse, ServerError> {
    let params = body.into_inner();
    debug!("💻️ POST payment for order {} at {}", params.order_id, params.gateway);
    let redirect = api.create_payment(client.as_ref(), params.into()).await.map_err(|e| {
        warn!("💻️ Could not create payment. {e}");
        ServerError::from(e)
    })?;
    Ok(HttpResponse::Ok().json(redirect))
}

// ----------------------------------------------   Agreements  ------------------------------------------------
route!(create_agreement => Post "/agreements" impl GatewayClient);
/// Creates the page where a buyer signs a recurring-payment agreement. Only Alipay offers agreements.
pub async fn create_agreement<G: GatewayClient>(
    body: web::Json<CreateAgreementParams>,
    client: web::Data<G>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner().into();
    let redirect = client.create_agreement(&request).await.map_err(|e| {
        warn!("💻️ Could not create agreement {}. {e}", request.agreement_no);
        ServerError::from(e)
    })?;
    info!("💻️ Agreement {} ready for signing at {}", redirect.agreement_no, redirect.gateway);
    Ok(HttpResponse::Ok().json(redirect))
}

// ----------------------------------------------   Orders  ----------------------------------------------------
route!(order_by_id => Get "/orders/{order_id}" impl OrderStore);
pub async fn order_by_id<B: OrderStore>(
    path: web::Path<String>,
    api: web::Data<OrderApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    debug!("💻️ GET order {order_id}");
    let order = api
        .fetch_order(&order_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("No order with id {order_id}")))?;
    let audit_trail = api.fetch_audit_trail(&order_id).await?;
    Ok(HttpResponse::Ok().json(OrderWithHistory { order, audit_trail }))
}

route!(sync_order => Post "/orders/{order_id}/sync/{gateway}" impl NotificationStore, GatewayClient);
/// Asks the gateway for the current state of the order and applies the answer exactly as if it had arrived as a
/// notification.
pub async fn sync_order<B: NotificationStore, G: GatewayClient>(
    path: web::Path<(String, String)>,
    api: web::Data<NotificationApi<B>>,
    client: web::Data<G>,
) -> Result<HttpResponse, ServerError> {
    let (order_id, gateway) = path.into_inner();
    let order_id = OrderId::from(order_id);
    let gateway = GatewayId::from_str(&gateway).map_err(|e| ServerError::InvalidRequestPath(e.to_string()))?;
    debug!("💻️ POST sync order {order_id} with {gateway}");
    let result = api.sync_order(client.as_ref(), gateway, &order_id).await?;
    let decision = ack::decide(&result);
    info!("💻️ Sync of {order_id} with {gateway}: {result}");
    Ok(HttpResponse::Ok().json(SyncResult::new(order_id, gateway, &result, decision)))
}
