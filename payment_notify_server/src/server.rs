use std::{net::IpAddr, time::Duration};

use actix_web::{
    dev::{Server, Service},
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    HttpServer,
};
use futures::{future::ok, FutureExt};
use log::{info, warn};
use payment_notify_engine::{
    MemoryDatabase,
    NotificationApi,
    NotificationStore,
    OrderApi,
    SqliteDatabase,
};

use crate::{
    config::{ServerConfig, ServerOptions},
    errors::{ServerError, ServerError::ForbiddenPeer},
    helpers::get_remote_ip,
    integrations::gateways::GatewayClients,
    middleware::AdminTokenMiddlewareFactory,
    routes::{health, CreateAgreementRoute, CreatePaymentRoute, NotifyRoute, OrderByIdRoute, SyncOrderRoute},
    sweeper::start_sweeper,
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let clients = GatewayClients::from_config(&config)?;
    info!("💳️ Outbound gateway clients configured: {:?}", clients.configured());
    if config.use_memory_store {
        warn!("🗃️ Using the in-memory store. Nothing will survive a restart.");
        let db = MemoryDatabase::new();
        let srv = create_server_instance(config, db, clients)?;
        srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
    } else {
        let db = SqliteDatabase::new_with_url(&config.database_url, 25)
            .await
            .map_err(|e| ServerError::InitializeError(e.to_string()))?;
        db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
        let srv = create_server_instance(config, db, clients)?;
        srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
    }
}

pub fn create_server_instance<B>(config: ServerConfig, db: B, clients: GatewayClients) -> Result<Server, ServerError>
where B: NotificationStore + Clone + Send + Sync + 'static {
    let keys = config.keys.gateway_keys()?;
    let notification_api = NotificationApi::new(db.clone(), keys, config.processing);
    if config.sweeper.enabled {
        let gateways = clients.configured();
        if gateways.is_empty() {
            warn!("🕰️ The sweeper is enabled, but no gateway credentials are configured. It will not be started.");
        } else {
            let _sweeper =
                start_sweeper(notification_api.clone(), db.clone(), clients.clone(), gateways, config.sweeper.clone());
        }
    }
    let options = ServerOptions::from_config(&config);
    let allowlist = config.notify_allowlist.clone();
    let admin_token = config.admin_token.clone();
    let srv = HttpServer::new(move || {
        let order_api = OrderApi::new(db.clone());
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("pns::access_log"))
            .app_data(web::Data::new(order_api))
            .app_data(web::Data::new(notification_api.clone()))
            .app_data(web::Data::new(clients.clone()));
        let api_scope = web::scope("/api")
            .wrap(AdminTokenMiddlewareFactory::new(admin_token.clone()))
            .service(CreatePaymentRoute::<B, GatewayClients>::new())
            .service(CreateAgreementRoute::<GatewayClients>::new())
            .service(OrderByIdRoute::<B>::new())
            .service(SyncOrderRoute::<B, GatewayClients>::new());
        let notify_scope = notify_scope::<B>(options, allowlist.clone());
        app.service(health).service(notify_scope).service(api_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// The gateway callback routes. If an allow-list is configured, requests from any other address are refused before
/// they reach the handler.
pub fn notify_scope<B>(
    options: ServerOptions,
    allowlist: Option<Vec<IpAddr>>,
) -> actix_web::Scope<
    impl actix_web::dev::ServiceFactory<
        actix_web::dev::ServiceRequest,
        Config = (),
        Response = actix_web::dev::ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
>
where
    B: NotificationStore + 'static,
{
    web::scope("/notify")
        .wrap_fn(move |req, srv| {
            let peer_ip = get_remote_ip(req.request(), options.use_x_forwarded_for, options.use_forwarded);
            let allowed = match (peer_ip, &allowlist) {
                (_, None) => true,
                (Some(ip), Some(list)) => {
                    let allowed = list.contains(&ip);
                    if !allowed {
                        warn!("🔐️ Notification from {ip} is not on the allow-list. Denying access.");
                    }
                    allowed
                },
                (None, Some(_)) => {
                    warn!("🔐️ No IP address found for notification request, denying access.");
                    false
                },
            };
            if allowed {
                srv.call(req).boxed_local()
            } else {
                ok(req.error_response(ForbiddenPeer)).boxed_local()
            }
        })
        .service(NotifyRoute::<B>::new())
}
