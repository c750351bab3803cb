//! Periodic reconciliation of orders whose notification may have been lost.
//!
//! Every `interval`, the sweeper picks up orders that have been `Pending` for longer than `min_age`, asks each
//! configured gateway about them, and applies the answers through the normal ledger and reconciler path. A gateway
//! that has no transaction for the order is skipped quietly.
//!
//! Every order a sweep looks at is marked as swept, and the next sweep starts with orders that were swept least
//! recently. Orders that no gateway knows about therefore cannot keep newer orders out of a batch.
use actix_web::rt::task::JoinHandle;
use chrono::Utc;
use log::*;
use payment_notify_engine::{
    db_types::{GatewayId, OrderStatusType},
    GatewayClient,
    GatewayClientError,
    NotificationApi,
    NotificationError,
    NotificationStore,
};

use crate::config::SweeperConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub orders_checked: usize,
    pub events_applied: usize,
    pub failures: usize,
}

/// Starts the sweeper on the current actix runtime. Do not await the returned JoinHandle, as it will run
/// indefinitely.
pub fn start_sweeper<B, G>(
    api: NotificationApi<B>,
    db: B,
    client: G,
    gateways: Vec<GatewayId>,
    config: SweeperConfig,
) -> JoinHandle<()>
where
    B: NotificationStore + 'static,
    G: GatewayClient + 'static,
{
    actix_web::rt::spawn(async move {
        let mut timer = tokio::time::interval(config.interval.max(std::time::Duration::from_secs(1)));
        info!("🕰️ Pending order sweeper started. Gateways: {gateways:?}");
        loop {
            timer.tick().await;
            trace!("🕰️ Running pending order sweep");
            let summary = sweep_pending_orders(&api, &db, &client, &gateways, &config).await;
            if summary.orders_checked > 0 {
                info!(
                    "🕰️ Swept {} pending orders. {} updates applied, {} failures",
                    summary.orders_checked, summary.events_applied, summary.failures
                );
            }
        }
    })
}

pub async fn sweep_pending_orders<B, G>(
    api: &NotificationApi<B>,
    db: &B,
    client: &G,
    gateways: &[GatewayId],
    config: &SweeperConfig,
) -> SweepSummary
where
    B: NotificationStore,
    G: GatewayClient,
{
    let mut summary = SweepSummary::default();
    let min_age = chrono::Duration::from_std(config.min_age).unwrap_or_else(|_| chrono::Duration::zero());
    let cutoff = Utc::now() - min_age;
    let orders = match db.fetch_orders_in_status(OrderStatusType::Pending, cutoff, config.batch_size).await {
        Ok(orders) => orders,
        Err(e) => {
            error!("🕰️ Could not fetch pending orders. {e}");
            summary.failures += 1;
            return summary;
        },
    };
    let ids = orders.iter().map(|o| o.order_id.clone()).collect::<Vec<_>>();
    if let Err(e) = db.mark_orders_swept(&ids, Utc::now()).await {
        warn!("🕰️ Could not mark {} orders as swept. {e}", ids.len());
    }
    for order in orders {
        summary.orders_checked += 1;
        for &gateway in gateways {
            match api.sync_order(client, gateway, &order.order_id).await {
                Ok(result) => {
                    debug!("🕰️ {} at {gateway}: {result}", order.order_id);
                    if result.error().is_none() {
                        summary.events_applied += 1;
                    } else {
                        summary.failures += 1;
                    }
                },
                Err(NotificationError::Gateway(GatewayClientError::NoTransaction(_))) => {
                    trace!("🕰️ {gateway} has nothing for {}", order.order_id);
                },
                Err(e) => {
                    warn!("🕰️ Could not sync {} with {gateway}. {e}", order.order_id);
                    summary.failures += 1;
                },
            }
        }
    }
    summary
}
