use std::{fmt::Debug, future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use log::*;

use super::errors::NotificationError;
use crate::{
    ack::{self, AckDecision, ProcessingResult},
    db_types::{AuditEventType, GatewayId, NewAuditEvent, OrderId},
    ledger::{IdempotencyLedger, LedgerCheck, Reservation, DEFAULT_STALE_AFTER_SECS},
    normalizer::{normalize, PaymentEvent},
    reconciler::OrderReconciler,
    traits::{GatewayClient, GatewayClientError, IdempotencyStore, OrderStore, StoreError},
    verifier::{verify, GatewayKeys, RawNotification},
};

pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, Copy)]
pub struct ProcessingSettings {
    /// Upper bound on every individual store call. A call that overruns counts as a store failure.
    pub store_timeout: Duration,
    /// Reservations older than this may be reclaimed by another handler.
    pub stale_after: chrono::Duration,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS),
            stale_after: chrono::Duration::seconds(DEFAULT_STALE_AFTER_SECS),
        }
    }
}

/// What happened to a notification, and how the gateway should be answered.
#[derive(Debug)]
pub struct NotificationReceipt {
    pub gateway: GatewayId,
    pub result: ProcessingResult,
    pub decision: AckDecision,
}

impl NotificationReceipt {
    pub fn response(&self) -> ack::AckResponse {
        ack::render(self.gateway, self.decision)
    }
}

/// `NotificationApi` runs inbound notifications through the full pipeline:
/// verify, normalize, check the ledger, reconcile, commit.
pub struct NotificationApi<B> {
    db: B,
    ledger: IdempotencyLedger<B>,
    reconciler: OrderReconciler<B>,
    keys: Arc<GatewayKeys>,
    settings: ProcessingSettings,
}

impl<B> Debug for NotificationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NotificationApi ({:?})", self.settings)
    }
}

impl<B: Clone> Clone for NotificationApi<B> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            ledger: self.ledger.clone(),
            reconciler: self.reconciler.clone(),
            keys: Arc::clone(&self.keys),
            settings: self.settings,
        }
    }
}

impl<B: Clone> NotificationApi<B> {
    pub fn new(db: B, keys: GatewayKeys, settings: ProcessingSettings) -> Self {
        let ledger = IdempotencyLedger::new(db.clone(), settings.stale_after);
        let reconciler = OrderReconciler::new(db.clone());
        Self { db, ledger, reconciler, keys: Arc::new(keys), settings }
    }

    pub fn settings(&self) -> &ProcessingSettings {
        &self.settings
    }
}

impl<B> NotificationApi<B>
where B: OrderStore + IdempotencyStore
{
    /// Processes a raw notification. This never fails: every problem is captured in the receipt, along with the
    /// acknowledgement the gateway should receive.
    pub async fn process_notification(&self, notification: &RawNotification) -> NotificationReceipt {
        let result = self.process(notification).await;
        let decision = ack::decide(&result);
        match decision {
            AckDecision::Acknowledge => info!("🧾️ {} notification: {result}. {decision}", notification.gateway),
            AckDecision::Reject => warn!("🧾️ {} notification: {result}. {decision}", notification.gateway),
        }
        NotificationReceipt { gateway: notification.gateway, result, decision }
    }

    async fn process(&self, notification: &RawNotification) -> ProcessingResult {
        let verification = verify(notification, &self.keys);
        if !verification.valid {
            let reason = verification.reason.unwrap_or_else(|| "unspecified".to_string());
            return ProcessingResult::VerificationFailed { reason };
        }
        let event = match normalize(notification.gateway, &notification.body, notification.received_at) {
            Ok(e) => e,
            Err(e) => return ProcessingResult::NormalizationFailed(e),
        };
        self.apply_event(&event, notification.received_at).await
    }

    /// Takes an already-authenticated event through the ledger and the reconciler.
    ///
    /// `now` is the time the event was received. It decides whether an existing reservation is stale.
    pub async fn apply_event(&self, event: &PaymentEvent, now: DateTime<Utc>) -> ProcessingResult {
        let key = event.ledger_key();
        let reserve = self.ledger.check_and_reserve(&key, event.payload_digest(), now);
        let check = match self.with_timeout("ledger reserve", reserve).await {
            Ok(c) => c,
            Err(e) => return ProcessingResult::StoreFailure(e),
        };
        let reservation = match check {
            LedgerCheck::Fresh(r) => r,
            LedgerCheck::InFlight => return ProcessingResult::InFlight,
            LedgerCheck::DuplicateSameDigest { applied_status } => {
                return ProcessingResult::DuplicateSameDigest { applied_status };
            },
            LedgerCheck::DuplicateConflictingDigest { stored_digest } => {
                let detail = format!("Stored digest {stored_digest}, received {}", event.payload_digest());
                let entry = NewAuditEvent::new(event.merchant_order_id().clone(), AuditEventType::LedgerConflict, detail)
                    .with_transaction(event.gateway(), event.gateway_transaction_id());
                return match self.with_timeout("ledger conflict audit", self.db.append_audit_event(entry)).await {
                    Ok(_) => ProcessingResult::DuplicateConflictingDigest,
                    Err(e) => ProcessingResult::StoreFailure(e),
                };
            },
        };

        let reconcile = self.reconciler.apply(event.merchant_order_id(), event);
        let outcome = match self.with_timeout("reconcile", reconcile).await {
            Ok(o) => o,
            Err(e) => {
                self.release(&reservation).await;
                return ProcessingResult::StoreFailure(e);
            },
        };
        let commit = self.ledger.commit(&reservation, outcome.applied_status(), Utc::now());
        match self.with_timeout("ledger commit", commit).await {
            Ok(true) => ProcessingResult::Reconciled(outcome),
            Ok(false) => {
                // The order write was conditional, so a reclaiming handler cannot have applied it twice.
                warn!("📒️ Reservation for {key} was taken over before it could be committed");
                ProcessingResult::Reconciled(outcome)
            },
            Err(e) => {
                self.release(&reservation).await;
                ProcessingResult::StoreFailure(e)
            },
        }
    }

    /// Queries `gateway` for the current state of `order_id` and applies the answer like any other event.
    pub async fn sync_order<G: GatewayClient>(
        &self,
        client: &G,
        gateway: GatewayId,
        order_id: &OrderId,
    ) -> Result<ProcessingResult, NotificationError> {
        let event = client.query_status(gateway, order_id).await?;
        if event.merchant_order_id() != order_id {
            let msg = format!("Asked for order {order_id}, but the gateway answered for {}", event.merchant_order_id());
            return Err(GatewayClientError::InvalidResponse(msg).into());
        }
        debug!("💳️ Gateway {gateway} reports {event}");
        Ok(self.apply_event(&event, Utc::now()).await)
    }

    async fn with_timeout<T, F>(&self, operation: &'static str, fut: F) -> Result<T, NotificationError>
    where F: Future<Output = Result<T, StoreError>> {
        match tokio::time::timeout(self.settings.store_timeout, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => {
                error!("🗃️ Store error during {operation}: {e}");
                Err(NotificationError::StoreError(e))
            },
            Err(_) => {
                error!("🗃️ Store timed out during {operation}");
                Err(NotificationError::StoreTimeout(operation))
            },
        }
    }

    /// Best effort. If this fails too, the reservation goes stale and is reclaimed later.
    async fn release(&self, reservation: &Reservation) {
        if let Err(e) = self.with_timeout("ledger release", self.ledger.release(reservation)).await {
            warn!("📒️ Could not release reservation for {}: {e}", reservation.key);
        }
    }
}
