//! # Idempotency ledger
//!
//! Every notification is identified by its gateway and the gateway's transaction id. The ledger makes sure that each
//! such key is applied to an order at most once, no matter how many times, or how concurrently, the gateway delivers
//! it.
//!
//! A key moves through two states. `check_and_reserve` creates a `Reserved` record with a single conditional insert.
//! Whoever wins that insert is the only handler allowed to apply the event, and it finishes by calling `commit`, which
//! freezes the record. A handler that crashes in between leaves the reservation behind; once it is older than the
//! staleness window another handler may reclaim it.
use chrono::{DateTime, Duration, Utc};
use log::*;

use crate::{
    db_types::{LedgerKey, LedgerState, OrderStatusType, PayloadDigest},
    traits::{IdempotencyStore, StoreError},
};

pub const DEFAULT_STALE_AFTER_SECS: i64 = 120;
/// Bounds the number of times a check re-reads the ledger after losing a race.
const MAX_RESERVE_ROUNDS: usize = 3;

/// A reservation held by this handler. `attempts` identifies the holder: a reclaim bumps it, after which the previous
/// holder can neither commit nor release the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub key: LedgerKey,
    pub attempts: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCheck {
    /// This caller holds the reservation and must apply the event, then commit or release.
    Fresh(Reservation),
    /// The same payload has already been applied.
    DuplicateSameDigest { applied_status: Option<OrderStatusType> },
    /// The transaction id was seen before with a different payload.
    DuplicateConflictingDigest { stored_digest: PayloadDigest },
    /// Another handler holds a live reservation for this key.
    InFlight,
}

#[derive(Clone)]
pub struct IdempotencyLedger<B> {
    store: B,
    stale_after: Duration,
}

impl<B> IdempotencyLedger<B> {
    pub fn new(store: B, stale_after: Duration) -> Self {
        Self { store, stale_after }
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }
}

impl<B> IdempotencyLedger<B>
where B: IdempotencyStore
{
    pub async fn check_and_reserve(
        &self,
        key: &LedgerKey,
        digest: &PayloadDigest,
        now: DateTime<Utc>,
    ) -> Result<LedgerCheck, StoreError> {
        for _ in 0..MAX_RESERVE_ROUNDS {
            if self.store.conditional_insert(key, digest, now).await? {
                trace!("📒️ Reserved {key}");
                return Ok(LedgerCheck::Fresh(Reservation { key: key.clone(), attempts: 1 }));
            }
            let record = match self.store.read(key).await? {
                Some(r) => r,
                // The reservation was released between our insert and read. Try again.
                None => continue,
            };
            if &record.payload_digest != digest {
                warn!("📒️ {key} was replayed with a different payload. Stored digest {}", record.payload_digest);
                return Ok(LedgerCheck::DuplicateConflictingDigest { stored_digest: record.payload_digest });
            }
            match record.state {
                LedgerState::Committed => {
                    debug!("📒️ {key} has already been applied");
                    return Ok(LedgerCheck::DuplicateSameDigest { applied_status: record.applied_order_status });
                },
                LedgerState::Reserved if now - record.reserved_at >= self.stale_after => {
                    if self.store.reclaim(key, record.attempts, now).await? {
                        let attempts = record.attempts + 1;
                        info!("📒️ Reclaimed stale reservation for {key} (attempt {attempts})");
                        return Ok(LedgerCheck::Fresh(Reservation { key: key.clone(), attempts }));
                    }
                    debug!("📒️ Lost the race to reclaim {key}. Re-reading the ledger.");
                },
                LedgerState::Reserved => {
                    debug!("📒️ {key} is being processed by another handler");
                    return Ok(LedgerCheck::InFlight);
                },
            }
        }
        Ok(LedgerCheck::InFlight)
    }

    /// Freezes the reservation. Returns `false` if this handler no longer holds it, either because the record was
    /// committed already or because another handler reclaimed it.
    pub async fn commit(
        &self,
        reservation: &Reservation,
        applied_status: Option<OrderStatusType>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let Reservation { key, attempts } = reservation;
        let committed = self.store.commit(key, *attempts, applied_status, now).await?;
        if committed {
            trace!("📒️ Committed {key}");
        } else {
            warn!("📒️ Could not commit {key}. Attempt {attempts} no longer holds the reservation.");
        }
        Ok(committed)
    }

    pub async fn release(&self, reservation: &Reservation) -> Result<bool, StoreError> {
        let released = self.store.release(&reservation.key, reservation.attempts).await?;
        if released {
            debug!("📒️ Released reservation for {}", reservation.key);
        }
        Ok(released)
    }
}
