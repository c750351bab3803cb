use chrono::{DateTime, Utc};

use crate::{
    db_types::{IdempotencyRecord, LedgerKey, OrderStatusType, PayloadDigest},
    traits::StoreError,
};

#[allow(async_fn_in_trait)]
pub trait IdempotencyStore: Clone {
    /// Inserts a `Reserved` record for `key` if none exists, in one atomic step.
    ///
    /// Returns `true` if this call created the record, and `false` if a record already existed (in which case nothing is
    /// written).
    async fn conditional_insert(
        &self,
        key: &LedgerKey,
        digest: &PayloadDigest,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn read(&self, key: &LedgerKey) -> Result<Option<IdempotencyRecord>, StoreError>;

    /// Takes over a stale reservation. The record's `reserved_at` is reset to `now` and `attempts` is incremented, but
    /// only if the record is still `Reserved` and `attempts` still equals `observed_attempts`.
    ///
    /// Returns `true` if this caller now owns the reservation.
    async fn reclaim(&self, key: &LedgerKey, observed_attempts: i64, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Marks a reserved record as `Committed`, recording the order status it produced (if any). Committed records are
    /// immutable.
    ///
    /// `attempts` is the value the caller saw when it reserved or reclaimed the record. Returns `false`, and writes
    /// nothing, if the record is not `Reserved` or has been reclaimed by another handler since.
    async fn commit(
        &self,
        key: &LedgerKey,
        attempts: i64,
        applied_status: Option<OrderStatusType>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Deletes a record that is still `Reserved` with `attempts`, so that a retry of a failed attempt is not held back
    /// until the reservation goes stale. Committed records and reservations taken over by another handler are never
    /// deleted.
    async fn release(&self, key: &LedgerKey, attempts: i64) -> Result<bool, StoreError>;
}
