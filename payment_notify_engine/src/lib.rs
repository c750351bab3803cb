//! Payment Notification Engine
//!
//! The engine turns asynchronous payment notifications from third-party gateways (Alipay, Stripe) into exactly-once
//! order status changes. It is transport-agnostic: the HTTP server lives in a separate crate and hands the engine the
//! raw request body and headers.
//!
//! Every notification passes through the same pipeline:
//! 1. [`verifier`] checks the gateway signature against the configured key material. Nothing unauthenticated goes
//!    further.
//! 2. [`normalizer`] maps the gateway payload onto a canonical [`normalizer::PaymentEvent`].
//! 3. [`ledger`] deduplicates on the gateway transaction id with a conditional insert, so that redeliveries and
//!    concurrent deliveries are applied at most once.
//! 4. [`reconciler`] applies the event to the order with a compare-and-set, guarded by the order amount, and writes
//!    the audit trail.
//! 5. [`ack`] decides whether the gateway should be told the notification was received.
//!
//! Storage sits behind the traits in [`traits`]. [`SqliteDatabase`] is the production backend and [`MemoryDatabase`]
//! is a shared in-memory backend for tests and local runs. The public entry points are [`NotificationApi`] and
//! [`OrderApi`].
pub mod ack;
mod api;
pub mod db_types;
pub mod helpers;
pub mod ledger;
pub mod normalizer;
pub mod reconciler;
pub mod traits;
pub mod verifier;

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use api::{
    NotificationApi,
    NotificationError,
    NotificationReceipt,
    OrderApi,
    OrderApiError,
    ProcessingSettings,
    DEFAULT_STORE_TIMEOUT_SECS,
};
pub use memory::{MemoryDatabase, MemoryStoreError};
#[cfg(feature = "sqlite")]
pub use sqlite::{db::db_url, SqliteDatabase, SqliteDatabaseError};
pub use traits::{
    AgreementRedirect,
    AgreementRequest,
    GatewayClient,
    GatewayClientError,
    IdempotencyStore,
    InsertOrderResult,
    NotificationStore,
    OrderStore,
    PaymentRedirect,
    PaymentRequest,
    StoreError,
};
