//! # Backend contracts
//!
//! The engine is storage- and gateway-agnostic. Backends implement the traits in this module:
//!
//! * [`OrderStore`] holds orders and their append-only audit trail. Status changes are only ever made through a
//!   compare-and-set, so concurrent handlers cannot overwrite each other.
//! * [`IdempotencyStore`] holds the ledger of gateway transactions that have been seen. Reservation is a single
//!   conditional insert, which makes deduplication correct across processes as well as tasks.
//! * [`GatewayClient`] makes outbound calls to payment gateways: creating payments and agreements, and querying status.
//!
//! [`crate::SqliteDatabase`] and [`crate::MemoryDatabase`] implement both store traits.
mod data_objects;
mod gateway_client;
mod idempotency_store;
mod order_store;

pub use data_objects::{InsertOrderResult, StoreError};
pub use gateway_client::{
    AgreementRedirect,
    AgreementRequest,
    GatewayClient,
    GatewayClientError,
    PaymentRedirect,
    PaymentRequest,
};
pub use idempotency_store::IdempotencyStore;
pub use order_store::OrderStore;

/// Everything [`crate::NotificationApi`] needs from a backend.
pub trait NotificationStore: OrderStore + IdempotencyStore {}

impl<T> NotificationStore for T where T: OrderStore + IdempotencyStore {}
