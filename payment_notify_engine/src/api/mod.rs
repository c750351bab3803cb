//! # Payment notification engine public API
//!
//! The `api` module exposes the programmatic API for the engine. Like the stores, the APIs are generic over their
//! backend, so any type implementing the required traits can be plugged in.
//!
//! * [`NotificationApi`] is the primary API. It takes raw gateway notifications through verification, normalization,
//!   the idempotency ledger and the order reconciler, and tells the caller how to acknowledge them. It also drives
//!   on-demand status syncs against a gateway.
//! * [`OrderApi`] creates orders and starts payments for them, and exposes order state and the audit trail.
//!
//! # API usage
//!
//! ```rust,ignore
//! use payment_notify_engine::{NotificationApi, ProcessingSettings, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let api = NotificationApi::new(db, keys, ProcessingSettings::default());
//! let receipt = api.process_notification(&raw).await;
//! ```
mod errors;
mod notification_api;
mod order_api;

pub use errors::{NotificationError, OrderApiError};
pub use notification_api::{NotificationApi, NotificationReceipt, ProcessingSettings, DEFAULT_STORE_TIMEOUT_SECS};
pub use order_api::OrderApi;
