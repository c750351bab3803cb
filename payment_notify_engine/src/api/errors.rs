use thiserror::Error;

use crate::{
    db_types::{OrderId, OrderStatusType},
    normalizer::NormalizationError,
    traits::{GatewayClientError, StoreError},
};

#[derive(Debug, Clone, Error)]
pub enum NotificationError {
    #[error("Signature verification failed: {0}")]
    VerificationFailure(String),
    #[error(transparent)]
    Normalization(#[from] NormalizationError),
    #[error("The transaction was seen before with a different payload")]
    LedgerConflict,
    #[error("The event conflicts with the order: {0}")]
    ReconcileConflict(String),
    #[error("The store did not respond in time ({0})")]
    StoreTimeout(&'static str),
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayClientError),
}

#[derive(Debug, Clone, Error)]
pub enum OrderApiError {
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayClientError),
    #[error("Order {0} already exists with a different amount or currency")]
    OrderMismatch(OrderId),
    #[error("Order {order_id} is {status} and cannot be paid again")]
    InvalidStatus { order_id: OrderId, status: OrderStatusType },
    #[error("Invalid payment request: {0}")]
    InvalidRequest(String),
}
