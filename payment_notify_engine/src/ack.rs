//! # Acknowledgement policy
//!
//! Gateways keep redelivering a notification until they get the acknowledgement they expect. The policy is:
//!
//! * **Acknowledge** once the notification is authentic and its effect (or deliberate lack of effect) is durably
//!   recorded. Applied events, no-ops, conflicts and duplicates all fall in this bucket: redelivery cannot change the
//!   outcome.
//! * **Reject** when the notification is not authentic or not understood, when the store failed or timed out, and when
//!   another handler is still working on the same transaction. A retry may then succeed.
use std::fmt::Display;

use crate::{
    api::NotificationError,
    db_types::{GatewayId, OrderStatusType},
    normalizer::NormalizationError,
    reconciler::{ReconcileOutcome, NoOpReason},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    Acknowledge,
    Reject,
}

impl Display for AckDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AckDecision::Acknowledge => write!(f, "Acknowledge"),
            AckDecision::Reject => write!(f, "Reject"),
        }
    }
}

/// How far a notification got through the pipeline, and what happened there.
#[derive(Debug)]
pub enum ProcessingResult {
    VerificationFailed { reason: String },
    NormalizationFailed(NormalizationError),
    /// The store failed or timed out. Any reservation has been released.
    StoreFailure(NotificationError),
    /// Another handler holds the reservation for this transaction.
    InFlight,
    DuplicateSameDigest { applied_status: Option<OrderStatusType> },
    DuplicateConflictingDigest,
    Reconciled(ReconcileOutcome),
}

impl ProcessingResult {
    /// The error this result represents, if it is not a clean outcome. Conflicts are reported here even though they
    /// are acknowledged.
    pub fn error(&self) -> Option<NotificationError> {
        match self {
            ProcessingResult::VerificationFailed { reason } => Some(NotificationError::VerificationFailure(reason.clone())),
            ProcessingResult::NormalizationFailed(e) => Some(NotificationError::Normalization(e.clone())),
            ProcessingResult::StoreFailure(e) => Some(e.clone()),
            ProcessingResult::DuplicateConflictingDigest => Some(NotificationError::LedgerConflict),
            ProcessingResult::Reconciled(ReconcileOutcome::Conflict(reason)) => {
                Some(NotificationError::ReconcileConflict(format!("{reason:?}")))
            },
            _ => None,
        }
    }
}

impl Display for ProcessingResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingResult::VerificationFailed { reason } => write!(f, "verification failed: {reason}"),
            ProcessingResult::NormalizationFailed(e) => write!(f, "normalization failed: {e}"),
            ProcessingResult::StoreFailure(e) => write!(f, "store failure: {e}"),
            ProcessingResult::InFlight => write!(f, "in flight"),
            ProcessingResult::DuplicateSameDigest { .. } => write!(f, "duplicate"),
            ProcessingResult::DuplicateConflictingDigest => write!(f, "duplicate with conflicting payload"),
            ProcessingResult::Reconciled(ReconcileOutcome::NoOp(NoOpReason::UnknownOrder)) => {
                write!(f, "reconciled: unknown order")
            },
            ProcessingResult::Reconciled(outcome) => write!(f, "reconciled: {outcome}"),
        }
    }
}

pub fn decide(result: &ProcessingResult) -> AckDecision {
    match result {
        ProcessingResult::VerificationFailed { .. } |
        ProcessingResult::NormalizationFailed(_) |
        ProcessingResult::StoreFailure(_) |
        ProcessingResult::InFlight => AckDecision::Reject,
        ProcessingResult::DuplicateSameDigest { .. } |
        ProcessingResult::DuplicateConflictingDigest |
        ProcessingResult::Reconciled(_) => AckDecision::Acknowledge,
    }
}

/// The literal HTTP response a gateway expects for a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: &'static str,
}

pub fn render(gateway: GatewayId, decision: AckDecision) -> AckResponse {
    match (gateway, decision) {
        (GatewayId::Alipay, AckDecision::Acknowledge) => {
            AckResponse { status: 200, content_type: "text/plain; charset=utf-8", body: "success" }
        },
        (GatewayId::Alipay, AckDecision::Reject) => {
            AckResponse { status: 400, content_type: "text/plain; charset=utf-8", body: "fail" }
        },
        (GatewayId::Stripe, AckDecision::Acknowledge) => {
            AckResponse { status: 200, content_type: "application/json", body: r#"{"received":true}"# }
        },
        (GatewayId::Stripe, AckDecision::Reject) => {
            AckResponse { status: 400, content_type: "application/json", body: r#"{"received":false}"# }
        },
    }
}
