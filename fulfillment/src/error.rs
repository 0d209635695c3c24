//! Orchestrator errors
//!
//! Every public operation returns [`FulfillmentResult`]. [`ErrorKind`] sorts
//! variants into the validation / state / dependency / consistency taxonomy
//! so callers know whether re-reading and retrying makes sense.

use crate::db::StorageError;
use rust_decimal::Decimal;
use shared::error::{AppError, ErrorCode};
use shared::models::PaymentStatus;
use shared::order::{ActorRole, OrderStatus};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, rejected before anything is written
    Validation,
    /// Operation not legal for the record's current state
    State,
    /// Collaborator or storage failure
    ///
    /// A concurrent-transition race is not a kind of its own: the loser
    /// re-validates inside the write transaction and gets a `State` error.
    Dependency,
}

#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error("Invalid item: {0}")]
    InvalidItem(String),

    #[error("Order has no items")]
    EmptyOrder,

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid points: {0}")]
    InvalidPoints(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    #[error("Ingredient not found: {0}")]
    IngredientNotFound(String),

    #[error("Notification not found: {0}")]
    NotificationNotFound(String),

    #[error("Illegal transition for {order_id}: {from} -> {to} by {role}")]
    IllegalTransition {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
        role: ActorRole,
    },

    #[error("Order {order_id} is not cancellable in status {status}")]
    NotCancellable {
        order_id: String,
        status: OrderStatus,
    },

    #[error("Cancellation window expired for {order_id}")]
    CancellationWindowExpired { order_id: String },

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Return window expired for {0}")]
    ReturnWindowExpired(String),

    #[error("Return already requested for {0}")]
    ReturnAlreadyRequested(String),

    #[error("No open return request for {0}")]
    ReturnNotOpen(String),

    #[error("Order {order_id} cannot be returned in status {status}")]
    ReturnNotAllowed {
        order_id: String,
        status: OrderStatus,
    },

    #[error("Payment {payment_id} is not refundable in status {status:?}")]
    PaymentNotRefundable {
        payment_id: String,
        status: PaymentStatus,
    },

    #[error("Refund {requested} exceeds paid amount {paid}")]
    RefundExceedsPayment { requested: Decimal, paid: Decimal },

    #[error("Refund failed: {0}")]
    RefundFailed(String),

    #[error("Checkout failed: {0}")]
    CheckoutFailed(String),

    #[error("Checkout not allowed for {order_id}: {reason}")]
    CheckoutNotAllowed { order_id: String, reason: String },

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Insufficient points: requested {requested}, balance {balance}")]
    InsufficientPoints { requested: i64, balance: i64 },

    #[error("Storage error: {0}")]
    Storage(StorageError),
}

pub type FulfillmentResult<T> = Result<T, FulfillmentError>;

impl From<StorageError> for FulfillmentError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::OrderNotFound(id) => FulfillmentError::OrderNotFound(id),
            StorageError::PaymentNotFound(id) => FulfillmentError::PaymentNotFound(id),
            other => FulfillmentError::Storage(other),
        }
    }
}

impl FulfillmentError {
    pub fn kind(&self) -> ErrorKind {
        use FulfillmentError::*;
        match self {
            InvalidItem(_)
            | EmptyOrder
            | InvalidSchedule(_)
            | InvalidAmount(_)
            | InvalidPoints(_)
            | OrderNotFound(_)
            | PaymentNotFound(_)
            | IngredientNotFound(_)
            | NotificationNotFound(_)
            | RefundExceedsPayment { .. }
            | InsufficientPoints { .. } => ErrorKind::Validation,
            IllegalTransition { .. }
            | NotCancellable { .. }
            | CancellationWindowExpired { .. }
            | NotAuthorized(_)
            | ReturnWindowExpired(_)
            | ReturnAlreadyRequested(_)
            | ReturnNotOpen(_)
            | ReturnNotAllowed { .. }
            | PaymentNotRefundable { .. }
            | CheckoutNotAllowed { .. } => ErrorKind::State,
            RefundFailed(_) | CheckoutFailed(_) | GatewayUnavailable(_) => ErrorKind::Dependency,
            Storage(_) => ErrorKind::Dependency,
        }
    }

    /// The caller may re-attempt the same operation without re-reading state
    ///
    /// An undecodable record fails the same way every time.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Dependency
            && !matches!(self, FulfillmentError::Storage(StorageError::Serialization(_)))
    }
}

/// Classify a storage error by its message (redb reports most faults as text)
fn classify_storage_error(e: &StorageError) -> ErrorCode {
    if let StorageError::Serialization(_) = e {
        return ErrorCode::StorageCorrupted;
    }
    let text = e.to_string().to_lowercase();
    if text.contains("no space") || text.contains("disk full") || text.contains("enospc") {
        return ErrorCode::StorageFull;
    }
    if text.contains("corrupt") || text.contains("invalid database") {
        return ErrorCode::StorageCorrupted;
    }
    ErrorCode::SystemBusy
}

impl From<FulfillmentError> for AppError {
    fn from(err: FulfillmentError) -> Self {
        use FulfillmentError as E;
        let message = err.to_string();
        let code = match &err {
            E::InvalidItem(_) => ErrorCode::OrderItemInvalid,
            E::EmptyOrder => ErrorCode::OrderEmpty,
            E::InvalidSchedule(_) => ErrorCode::OrderScheduleInvalid,
            E::InvalidAmount(_) => ErrorCode::OrderInvalidAmount,
            E::InvalidPoints(_) => ErrorCode::InvalidPoints,
            E::OrderNotFound(_) => ErrorCode::OrderNotFound,
            E::PaymentNotFound(_) => ErrorCode::PaymentNotFound,
            E::IngredientNotFound(_) => ErrorCode::IngredientNotFound,
            E::NotificationNotFound(_) => ErrorCode::NotificationNotFound,
            E::IllegalTransition { .. } => ErrorCode::OrderIllegalTransition,
            E::NotCancellable { .. } => ErrorCode::OrderNotCancellable,
            E::CancellationWindowExpired { .. } => ErrorCode::CancellationWindowExpired,
            E::NotAuthorized(_) => ErrorCode::NotOrderOwner,
            E::ReturnWindowExpired(_) => ErrorCode::ReturnWindowExpired,
            E::ReturnAlreadyRequested(_) => ErrorCode::ReturnAlreadyRequested,
            E::ReturnNotOpen(_) => ErrorCode::ReturnNotOpen,
            E::ReturnNotAllowed { .. } => ErrorCode::OrderIllegalTransition,
            E::PaymentNotRefundable { .. } => ErrorCode::PaymentNotRefundable,
            E::RefundExceedsPayment { .. } => ErrorCode::PaymentRefundExceedsAmount,
            E::RefundFailed(_) => ErrorCode::RefundFailed,
            E::CheckoutFailed(_) => ErrorCode::PaymentFailed,
            E::CheckoutNotAllowed { .. } => ErrorCode::InvalidRequest,
            E::GatewayUnavailable(_) => ErrorCode::NetworkError,
            E::InsufficientPoints { .. } => ErrorCode::InsufficientPoints,
            E::Storage(e) => {
                let code = classify_storage_error(e);
                tracing::error!(error = %e, error_code = ?code, category = code.category().name(), "Storage error occurred");
                code
            }
        };
        let app = AppError::with_message(code, message);
        if err.is_retryable() {
            app.with_detail("retryable", true)
        } else {
            app
        }
    }
}
