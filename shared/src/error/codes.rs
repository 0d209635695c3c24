//! Unified error codes for the fulfillment platform
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 2xxx: Permission errors
//! - 4xxx: Order errors
//! - 5xxx: Payment errors
//! - 6xxx: Rewards errors
//! - 7xxx: Inventory errors
//! - 8xxx: Notification errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Invalid request
    InvalidRequest = 5,

    // ==================== 2xxx: Permission ====================
    /// Customer acting on an order that is not theirs
    NotOrderOwner = 2002,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Referenced catalog item is missing or unavailable
    OrderItemInvalid = 4002,
    /// Requested schedule time is outside the accepted window
    OrderScheduleInvalid = 4003,
    /// Target status is not a legal successor
    OrderIllegalTransition = 4004,
    /// Order is past the point where it can be cancelled
    OrderNotCancellable = 4005,
    /// Customer cancellation window has elapsed
    CancellationWindowExpired = 4006,
    /// Return window has elapsed
    ReturnWindowExpired = 4007,
    /// A return has already been requested for this order
    ReturnAlreadyRequested = 4008,
    /// There is no open return request to resolve
    ReturnNotOpen = 4009,
    /// Order has no line items
    OrderEmpty = 4010,
    /// Fee, discount or quantity is invalid
    OrderInvalidAmount = 4011,

    // ==================== 5xxx: Payment ====================
    /// Payment not found
    PaymentNotFound = 5001,
    /// Checkout could not be started
    PaymentFailed = 5002,
    /// Payment is not in a refundable state
    PaymentNotRefundable = 5003,
    /// Refund amount exceeds payment
    PaymentRefundExceedsAmount = 5004,
    /// Gateway did not confirm the refund
    RefundFailed = 5005,

    // ==================== 6xxx: Rewards ====================
    /// Balance lower than requested points
    InsufficientPoints = 6001,
    /// Points amount must be positive
    InvalidPoints = 6002,

    // ==================== 7xxx: Inventory ====================
    /// Ingredient not found
    IngredientNotFound = 7001,

    // ==================== 8xxx: Notification ====================
    /// Notification not found
    NotificationNotFound = 8001,

    // ==================== 9xxx: System ====================
    /// Network error
    NetworkError = 9003,

    // ==================== 94xx: Storage ====================
    /// Storage full (disk space insufficient)
    StorageFull = 9401,
    /// Storage corrupted (data file damaged)
    StorageCorrupted = 9403,
    /// System busy (IO error, retry later)
    SystemBusy = 9404,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::InvalidRequest => "Invalid request",

            // Permission
            ErrorCode::NotOrderOwner => "Order belongs to another customer",

            // Order
            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::OrderItemInvalid => "Item is missing or unavailable",
            ErrorCode::OrderScheduleInvalid => "Scheduled time is invalid",
            ErrorCode::OrderIllegalTransition => "Status transition is not allowed",
            ErrorCode::OrderNotCancellable => "Order can no longer be cancelled",
            ErrorCode::CancellationWindowExpired => "Cancellation window has expired",
            ErrorCode::ReturnWindowExpired => "Return window has expired",
            ErrorCode::ReturnAlreadyRequested => "A return was already requested",
            ErrorCode::ReturnNotOpen => "No open return request",
            ErrorCode::OrderEmpty => "Order is empty",
            ErrorCode::OrderInvalidAmount => "Invalid amount",

            // Payment
            ErrorCode::PaymentNotFound => "Payment not found",
            ErrorCode::PaymentFailed => "Payment processing failed",
            ErrorCode::PaymentNotRefundable => "Payment cannot be refunded",
            ErrorCode::PaymentRefundExceedsAmount => "Refund amount exceeds original payment",
            ErrorCode::RefundFailed => "Refund failed, please retry",

            // Rewards
            ErrorCode::InsufficientPoints => "Insufficient points",
            ErrorCode::InvalidPoints => "Invalid points amount",

            // Inventory
            ErrorCode::IngredientNotFound => "Ingredient not found",

            // Notification
            ErrorCode::NotificationNotFound => "Notification not found",

            // System
            ErrorCode::NetworkError => "Network error",

            // Storage
            ErrorCode::StorageFull => "Storage full (disk space insufficient)",
            ErrorCode::StorageCorrupted => "Storage corrupted (data file damaged)",
            ErrorCode::SystemBusy => "System busy, please retry later",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            5 => Ok(ErrorCode::InvalidRequest),

            // Permission
            2002 => Ok(ErrorCode::NotOrderOwner),

            // Order
            4001 => Ok(ErrorCode::OrderNotFound),
            4002 => Ok(ErrorCode::OrderItemInvalid),
            4003 => Ok(ErrorCode::OrderScheduleInvalid),
            4004 => Ok(ErrorCode::OrderIllegalTransition),
            4005 => Ok(ErrorCode::OrderNotCancellable),
            4006 => Ok(ErrorCode::CancellationWindowExpired),
            4007 => Ok(ErrorCode::ReturnWindowExpired),
            4008 => Ok(ErrorCode::ReturnAlreadyRequested),
            4009 => Ok(ErrorCode::ReturnNotOpen),
            4010 => Ok(ErrorCode::OrderEmpty),
            4011 => Ok(ErrorCode::OrderInvalidAmount),

            // Payment
            5001 => Ok(ErrorCode::PaymentNotFound),
            5002 => Ok(ErrorCode::PaymentFailed),
            5003 => Ok(ErrorCode::PaymentNotRefundable),
            5004 => Ok(ErrorCode::PaymentRefundExceedsAmount),
            5005 => Ok(ErrorCode::RefundFailed),

            // Rewards
            6001 => Ok(ErrorCode::InsufficientPoints),
            6002 => Ok(ErrorCode::InvalidPoints),

            // Inventory
            7001 => Ok(ErrorCode::IngredientNotFound),

            // Notification
            8001 => Ok(ErrorCode::NotificationNotFound),

            // System
            9003 => Ok(ErrorCode::NetworkError),

            // Storage
            9401 => Ok(ErrorCode::StorageFull),
            9403 => Ok(ErrorCode::StorageCorrupted),
            9404 => Ok(ErrorCode::SystemBusy),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::OrderNotFound.code(), 4001);
        assert_eq!(ErrorCode::CancellationWindowExpired.code(), 4006);
        assert_eq!(ErrorCode::RefundFailed.code(), 5005);
        assert_eq!(ErrorCode::InsufficientPoints.code(), 6001);
        assert_eq!(ErrorCode::SystemBusy.code(), 9404);
    }

    #[test]
    fn test_try_from_round_trips_known_codes() {
        for code in [
            ErrorCode::NotOrderOwner,
            ErrorCode::OrderIllegalTransition,
            ErrorCode::ReturnAlreadyRequested,
            ErrorCode::PaymentRefundExceedsAmount,
            ErrorCode::IngredientNotFound,
            ErrorCode::NotificationNotFound,
        ] {
            assert_eq!(ErrorCode::try_from(code.code()), Ok(code));
        }
    }

    #[test]
    fn test_try_from_unknown_code() {
        assert_eq!(ErrorCode::try_from(4999), Err(InvalidErrorCode(4999)));
    }

    #[test]
    fn test_serde_as_number() {
        let json = serde_json::to_string(&ErrorCode::OrderNotCancellable).unwrap();
        assert_eq!(json, "4005");
        let back: ErrorCode = serde_json::from_str("4005").unwrap();
        assert_eq!(back, ErrorCode::OrderNotCancellable);
    }
}
