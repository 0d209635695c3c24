//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            // 404 Not Found
            Self::OrderNotFound
            | Self::PaymentNotFound
            | Self::IngredientNotFound
            | Self::NotificationNotFound => StatusCode::NOT_FOUND,

            // 409 Conflict (state errors: re-read and retry)
            Self::OrderIllegalTransition
            | Self::OrderNotCancellable
            | Self::CancellationWindowExpired
            | Self::ReturnWindowExpired
            | Self::ReturnAlreadyRequested
            | Self::ReturnNotOpen
            | Self::PaymentNotRefundable => StatusCode::CONFLICT,

            // 403 Forbidden
            Self::NotOrderOwner => StatusCode::FORBIDDEN,

            // 402 Payment Required
            Self::InsufficientPoints => StatusCode::PAYMENT_REQUIRED,

            // 503 Service Unavailable (transient errors, client can retry)
            Self::NetworkError
            | Self::SystemBusy
            | Self::PaymentFailed
            | Self::RefundFailed => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            Self::StorageFull | Self::StorageCorrupted => StatusCode::INTERNAL_SERVER_ERROR,

            // 400 Bad Request (default for validation errors)
            _ => StatusCode::BAD_REQUEST,
        }
    }
}
