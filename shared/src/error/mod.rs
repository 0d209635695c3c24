//! Unified error system for the fulfillment platform
//!
//! This module provides a comprehensive error handling system with:
//! - [`ErrorCode`]: Standardized error codes for all error types
//! - [`ErrorCategory`]: Classification of errors by domain
//! - [`AppError`]: Rich error type with codes, messages, and details
//!
//! # Error Code Ranges
//!
//! - 0xxx: General errors
//! - 2xxx: Permission errors
//! - 4xxx: Order errors
//! - 5xxx: Payment errors
//! - 6xxx: Rewards errors
//! - 7xxx: Inventory errors
//! - 8xxx: Notification errors
//! - 9xxx: System errors
//!
//! # Example
//!
//! ```
//! use shared::error::{AppError, ErrorCode, ErrorCategory};
//!
//! let err = AppError::with_message(ErrorCode::CancellationWindowExpired, "too late")
//!     .with_detail("order_id", "o-1");
//!
//! assert_eq!(err.code.code(), 4006);
//! assert_eq!(err.code.category(), ErrorCategory::Order);
//! ```

mod category;
mod codes;
mod http;
mod types;

pub use category::ErrorCategory;
pub use codes::{ErrorCode, InvalidErrorCode};
pub use types::{AppError, AppResult};
