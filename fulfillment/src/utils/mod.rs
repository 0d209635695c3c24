//! Utilities

pub mod logger;
pub mod retry;
pub mod time;

pub use retry::{CallError, call_with_retry};
pub use time::{Clock, ManualClock, SystemClock};
