/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a random string identifier for a new record.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Milliseconds in one minute
pub const MINUTE_MS: i64 = 60 * 1000;

/// Milliseconds in one hour
pub const HOUR_MS: i64 = 60 * MINUTE_MS;

/// Milliseconds in one day
pub const DAY_MS: i64 = 24 * HOUR_MS;
