use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Rewards earning and redemption parameters
#[derive(Debug, Clone)]
pub struct RewardsConfig {
    /// Points per currency unit of the order total
    pub base_rate: Decimal,
    /// Flat bonus on the customer's first delivered order
    pub first_order_bonus: i64,
    /// Bonus credited to the referrer on the referee's first delivered order
    pub referral_bonus: i64,
    /// Points that redeem for one currency unit
    pub points_per_unit: i64,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            base_rate: Decimal::ONE,
            first_order_bonus: 50,
            referral_bonus: 100,
            points_per_unit: 100,
        }
    }
}

/// Orchestrator configuration
///
/// # Environment variables
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | WORK_DIR | ./data | redb file and logs |
/// | LOG_LEVEL | info | tracing filter |
/// | LOG_JSON | false | JSON console output |
/// | CURRENCY | EUR | payment currency |
/// | TAX_RATE | 0 | tax fraction of (subtotal - discount) |
/// | CUSTOMER_CANCEL_WINDOW_SECS | 300 | customer cancellation window |
/// | RETURN_WINDOW_SECS | 86400 | return window after delivery |
/// | SCHEDULE_MIN_LEAD_SECS | 900 | minimum lead for a scheduled order |
/// | SCHEDULE_HORIZON_SECS | 604800 | furthest allowed schedule |
/// | GATEWAY_TIMEOUT_MS | 10000 | bound per gateway call |
/// | TRANSPORT_TIMEOUT_MS | 5000 | bound per transport send |
/// | PROFILE_TIMEOUT_MS | 2000 | bound per profile store lookup |
/// | AUTO_ACCEPT_PAID_ORDERS | false | move Placed to Processing on payment |
/// | REWARDS_BASE_RATE | 1 | points per currency unit |
/// | REWARDS_FIRST_ORDER_BONUS | 50 | first delivered order bonus |
/// | REWARDS_REFERRAL_BONUS | 100 | referrer bonus |
/// | REWARDS_POINTS_PER_UNIT | 100 | points per currency unit redeemed |
/// | AUDIT_BUFFER_SIZE | 1024 | audit channel capacity |
///
/// ```ignore
/// WORK_DIR=/srv/fulfillment TAX_RATE=0.10 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub work_dir: String,
    pub log_level: String,
    pub log_json: bool,
    pub currency: String,
    pub tax_rate: Decimal,
    pub customer_cancel_window_ms: i64,
    pub return_window_ms: i64,
    pub schedule_min_lead_ms: i64,
    pub schedule_horizon_ms: i64,
    pub gateway_timeout: Duration,
    pub transport_timeout: Duration,
    pub profile_timeout: Duration,
    pub auto_accept_paid_orders: bool,
    pub rewards: RewardsConfig,
    pub audit_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_dir: "./data".into(),
            log_level: "info".into(),
            log_json: false,
            currency: "EUR".into(),
            tax_rate: Decimal::ZERO,
            customer_cancel_window_ms: 300 * 1000,
            return_window_ms: 86_400 * 1000,
            schedule_min_lead_ms: 900 * 1000,
            schedule_horizon_ms: 604_800 * 1000,
            gateway_timeout: Duration::from_millis(10_000),
            transport_timeout: Duration::from_millis(5_000),
            profile_timeout: Duration::from_millis(2_000),
            auto_accept_paid_orders: false,
            rewards: RewardsConfig::default(),
            audit_buffer_size: 1024,
        }
    }
}

impl Config {
    /// Load from environment variables (and `.env` if present)
    ///
    /// Unset or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let d = Self::default();
        let secs = |key: &str, default_ms: i64| -> i64 {
            parse_or(env(key), default_ms / 1000).saturating_mul(1000)
        };

        Self {
            work_dir: env("WORK_DIR").unwrap_or(d.work_dir),
            log_level: env("LOG_LEVEL").unwrap_or(d.log_level),
            log_json: parse_or(env("LOG_JSON"), d.log_json),
            currency: env("CURRENCY").unwrap_or(d.currency),
            tax_rate: parse_or(env("TAX_RATE"), d.tax_rate),
            customer_cancel_window_ms: secs(
                "CUSTOMER_CANCEL_WINDOW_SECS",
                d.customer_cancel_window_ms,
            ),
            return_window_ms: secs("RETURN_WINDOW_SECS", d.return_window_ms),
            schedule_min_lead_ms: secs("SCHEDULE_MIN_LEAD_SECS", d.schedule_min_lead_ms),
            schedule_horizon_ms: secs("SCHEDULE_HORIZON_SECS", d.schedule_horizon_ms),
            gateway_timeout: Duration::from_millis(parse_or(env("GATEWAY_TIMEOUT_MS"), 10_000)),
            transport_timeout: Duration::from_millis(parse_or(
                env("TRANSPORT_TIMEOUT_MS"),
                5_000,
            )),
            profile_timeout: Duration::from_millis(parse_or(env("PROFILE_TIMEOUT_MS"), 2_000)),
            auto_accept_paid_orders: parse_or(
                env("AUTO_ACCEPT_PAID_ORDERS"),
                d.auto_accept_paid_orders,
            ),
            rewards: RewardsConfig {
                base_rate: parse_or(env("REWARDS_BASE_RATE"), d.rewards.base_rate),
                first_order_bonus: parse_or(
                    env("REWARDS_FIRST_ORDER_BONUS"),
                    d.rewards.first_order_bonus,
                ),
                referral_bonus: parse_or(env("REWARDS_REFERRAL_BONUS"), d.rewards.referral_bonus),
                points_per_unit: parse_or(
                    env("REWARDS_POINTS_PER_UNIT"),
                    d.rewards.points_per_unit,
                )
                .max(1),
            },
            audit_buffer_size: parse_or(env("AUDIT_BUFFER_SIZE"), d.audit_buffer_size).max(1),
        }
    }

    /// Defaults without touching the environment
    pub fn for_tests() -> Self {
        Self::default()
    }

    /// Path of the redb database file
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("fulfillment.redb")
    }

    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("logs")
    }
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::for_tests();
        assert_eq!(config.customer_cancel_window_ms, 5 * 60 * 1000);
        assert_eq!(config.return_window_ms, 24 * 60 * 60 * 1000);
        assert_eq!(config.schedule_horizon_ms, 7 * 24 * 60 * 60 * 1000);
        assert_eq!(config.currency, "EUR");
        assert_eq!(config.rewards.points_per_unit, 100);
        assert!(!config.auto_accept_paid_orders);
        assert_eq!(config.profile_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_parse_or_falls_back() {
        assert_eq!(parse_or(Some("42".into()), 7u64), 42);
        assert_eq!(parse_or(Some("abc".into()), 7u64), 7);
        assert_eq!(parse_or::<u64>(None, 7), 7);
        assert_eq!(
            parse_or(Some("0.21".into()), Decimal::ZERO),
            Decimal::new(21, 2)
        );
        assert!(parse_or(Some(" true ".into()), false));
    }

    #[test]
    fn test_paths_under_work_dir() {
        let mut config = Config::for_tests();
        config.work_dir = "/srv/f".into();
        assert_eq!(config.db_path(), PathBuf::from("/srv/f/fulfillment.redb"));
        assert_eq!(config.log_dir(), PathBuf::from("/srv/f/logs"));
    }
}
