//! Environment-variable driven configuration: every tunable the trading
//! binaries read is a typed field here with an explicit default.

use crate::{Error, Result};

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_required(key: &str) -> Result<String> {
    env_string(key).ok_or_else(|| Error::ConfigError(format!("missing required env var {key}")))
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_string(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env_string(key) {
        Some(v) => v != "0" && !v.eq_ignore_ascii_case("false"),
        None => default,
    }
}

fn env_csv(key: &str, default: &[&str]) -> Vec<String> {
    match env_string(key) {
        Some(v) => v.split(',').map(|s| s.trim().to_string()).collect(),
        None => default.iter().map(|s| s.to_string()).collect(),
    }
}

/// Fully-resolved runtime configuration for one account's SG/OE processes.
#[derive(Debug, Clone)]
pub struct Config {
    pub account_id: String,
    pub broker_app_key: String,
    pub broker_app_secret: String,
    pub broker_access_token: String,
    pub redis_url: String,
    pub database_dsn: String,
    pub broker_base_url: String,
    pub broker_ws_url: String,

    /// Symbols scanned every iteration, in addition to current
    /// positions and VIXY.US which are always subscribed alongside it.
    pub watchlist: Vec<String>,
    pub scan_interval_seconds: u64,
    pub rotation_interval_seconds: u64,

    pub signal_queue_key: String,
    pub signal_max_retries: u32,
    pub signal_queue_max_size: usize,
    pub order_executor_workers: usize,

    pub funds_retry_delay_minutes: u32,
    pub funds_retry_max: u32,

    pub use_db_klines: bool,
    pub db_klines_history_days: i64,
    pub api_klines_latest_days: i64,

    pub vixy_panic_threshold: rust_decimal::Decimal,
    pub vixy_alert_enabled: bool,

    pub kelly_enabled: bool,
    pub kelly_fraction: rust_decimal::Decimal,
    pub kelly_max_position: rust_decimal::Decimal,
    pub kelly_min_win_rate: rust_decimal::Decimal,
    pub kelly_min_trades: u32,

    pub regime_index_symbols: Vec<String>,
    pub regime_inverse_symbols: Vec<String>,

    pub gradual_exit_enabled: bool,
    pub gradual_exit_threshold_25: i32,
    pub gradual_exit_threshold_50: i32,
    pub partial_exit_observation_minutes: i64,

    pub add_position_enabled: bool,
    pub add_position_min_profit_pct: rust_decimal::Decimal,
    pub add_position_min_signal_score: i32,
    pub add_position_pct: rust_decimal::Decimal,
    pub add_position_cooldown_minutes: i64,
    pub add_position_max_per_day: u32,

    pub slack_cooldown_seconds: i64,
    pub notification_webhook_url: Option<String>,

    pub realtime_rotation_min_signal_score: i32,
    pub enable_weak_buy: bool,

    pub per_symbol_daily_max_buys: u32,
}

impl Config {
    /// Build configuration from environment variables, matching the
    /// `Settings::from_env()` shape used throughout the service binaries
    /// this workspace is built from. Missing required keys produce
    /// `Error::ConfigError`; the binary mains exit 2 on that error.
    pub fn from_env() -> Result<Self> {
        use rust_decimal::Decimal;

        Ok(Self {
            account_id: env_required("ACCOUNT_ID")?,
            broker_app_key: env_required("BROKER_APP_KEY")?,
            broker_app_secret: env_required("BROKER_APP_SECRET")?,
            broker_access_token: env_required("BROKER_ACCESS_TOKEN")?,
            redis_url: env_required("REDIS_URL")?,
            database_dsn: env_required("DATABASE_DSN")?,
            broker_base_url: env_string("BROKER_BASE_URL")
                .unwrap_or_else(|| "https://openapi.longbridge.com".to_string()),
            broker_ws_url: env_string("BROKER_WS_URL")
                .unwrap_or_else(|| "wss://openapi-quote.longbridge.com".to_string()),

            watchlist: env_csv("WATCHLIST", &[]),
            scan_interval_seconds: env_or("SCAN_INTERVAL_SECONDS", 60),
            rotation_interval_seconds: env_or("ROTATION_INTERVAL_SECONDS", 30),

            signal_queue_key: env_string("SIGNAL_QUEUE_KEY")
                .unwrap_or_else(|| "trading:signals".to_string()),
            signal_max_retries: env_or("SIGNAL_MAX_RETRIES", 3),
            signal_queue_max_size: env_or("SIGNAL_QUEUE_MAX_SIZE", 1000),
            order_executor_workers: env_or("ORDER_EXECUTOR_WORKERS", 1),

            funds_retry_delay_minutes: env_or("FUNDS_RETRY_DELAY", 1),
            funds_retry_max: env_or("FUNDS_RETRY_MAX", 5),

            use_db_klines: env_bool("USE_DB_KLINES", true),
            db_klines_history_days: env_or("DB_KLINES_HISTORY_DAYS", 90),
            api_klines_latest_days: env_or("API_KLINES_LATEST_DAYS", 3),

            vixy_panic_threshold: env_string("VIXY_PANIC_THRESHOLD")
                .and_then(|v| v.parse().ok())
                .unwrap_or(Decimal::new(300, 1)),
            vixy_alert_enabled: env_bool("VIXY_ALERT_ENABLED", true),

            kelly_enabled: env_bool("KELLY_ENABLED", true),
            kelly_fraction: env_string("KELLY_FRACTION")
                .and_then(|v| v.parse().ok())
                .unwrap_or(Decimal::new(4, 1)),
            kelly_max_position: env_string("KELLY_MAX_POSITION")
                .and_then(|v| v.parse().ok())
                .unwrap_or(Decimal::new(20, 2)),
            kelly_min_win_rate: env_string("KELLY_MIN_WIN_RATE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(Decimal::new(60, 2)),
            kelly_min_trades: env_or("KELLY_MIN_TRADES", 15),

            regime_index_symbols: env_csv(
                "REGIME_INDEX_SYMBOLS",
                &["HSI.HK", "QQQ.US", "SPY.US"],
            ),
            regime_inverse_symbols: env_csv("REGIME_INVERSE_SYMBOLS", &[]),

            gradual_exit_enabled: env_bool("GRADUAL_EXIT_ENABLED", true),
            gradual_exit_threshold_25: env_or("GRADUAL_EXIT_THRESHOLD_25", 40),
            gradual_exit_threshold_50: env_or("GRADUAL_EXIT_THRESHOLD_50", 50),
            partial_exit_observation_minutes: env_or("PARTIAL_EXIT_OBSERVATION_MINUTES", 5),

            add_position_enabled: env_bool("ADD_POSITION_ENABLED", true),
            add_position_min_profit_pct: env_string("ADD_POSITION_MIN_PROFIT_PCT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(Decimal::new(20, 1)),
            add_position_min_signal_score: env_or("ADD_POSITION_MIN_SIGNAL_SCORE", 60),
            add_position_pct: env_string("ADD_POSITION_PCT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(Decimal::new(15, 2)),
            add_position_cooldown_minutes: env_or("ADD_POSITION_COOLDOWN_MINUTES", 60),
            add_position_max_per_day: env_or("ADD_POSITION_MAX_PER_DAY", 2),

            slack_cooldown_seconds: env_or("SLACK_COOLDOWN_SECONDS", 3600),
            notification_webhook_url: env_string("NOTIFICATION_WEBHOOK_URL"),

            realtime_rotation_min_signal_score: env_or("REALTIME_ROTATION_MIN_SIGNAL_SCORE", 60),
            enable_weak_buy: env_bool("ENABLE_WEAK_BUY", false),

            per_symbol_daily_max_buys: env_or("PER_SYMBOL_DAILY_MAX_BUYS", 1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn set_required_vars() {
        std::env::set_var("ACCOUNT_ID", "acct-1");
        std::env::set_var("BROKER_APP_KEY", "key");
        std::env::set_var("BROKER_APP_SECRET", "secret");
        std::env::set_var("BROKER_ACCESS_TOKEN", "token");
        std::env::set_var("REDIS_URL", "redis://localhost:6379");
        std::env::set_var("DATABASE_DSN", "postgres://localhost/meridian");
    }

    /// Scenario: all required env vars set, nothing else.
    /// Expected: documented defaults come back unchanged.
    #[test]
    fn defaults_match_documented_values() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("ENABLE_WEAK_BUY");
        set_required_vars();
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.signal_max_retries, 3);
        assert_eq!(cfg.funds_retry_max, 5);
        assert!(!cfg.enable_weak_buy);
        assert_eq!(cfg.add_position_cooldown_minutes, 60);
        assert_eq!(cfg.add_position_max_per_day, 2);
    }

    /// Scenario: a required var is missing.
    /// Expected: ConfigError, not a panic.
    #[test]
    fn missing_required_var_is_config_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_required_vars();
        std::env::remove_var("ACCOUNT_ID");
        let result = Config::from_env();
        assert!(matches!(result, Err(Error::ConfigError(_))));
        std::env::set_var("ACCOUNT_ID", "acct-1");
    }
}
