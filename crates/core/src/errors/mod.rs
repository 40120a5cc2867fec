//! Error taxonomy for the Meridian trading platform

use thiserror::Error;

/// Main error type shared by every crate in the workspace.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing/invalid configuration. Fatal: callers should exit 2.
    #[error("config error: {0}")]
    ConfigError(String),

    /// Network, 5xx, or timeout talking to the broker. Retry with backoff.
    #[error("transient broker error: {0}")]
    TransientBrokerError(String),

    /// Broker-side rate limiting (429-equivalent).
    #[error("rate limited: {0}")]
    RateLimitError(String),

    /// Budget computed to zero and the cash fallback also failed.
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: String, available: String },

    /// Symbol unknown to the broker, or account not entitled to trade it.
    #[error("invalid symbol or not entitled: {0}")]
    InvalidSymbol(String),

    /// Fewer than 30 kline rows available after a sync attempt.
    #[error("data shortage for {symbol}: only {rows} rows available")]
    DataShortage { symbol: String, rows: usize },

    /// Account cache unavailable and no stale value to degrade to.
    #[error("stale cache unavailable for account {0}")]
    StaleCache(String),

    /// `mark_completed` removed zero items from `processing`.
    #[error("queue integrity error: {0}")]
    QueueIntegrityError(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("queue backend error: {0}")]
    QueueError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("broker API error: {0}")]
    ApiError(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the dispatch loop in OE should retry this error or fail it permanently.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Error::TransientBrokerError(_) | Error::RateLimitError(_)
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Error::TransientBrokerError(err.to_string())
        } else {
            Error::ApiError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::DatabaseError(err.to_string())
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::QueueError(err.to_string())
    }
}
