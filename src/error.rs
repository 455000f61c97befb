use thiserror::Error;

/// Errors raised by the indicator functions.
///
/// `InsufficientData` is the normal "not warmed up yet" outcome; every other
/// variant means the input itself was malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndicatorError {
    #[error("insufficient data for {indicator}: need {needed}, have {available}")]
    InsufficientData {
        indicator: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("{indicator}: period must be greater than zero")]
    InvalidPeriod { indicator: &'static str },

    #[error("{indicator}: input series is empty")]
    EmptyInput { indicator: &'static str },

    #[error("{indicator}: input lengths differ (highs={highs}, lows={lows}, closes={closes})")]
    LengthMismatch {
        indicator: &'static str,
        highs: usize,
        lows: usize,
        closes: usize,
    },

    #[error("{indicator}: {reason}")]
    InvalidInput {
        indicator: &'static str,
        reason: String,
    },
}

impl IndicatorError {
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, IndicatorError::InsufficientData { .. })
    }
}

pub type IndicatorResult<T> = std::result::Result<T, IndicatorError>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("computation error: {0}")]
    Computation(String),

    #[error("order execution failed: {0}")]
    Execution(String),

    #[error("ingestion error: {0}")]
    Ingestion(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<IndicatorError> for Error {
    fn from(err: IndicatorError) -> Self {
        if err.is_insufficient_data() {
            Error::InsufficientData(err.to_string())
        } else {
            Error::Computation(err.to_string())
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
