use rust_decimal::Decimal;
use thiserror::Error;

/// Failure reasons that indicate an unrecoverable resource problem.
/// A cycle that dies with one of these disables monitoring for the
/// portfolio instead of retrying on the next tick.
const FATAL_REASON_PATTERNS: [&str; 4] = [
    "insufficient funds",
    "insufficient balance",
    "insufficient gas",
    "out of gas",
];

#[derive(Debug, Error)]
pub enum RebalanceError {
    #[error("portfolio {0} not found")]
    PortfolioNotFound(i32),

    #[error("portfolio {0} is inactive")]
    InactivePortfolio(i32),

    #[error("chain read failed for {symbol}: {reason}")]
    ChainRead { symbol: String, reason: String },

    #[error("no price available for {0}")]
    PriceUnavailable(String),

    #[error("invalid swap {from} -> {to}: {reason}")]
    InvalidSwap {
        from: String,
        to: String,
        reason: String,
    },

    #[error("venue call failed: {0}")]
    Venue(String),

    #[error("swap {index} failed: {reason}")]
    SwapExecution { index: usize, reason: String },

    #[error("fatal resource error: {reason}")]
    FatalResource { reason: String },

    #[error("allocation targets sum to {sum}, expected 1.0 within 0.001")]
    AllocationSumInvariant { sum: Decimal },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RebalanceError {
    /// Whether this error should disable future scheduling for the portfolio.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RebalanceError::FatalResource { .. })
    }
}

/// Match a raw failure message against the known unrecoverable classes.
pub fn is_fatal_reason(reason: &str) -> bool {
    let lowered = reason.to_lowercase();
    FATAL_REASON_PATTERNS
        .iter()
        .any(|pattern| lowered.contains(pattern))
}
