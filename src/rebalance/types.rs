use ethers::types::Address;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebalancePolicy {
    /// Act only on assets whose deviation exceeds the portfolio tolerance
    Threshold,
    /// Move toward exact targets every cycle regardless of drift size
    StrictPeriodic,
}

impl RebalancePolicy {
    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "threshold" => Some(Self::Threshold),
            "strict_periodic" => Some(Self::StrictPeriodic),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Threshold => "threshold",
            Self::StrictPeriodic => "strict_periodic",
        }
    }
}

/// Per-asset drift computed from the persisted cycle state. Carries the
/// asset descriptor so the planner can convert USD amounts to token units
/// without another catalog lookup.
#[derive(Debug, Clone)]
pub struct DeviationResult {
    pub asset_id: i32,
    pub symbol: String,
    pub asset_address: Address,
    pub decimals: u8,
    pub price_usd: Decimal,
    pub target_percentage: Decimal,
    pub current_percentage: Decimal,
    pub deviation: Decimal,
    pub needs_rebalance: bool,
    pub current_value_usd: Decimal,
    pub target_value_usd: Decimal,
}

/// One planned swap, ordered by priority. Snapshotted into the
/// rebalance job record before execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapOperation {
    pub from_symbol: String,
    pub to_symbol: String,
    pub from_address: Address,
    pub to_address: Address,
    pub from_decimals: u8,
    pub to_decimals: u8,
    pub amount_usd: Decimal,
    pub amount_tokens: Decimal,       // from-token units, floored to decimals
    pub expected_amount_out: Decimal, // to-token units at the planning price
    pub min_amount_out: Decimal,      // slippage floor in to-token units
    pub priority: Decimal,            // |gap_from| + |gap_to|
}

#[derive(Debug, Clone)]
pub struct RebalancePlan {
    pub swaps: Vec<SwapOperation>,
    pub max_deviation: Decimal,
    pub policy: RebalancePolicy,
}

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Gaps inside this band are treated as already on target
    pub gap_epsilon_usd: Decimal,
    /// "Close enough to skip" for USD comparisons while matching
    pub usd_epsilon: Decimal,
    /// No emitted swap may be smaller than this
    pub dust_floor_usd: Decimal,
    /// Fractional reduction applied to the expected output
    pub slippage_tolerance: Decimal,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            gap_epsilon_usd: Decimal::new(1, 6),   // 1e-6 USD
            usd_epsilon: Decimal::new(1, 2),       // one cent
            dust_floor_usd: Decimal::new(1, 2),    // one cent
            slippage_tolerance: Decimal::new(5, 3), // 0.5%
        }
    }
}
