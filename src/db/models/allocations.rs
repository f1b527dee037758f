use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;

#[derive(Debug, FromRow)]
pub struct AllocationModel {
    pub id: i32,
    pub portfolio_id: i32,
    pub asset_id: i32,
    pub target_percentage: Decimal,
    pub current_percentage: Option<Decimal>,
    pub current_value_usd: Option<Decimal>,
    pub current_balance: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewAllocationModel {
    pub portfolio_id: i32,
    pub asset_id: i32,
    pub target_percentage: Decimal,
}

/// Allocation joined with its asset row; the shape a monitoring cycle consumes.
#[derive(Debug, Clone, FromRow)]
pub struct AllocationDetailModel {
    pub id: i32,
    pub portfolio_id: i32,
    pub asset_id: i32,
    pub target_percentage: Decimal,
    pub current_percentage: Option<Decimal>,
    pub current_value_usd: Option<Decimal>,
    pub current_balance: Option<String>,
    pub symbol: String,
    pub asset_address: String,
    pub decimals: i32,
    pub price_feed: Option<String>,
    pub last_price_usd: Option<Decimal>,
}
