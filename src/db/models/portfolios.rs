use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct PortfolioModel {
    pub id: i32,
    pub owner_address: String,
    pub name: String,
    pub is_active: bool,
    pub policy: String,
    pub rebalance_threshold: Decimal,
    pub monitoring_interval_secs: i64,
    pub last_observed_at: Option<DateTime<Utc>>,
    pub last_rebalance_at: Option<DateTime<Utc>>,
    pub total_value_usd: Option<Decimal>,
    pub signer_key_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPortfolioModel {
    pub owner_address: String,
    pub name: String,
    pub policy: String,
    pub rebalance_threshold: Decimal,
    pub monitoring_interval_secs: i64,
    pub signer_key_ref: Option<String>,
}
