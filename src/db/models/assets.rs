use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;

#[derive(Debug, FromRow)]
pub struct AssetModel {
    pub id: i32,
    pub symbol: String,
    pub address: String,
    pub decimals: i32,
    pub is_active: bool,
    pub price_feed: Option<String>,
    pub last_price_usd: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAssetModel {
    pub symbol: String,
    pub address: String,
    pub decimals: i32,
    pub price_feed: Option<String>,
}
