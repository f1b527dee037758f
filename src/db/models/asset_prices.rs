use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;

#[derive(Debug, FromRow)]
pub struct AssetPriceModel {
    pub id: i32,
    pub asset_id: i32,
    pub price_usd: Decimal,
    pub confidence: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAssetPriceModel {
    pub asset_id: i32,
    pub price_usd: Decimal,
    pub confidence: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}
