use sqlx::{Error, PgPool};

use crate::db::models::asset_prices::NewAssetPriceModel;

/// Append a price observation to the history table
pub async fn insert(pool: &PgPool, price: &NewAssetPriceModel) -> Result<(), Error> {
    sqlx::query(
        r#"
        INSERT INTO asset_prices (asset_id, price_usd, confidence, timestamp)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(price.asset_id)
    .bind(price.price_usd)
    .bind(price.confidence)
    .bind(price.timestamp)
    .execute(pool)
    .await?;
    Ok(())
}
