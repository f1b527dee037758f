use rust_decimal::Decimal;
use sqlx::{Error, PgPool};

use crate::db::models::assets::{AssetModel, NewAssetModel};

const ASSET_COLUMNS: &str =
    "id, symbol, address, decimals, is_active, price_feed, last_price_usd, created_at";

/// Fetch an asset by symbol
pub async fn get_by_symbol(pool: &PgPool, symbol: &str) -> Result<Option<AssetModel>, Error> {
    sqlx::query_as::<_, AssetModel>(&format!(
        "SELECT {} FROM assets WHERE symbol = $1",
        ASSET_COLUMNS
    ))
    .bind(symbol)
    .fetch_optional(pool)
    .await
}

/// Fetch all active assets
pub async fn list_active(pool: &PgPool) -> Result<Vec<AssetModel>, Error> {
    sqlx::query_as::<_, AssetModel>(&format!(
        "SELECT {} FROM assets WHERE is_active = TRUE ORDER BY symbol",
        ASSET_COLUMNS
    ))
    .fetch_all(pool)
    .await
}

/// Insert an asset if not already present, returning its ID
pub async fn insert(pool: &PgPool, asset: &NewAssetModel) -> Result<i32, Error> {
    let (id,): (i32,) = sqlx::query_as(
        r#"
        INSERT INTO assets (symbol, address, decimals, price_feed)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (symbol) DO UPDATE SET address = EXCLUDED.address
        RETURNING id
        "#,
    )
    .bind(&asset.symbol)
    .bind(&asset.address)
    .bind(asset.decimals)
    .bind(&asset.price_feed)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Cache the most recent oracle price on the asset row
pub async fn update_last_price(pool: &PgPool, id: i32, price_usd: Decimal) -> Result<(), Error> {
    sqlx::query("UPDATE assets SET last_price_usd = $2 WHERE id = $1")
        .bind(id)
        .bind(price_usd)
        .execute(pool)
        .await?;
    Ok(())
}
