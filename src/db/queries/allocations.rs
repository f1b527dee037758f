use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Error, PgPool};

use crate::db::models::allocations::{AllocationDetailModel, NewAllocationModel};

/// Fetch a portfolio's allocations joined with their asset rows,
/// ordered by symbol for deterministic iteration.
pub async fn for_portfolio(
    pool: &PgPool,
    portfolio_id: i32,
) -> Result<Vec<AllocationDetailModel>, Error> {
    sqlx::query_as::<_, AllocationDetailModel>(
        r#"
        SELECT al.id, al.portfolio_id, al.asset_id, al.target_percentage,
               al.current_percentage, al.current_value_usd, al.current_balance,
               a.symbol, a.address AS asset_address, a.decimals, a.price_feed, a.last_price_usd
        FROM allocations al
        JOIN assets a ON a.id = al.asset_id
        WHERE al.portfolio_id = $1
        ORDER BY a.symbol
        "#,
    )
    .bind(portfolio_id)
    .fetch_all(pool)
    .await
}

/// Insert or update the target for one portfolio/asset pair
pub async fn upsert_target(pool: &PgPool, allocation: &NewAllocationModel) -> Result<(), Error> {
    sqlx::query(
        r#"
        INSERT INTO allocations (portfolio_id, asset_id, target_percentage)
        VALUES ($1, $2, $3)
        ON CONFLICT (portfolio_id, asset_id)
        DO UPDATE SET target_percentage = EXCLUDED.target_percentage
        "#,
    )
    .bind(allocation.portfolio_id)
    .bind(allocation.asset_id)
    .bind(allocation.target_percentage)
    .execute(pool)
    .await?;
    Ok(())
}

/// Remove allocations for assets no longer in the portfolio's target set
pub async fn delete_except(
    pool: &PgPool,
    portfolio_id: i32,
    keep_asset_ids: &[i32],
) -> Result<(), Error> {
    sqlx::query(
        "DELETE FROM allocations WHERE portfolio_id = $1 AND asset_id <> ALL($2)",
    )
    .bind(portfolio_id)
    .bind(keep_asset_ids)
    .execute(pool)
    .await?;
    Ok(())
}

/// Persist the balance-refresh output for one allocation
pub async fn update_state(
    pool: &PgPool,
    allocation_id: i32,
    current_balance: &str,
    current_value_usd: Decimal,
    current_percentage: Decimal,
    updated_at: DateTime<Utc>,
) -> Result<(), Error> {
    sqlx::query(
        r#"
        UPDATE allocations
        SET current_balance = $2, current_value_usd = $3, current_percentage = $4, updated_at = $5
        WHERE id = $1
        "#,
    )
    .bind(allocation_id)
    .bind(current_balance)
    .bind(current_value_usd)
    .bind(current_percentage)
    .bind(updated_at)
    .execute(pool)
    .await?;
    Ok(())
}
