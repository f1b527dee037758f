use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Error, PgPool};

use crate::db::models::portfolios::{NewPortfolioModel, PortfolioModel};

const PORTFOLIO_COLUMNS: &str = "id, owner_address, name, is_active, policy, rebalance_threshold, \
     monitoring_interval_secs, last_observed_at, last_rebalance_at, total_value_usd, \
     signer_key_ref, created_at";

/// Fetch a portfolio by its database ID
pub async fn get_portfolio(pool: &PgPool, id: i32) -> Result<Option<PortfolioModel>, Error> {
    sqlx::query_as::<_, PortfolioModel>(&format!(
        "SELECT {} FROM portfolios WHERE id = $1",
        PORTFOLIO_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Fetch all portfolios with monitoring enabled
pub async fn list_active(pool: &PgPool) -> Result<Vec<PortfolioModel>, Error> {
    sqlx::query_as::<_, PortfolioModel>(&format!(
        "SELECT {} FROM portfolios WHERE is_active = TRUE ORDER BY id",
        PORTFOLIO_COLUMNS
    ))
    .fetch_all(pool)
    .await
}

/// Insert a portfolio and return its ID
pub async fn insert(pool: &PgPool, portfolio: &NewPortfolioModel) -> Result<i32, Error> {
    let (id,): (i32,) = sqlx::query_as(
        r#"
        INSERT INTO portfolios (owner_address, name, policy, rebalance_threshold, monitoring_interval_secs, signer_key_ref)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(&portfolio.owner_address)
    .bind(&portfolio.name)
    .bind(&portfolio.policy)
    .bind(portfolio.rebalance_threshold)
    .bind(portfolio.monitoring_interval_secs)
    .bind(&portfolio.signer_key_ref)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Enable or disable monitoring for a portfolio
pub async fn set_active(pool: &PgPool, id: i32, active: bool) -> Result<(), Error> {
    sqlx::query("UPDATE portfolios SET is_active = $2 WHERE id = $1")
        .bind(id)
        .bind(active)
        .execute(pool)
        .await?;
    Ok(())
}

/// Record the outcome of a balance refresh: cached total value and observation time
pub async fn update_observation(
    pool: &PgPool,
    id: i32,
    total_value_usd: Decimal,
    observed_at: DateTime<Utc>,
) -> Result<(), Error> {
    sqlx::query("UPDATE portfolios SET total_value_usd = $2, last_observed_at = $3 WHERE id = $1")
        .bind(id)
        .bind(total_value_usd)
        .bind(observed_at)
        .execute(pool)
        .await?;
    Ok(())
}

/// Bump the last-rebalance timestamp after a completed execution
pub async fn mark_rebalanced(
    pool: &PgPool,
    id: i32,
    rebalanced_at: DateTime<Utc>,
) -> Result<(), Error> {
    sqlx::query("UPDATE portfolios SET last_rebalance_at = $2 WHERE id = $1")
        .bind(id)
        .bind(rebalanced_at)
        .execute(pool)
        .await?;
    Ok(())
}
