use sqlx::{Executor, postgres::PgPool};

pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    pool.execute(include_str!("assets.sql")).await?;
    pool.execute(include_str!("portfolios.sql")).await?;
    pool.execute(include_str!("allocations.sql")).await?;
    pool.execute(include_str!("asset_prices.sql")).await?;
    pool.execute(include_str!("rebalance_jobs.sql")).await?;

    // Create indices on the hot lookup paths
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_asset_prices_asset_timestamp
        ON asset_prices(asset_id, timestamp);
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_rebalance_jobs_portfolio_created
        ON rebalance_jobs(portfolio_id, created_at);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
