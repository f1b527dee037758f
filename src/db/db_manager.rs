use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::info;

use super::connection;
use super::models::{
    allocations::{AllocationDetailModel, NewAllocationModel},
    asset_prices::NewAssetPriceModel,
    assets::{AssetModel, NewAssetModel},
    portfolios::{NewPortfolioModel, PortfolioModel},
    rebalance_jobs::{NewRebalanceJobModel, RebalanceJobModel},
};
use super::queries::{
    allocations as allocations_queries, asset_prices as asset_prices_queries,
    assets as assets_queries, portfolios as portfolios_queries,
    rebalance_jobs as rebalance_jobs_queries,
};
use super::schema;
use crate::config::Config;
use crate::errors::RebalanceError;

/// `|sum(target) - 1|` must stay below this at allocation create/update time
const ALLOCATION_SUM_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 3); // 0.001

pub struct DbManager {
    pub pool: PgPool,
}

impl DbManager {
    /// Creates a new database connection pool and initializes the schema
    pub async fn init(config: &Config) -> Result<Self, sqlx::Error> {
        let pool = connection::create_pool(config).await?;

        // Ensure schema is initialized (creates tables if needed)
        schema::init_schema(&pool).await?;

        Ok(Self { pool })
    }

    // ========== Portfolios ==========

    pub async fn get_portfolio(&self, id: i32) -> Result<Option<PortfolioModel>, sqlx::Error> {
        portfolios_queries::get_portfolio(&self.pool, id).await
    }

    pub async fn list_active_portfolios(&self) -> Result<Vec<PortfolioModel>, sqlx::Error> {
        portfolios_queries::list_active(&self.pool).await
    }

    pub async fn create_portfolio(&self, portfolio: &NewPortfolioModel) -> Result<i32, sqlx::Error> {
        portfolios_queries::insert(&self.pool, portfolio).await
    }

    pub async fn set_portfolio_active(&self, id: i32, active: bool) -> Result<(), sqlx::Error> {
        portfolios_queries::set_active(&self.pool, id, active).await
    }

    pub async fn record_observation(
        &self,
        id: i32,
        total_value_usd: Decimal,
        observed_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        portfolios_queries::update_observation(&self.pool, id, total_value_usd, observed_at).await
    }

    pub async fn record_rebalance(
        &self,
        id: i32,
        rebalanced_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        portfolios_queries::mark_rebalanced(&self.pool, id, rebalanced_at).await
    }

    // ========== Assets ==========

    pub async fn create_asset(&self, asset: &NewAssetModel) -> Result<i32, sqlx::Error> {
        assets_queries::insert(&self.pool, asset).await
    }

    pub async fn get_asset_by_symbol(&self, symbol: &str) -> Result<Option<AssetModel>, sqlx::Error> {
        assets_queries::get_by_symbol(&self.pool, symbol).await
    }

    pub async fn list_active_assets(&self) -> Result<Vec<AssetModel>, sqlx::Error> {
        assets_queries::list_active(&self.pool).await
    }

    /// Cache the latest price on the asset row and append to the history table
    pub async fn record_asset_price(
        &self,
        asset_id: i32,
        price_usd: Decimal,
        confidence: Option<Decimal>,
        timestamp: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        assets_queries::update_last_price(&self.pool, asset_id, price_usd).await?;
        asset_prices_queries::insert(
            &self.pool,
            &NewAssetPriceModel {
                asset_id,
                price_usd,
                confidence,
                timestamp,
            },
        )
        .await
    }

    // ========== Allocations ==========

    pub async fn allocations_for_portfolio(
        &self,
        portfolio_id: i32,
    ) -> Result<Vec<AllocationDetailModel>, sqlx::Error> {
        allocations_queries::for_portfolio(&self.pool, portfolio_id).await
    }

    /// Replace a portfolio's allocation target set. The full set is
    /// validated against the 100%-sum invariant before any row is touched;
    /// a violating set is rejected outright.
    pub async fn set_allocation_targets(
        &self,
        portfolio_id: i32,
        targets: &[(i32, Decimal)],
    ) -> Result<(), RebalanceError> {
        let fractions: Vec<Decimal> = targets.iter().map(|(_, target)| *target).collect();
        validate_allocation_targets(&fractions)?;

        let keep_asset_ids: Vec<i32> = targets.iter().map(|(asset_id, _)| *asset_id).collect();
        allocations_queries::delete_except(&self.pool, portfolio_id, &keep_asset_ids).await?;
        for (asset_id, target_percentage) in targets {
            allocations_queries::upsert_target(
                &self.pool,
                &NewAllocationModel {
                    portfolio_id,
                    asset_id: *asset_id,
                    target_percentage: *target_percentage,
                },
            )
            .await?;
        }
        info!(
            portfolio_id = portfolio_id,
            allocation_count = targets.len(),
            "Allocation targets updated"
        );
        Ok(())
    }

    pub async fn update_allocation_state(
        &self,
        allocation_id: i32,
        current_balance: &str,
        current_value_usd: Decimal,
        current_percentage: Decimal,
        updated_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        allocations_queries::update_state(
            &self.pool,
            allocation_id,
            current_balance,
            current_value_usd,
            current_percentage,
            updated_at,
        )
        .await
    }

    // ========== Rebalance jobs ==========

    pub async fn create_job(&self, job: &NewRebalanceJobModel) -> Result<i32, sqlx::Error> {
        rebalance_jobs_queries::insert(&self.pool, job).await
    }

    pub async fn mark_job_executing(&self, id: i32) -> Result<(), sqlx::Error> {
        rebalance_jobs_queries::mark_executing(&self.pool, id, Utc::now()).await
    }

    pub async fn mark_job_completed(&self, id: i32, tx_hashes: &str) -> Result<(), sqlx::Error> {
        rebalance_jobs_queries::mark_completed(&self.pool, id, tx_hashes, Utc::now()).await
    }

    pub async fn mark_job_failed(
        &self,
        id: i32,
        tx_hashes: &str,
        error_message: &str,
    ) -> Result<(), sqlx::Error> {
        rebalance_jobs_queries::mark_failed(&self.pool, id, tx_hashes, error_message, Utc::now())
            .await
    }

    pub async fn latest_job_for_portfolio(
        &self,
        portfolio_id: i32,
    ) -> Result<Option<RebalanceJobModel>, sqlx::Error> {
        rebalance_jobs_queries::latest_for_portfolio(&self.pool, portfolio_id).await
    }
}

/// Check the 100%-allocation-sum invariant for a target set.
pub fn validate_allocation_targets(targets: &[Decimal]) -> Result<(), RebalanceError> {
    let sum: Decimal = targets.iter().copied().sum();
    if (sum - Decimal::ONE).abs() >= ALLOCATION_SUM_TOLERANCE {
        return Err(RebalanceError::AllocationSumInvariant { sum });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_sum_is_accepted() {
        let targets = vec![Decimal::new(5, 1), Decimal::new(3, 1), Decimal::new(2, 1)];
        assert!(validate_allocation_targets(&targets).is_ok());
    }

    #[test]
    fn sum_within_tolerance_is_accepted() {
        // 0.5 + 0.3 + 0.2004 = 1.0004, inside the 0.001 band
        let targets = vec![
            Decimal::new(5, 1),
            Decimal::new(3, 1),
            Decimal::new(2004, 4),
        ];
        assert!(validate_allocation_targets(&targets).is_ok());
    }

    #[test]
    fn sum_outside_tolerance_is_rejected() {
        let targets = vec![Decimal::new(5, 1), Decimal::new(3, 1), Decimal::new(21, 2)];
        let err = validate_allocation_targets(&targets).unwrap_err();
        assert!(matches!(
            err,
            RebalanceError::AllocationSumInvariant { sum } if sum == Decimal::new(101, 2)
        ));
    }

    #[test]
    fn boundary_sum_is_rejected() {
        // exactly 0.001 off is not strictly inside the tolerance
        let targets = vec![Decimal::new(5, 1), Decimal::new(501, 3)];
        assert!(validate_allocation_targets(&targets).is_err());
    }
}
