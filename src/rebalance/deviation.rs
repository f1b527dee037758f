use ethers::types::Address;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::db::db_manager::DbManager;
use crate::db::models::allocations::AllocationDetailModel;
use crate::errors::RebalanceError;

use super::types::DeviationResult;

/// Compute per-asset deviations for one portfolio from the state the
/// balance aggregator persisted this cycle. Pure read; safe to call
/// multiple times.
pub async fn calculate_deviations(
    db: &DbManager,
    portfolio_id: i32,
) -> Result<Vec<DeviationResult>, RebalanceError> {
    let portfolio = db
        .get_portfolio(portfolio_id)
        .await?
        .ok_or(RebalanceError::PortfolioNotFound(portfolio_id))?;
    let allocations = db.allocations_for_portfolio(portfolio_id).await?;
    let total_value_usd = portfolio.total_value_usd.unwrap_or(Decimal::ZERO);

    let deviations = compute_deviations(
        &allocations,
        total_value_usd,
        portfolio.rebalance_threshold,
    );
    debug!(
        portfolio_id = portfolio_id,
        asset_count = deviations.len(),
        "Deviations calculated"
    );
    Ok(deviations)
}

/// The deviation math, separated from persistence. `needs_rebalance`
/// uses a strictly-greater comparison against the threshold, so a
/// deviation exactly at the tolerance does not trigger.
pub fn compute_deviations(
    allocations: &[AllocationDetailModel],
    total_value_usd: Decimal,
    rebalance_threshold: Decimal,
) -> Vec<DeviationResult> {
    allocations
        .iter()
        .map(|allocation| {
            let current_percentage = allocation.current_percentage.unwrap_or(Decimal::ZERO);
            let current_value_usd = allocation.current_value_usd.unwrap_or(Decimal::ZERO);
            let deviation = (current_percentage - allocation.target_percentage).abs();
            let asset_address = allocation.asset_address.parse::<Address>().unwrap_or_else(|_| {
                warn!(
                    symbol = %allocation.symbol,
                    address = %allocation.asset_address,
                    "Invalid asset address in catalog"
                );
                Address::zero()
            });

            DeviationResult {
                asset_id: allocation.asset_id,
                symbol: allocation.symbol.clone(),
                asset_address,
                decimals: allocation.decimals as u8,
                price_usd: allocation.last_price_usd.unwrap_or(Decimal::ZERO),
                target_percentage: allocation.target_percentage,
                current_percentage,
                deviation,
                needs_rebalance: deviation > rebalance_threshold,
                current_value_usd,
                target_value_usd: total_value_usd * allocation.target_percentage,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocation(
        symbol: &str,
        target: Decimal,
        current_pct: Decimal,
        current_value: Decimal,
        price: Decimal,
    ) -> AllocationDetailModel {
        AllocationDetailModel {
            id: 1,
            portfolio_id: 1,
            asset_id: 1,
            target_percentage: target,
            current_percentage: Some(current_pct),
            current_value_usd: Some(current_value),
            current_balance: Some("0".to_string()),
            symbol: symbol.to_string(),
            asset_address: "0x2f2a2543B76A4166549F7aaB2e75Bef0aefC5B0f".to_string(),
            decimals: 8,
            price_feed: None,
            last_price_usd: Some(price),
        }
    }

    #[test]
    fn deviation_is_absolute_difference() {
        let allocations = vec![allocation(
            "WBTC",
            Decimal::new(5, 1),  // target 50%
            Decimal::new(56, 2), // current 56%
            Decimal::new(560, 0),
            Decimal::new(50_000, 0),
        )];
        let result = compute_deviations(&allocations, Decimal::new(1000, 0), Decimal::new(5, 2));
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].deviation, Decimal::new(6, 2));
        assert_eq!(result[0].target_value_usd, Decimal::new(500, 0));
        assert!(result[0].needs_rebalance);
    }

    #[test]
    fn threshold_gating_is_strictly_greater() {
        let threshold = Decimal::new(5, 2); // 0.05

        let below = compute_deviations(
            &[allocation(
                "WETH",
                Decimal::new(5, 1),
                Decimal::new(549, 3), // deviation 0.049
                Decimal::new(549, 0),
                Decimal::new(2000, 0),
            )],
            Decimal::new(1000, 0),
            threshold,
        );
        assert!(!below[0].needs_rebalance);

        let above = compute_deviations(
            &[allocation(
                "WETH",
                Decimal::new(5, 1),
                Decimal::new(551, 3), // deviation 0.051
                Decimal::new(551, 0),
                Decimal::new(2000, 0),
            )],
            Decimal::new(1000, 0),
            threshold,
        );
        assert!(above[0].needs_rebalance);
    }

    #[test]
    fn deviation_exactly_at_threshold_does_not_trigger() {
        let result = compute_deviations(
            &[allocation(
                "WBTC",
                Decimal::new(5, 1),
                Decimal::new(55, 2), // deviation exactly 0.05
                Decimal::new(550, 0),
                Decimal::new(50_000, 0),
            )],
            Decimal::new(1000, 0),
            Decimal::new(5, 2),
        );
        assert_eq!(result[0].deviation, Decimal::new(5, 2));
        assert!(!result[0].needs_rebalance);
    }

    #[test]
    fn missing_cached_state_counts_as_zero() {
        let mut alloc = allocation(
            "USDC",
            Decimal::new(2, 1),
            Decimal::ZERO,
            Decimal::ZERO,
            Decimal::ONE,
        );
        alloc.current_percentage = None;
        alloc.current_value_usd = None;
        let result = compute_deviations(&[alloc], Decimal::new(1000, 0), Decimal::new(5, 2));
        assert_eq!(result[0].current_percentage, Decimal::ZERO);
        assert_eq!(result[0].deviation, Decimal::new(2, 1));
        assert!(result[0].needs_rebalance);
    }
}
