use chrono::{DateTime, Utc};
use ethers::types::Address;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::chain::{ChainReader, TokenBalance};
use crate::db::db_manager::DbManager;
use crate::errors::RebalanceError;
use crate::oracle::{PriceOracle, PriceQuote};

/// One asset's contribution to the refreshed snapshot.
#[derive(Debug, Clone)]
pub struct AssetBalance {
    pub asset_id: i32,
    pub symbol: String,
    pub balance_raw: String,
    pub balance_formatted: Decimal,
    pub price_usd: Decimal,
    pub value_usd: Decimal,
}

#[derive(Debug, Clone)]
pub struct BalanceSnapshot {
    pub timestamp: DateTime<Utc>,
    pub total_value_usd: Decimal,
    pub per_asset: Vec<AssetBalance>,
}

struct CycleRead {
    allocation_id: i32,
    asset_id: i32,
    symbol: String,
    balance: TokenBalance,
    quote: Option<PriceQuote>,
}

/// Reads live chain balances and oracle prices for every allocation of a
/// portfolio and persists the USD valuation back onto the records.
pub struct BalanceAggregator {
    db: Arc<DbManager>,
    chain: Arc<dyn ChainReader>,
    oracle: Arc<dyn PriceOracle>,
}

impl BalanceAggregator {
    pub fn new(db: Arc<DbManager>, chain: Arc<dyn ChainReader>, oracle: Arc<dyn PriceOracle>) -> Self {
        Self { db, chain, oracle }
    }

    /// Refresh balances and prices for one portfolio. A failed balance or
    /// price read degrades that asset's value to zero for the cycle
    /// instead of aborting the whole refresh.
    #[instrument(skip(self))]
    pub async fn refresh_balances(
        &self,
        portfolio_id: i32,
    ) -> Result<BalanceSnapshot, RebalanceError> {
        let portfolio = self
            .db
            .get_portfolio(portfolio_id)
            .await?
            .ok_or(RebalanceError::PortfolioNotFound(portfolio_id))?;
        let owner: Address =
            portfolio
                .owner_address
                .parse()
                .map_err(|_| RebalanceError::ChainRead {
                    symbol: portfolio.owner_address.clone(),
                    reason: "invalid owner address".to_string(),
                })?;

        let allocations = self.db.allocations_for_portfolio(portfolio_id).await?;

        let mut reads = Vec::with_capacity(allocations.len());
        for allocation in &allocations {
            let balance = match allocation.asset_address.parse::<Address>() {
                Ok(asset_address) => {
                    let result = if asset_address == Address::zero() {
                        self.chain.get_native_balance(owner).await
                    } else {
                        self.chain
                            .get_token_balance(owner, asset_address, allocation.decimals as u8)
                            .await
                    };
                    match result {
                        Ok(balance) => balance,
                        Err(e) => {
                            warn!(
                                symbol = %allocation.symbol,
                                error = %e,
                                "Balance read failed, counting asset as zero for this cycle"
                            );
                            TokenBalance::zero()
                        }
                    }
                }
                Err(_) => {
                    warn!(
                        symbol = %allocation.symbol,
                        address = %allocation.asset_address,
                        "Invalid asset address, counting asset as zero for this cycle"
                    );
                    TokenBalance::zero()
                }
            };

            let quote = self.oracle.get_price(&allocation.symbol).await;
            if quote.is_none() {
                let err = RebalanceError::PriceUnavailable(allocation.symbol.clone());
                warn!(error = %err, "Counting asset as zero for this cycle");
            }

            reads.push(CycleRead {
                allocation_id: allocation.id,
                asset_id: allocation.asset_id,
                symbol: allocation.symbol.clone(),
                balance,
                quote,
            });
        }

        let total_value_usd: Decimal = reads
            .iter()
            .map(|read| read.balance.formatted * price_of(&read.quote))
            .sum();

        let now = Utc::now();
        let mut per_asset = Vec::with_capacity(reads.len());
        for read in &reads {
            let price_usd = price_of(&read.quote);
            let value_usd = read.balance.formatted * price_usd;
            let current_percentage = if total_value_usd > Decimal::ZERO {
                value_usd / total_value_usd
            } else {
                Decimal::ZERO
            };

            self.db
                .update_allocation_state(
                    read.allocation_id,
                    &read.balance.raw,
                    value_usd,
                    current_percentage,
                    now,
                )
                .await?;

            if let Some(quote) = &read.quote {
                self.db
                    .record_asset_price(
                        read.asset_id,
                        quote.price,
                        Some(quote.confidence),
                        quote.timestamp,
                    )
                    .await?;
            }

            debug!(
                symbol = %read.symbol,
                balance = %read.balance.formatted,
                value_usd = %value_usd,
                percentage = %current_percentage,
                "Allocation state refreshed"
            );

            per_asset.push(AssetBalance {
                asset_id: read.asset_id,
                symbol: read.symbol.clone(),
                balance_raw: read.balance.raw.clone(),
                balance_formatted: read.balance.formatted,
                price_usd,
                value_usd,
            });
        }

        self.db
            .record_observation(portfolio_id, total_value_usd, now)
            .await?;

        info!(
            portfolio_id = portfolio_id,
            total_value_usd = %total_value_usd,
            asset_count = per_asset.len(),
            "Balances refreshed"
        );

        Ok(BalanceSnapshot {
            timestamp: now,
            total_value_usd,
            per_asset,
        })
    }
}

fn price_of(quote: &Option<PriceQuote>) -> Decimal {
    quote.as_ref().map(|q| q.price).unwrap_or(Decimal::ZERO)
}
