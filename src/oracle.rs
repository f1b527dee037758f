use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ethers::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::db::db_manager::DbManager;
use crate::errors::RebalanceError;

// ABI for Chainlink AggregatorV3Interface
abigen!(
    AggregatorV3Interface,
    r#"[
        function latestRoundData() external view returns (uint80, int256, uint256, uint256, uint80)
        function decimals() external view returns (uint8)
    ]"#
);

/// A USD price observation for one asset symbol.
#[derive(Debug, Clone)]
pub struct PriceQuote {
    pub price: Decimal,
    pub confidence: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Price supplier consumed by the balance aggregator and the planner.
/// Returns None when no usable price exists; callers degrade that asset's
/// contribution to zero for the cycle.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn get_price(&self, symbol: &str) -> Option<PriceQuote>;
}

/// Chainlink-backed oracle. The symbol -> aggregator feed registry is
/// loaded from the asset catalog at `start()` and owned by the process
/// bootstrap, never reached through global state.
pub struct ChainlinkOracle {
    provider: Arc<Provider<Http>>,
    feeds: RwLock<HashMap<String, Address>>,
}

impl ChainlinkOracle {
    pub fn new(provider: Arc<Provider<Http>>) -> Self {
        Self {
            provider,
            feeds: RwLock::new(HashMap::new()),
        }
    }

    /// Load the feed registry from the active asset catalog.
    #[instrument(skip(self, db))]
    pub async fn start(&self, db: &DbManager) -> Result<(), RebalanceError> {
        let assets = db.list_active_assets().await?;
        let mut feeds = self.feeds.write().await;
        feeds.clear();
        for asset in assets {
            let Some(feed) = asset.price_feed else {
                warn!(symbol = %asset.symbol, "Asset has no price feed configured");
                continue;
            };
            match Address::from_str(&feed) {
                Ok(aggregator) => {
                    feeds.insert(asset.symbol.clone(), aggregator);
                    debug!(symbol = %asset.symbol, aggregator = ?aggregator, "Registered price feed");
                }
                Err(e) => {
                    warn!(symbol = %asset.symbol, feed = %feed, error = %e, "Invalid price feed address");
                }
            }
        }
        info!(feed_count = feeds.len(), "Price oracle started");
        Ok(())
    }

    /// Drop the feed registry; `get_price` returns None until restarted.
    pub async fn stop(&self) {
        self.feeds.write().await.clear();
        info!("Price oracle stopped");
    }

    /// Read one aggregator round and scale the answer by its decimals.
    async fn read_feed(&self, aggregator: Address) -> Result<PriceQuote, RebalanceError> {
        let contract = AggregatorV3Interface::new(aggregator, self.provider.clone());
        let decimals = contract
            .decimals()
            .call()
            .await
            .map_err(|e| RebalanceError::ChainRead {
                symbol: format!("{:?}", aggregator),
                reason: e.to_string(),
            })?;
        let round_data =
            contract
                .latest_round_data()
                .call()
                .await
                .map_err(|e| RebalanceError::ChainRead {
                    symbol: format!("{:?}", aggregator),
                    reason: e.to_string(),
                })?;

        let raw_answer = round_data.1;
        if raw_answer <= I256::zero() {
            return Err(RebalanceError::ChainRead {
                symbol: format!("{:?}", aggregator),
                reason: "oracle returned non-positive price".to_string(),
            });
        }

        let price = Decimal::from_i128_with_scale(raw_answer.as_i128(), decimals as u32);
        let updated_at = round_data.3.as_u64() as i64;
        let timestamp = Utc
            .timestamp_opt(updated_at, 0)
            .single()
            .unwrap_or_else(Utc::now);

        Ok(PriceQuote {
            price,
            confidence: Decimal::ONE,
            timestamp,
        })
    }
}

#[async_trait]
impl PriceOracle for ChainlinkOracle {
    async fn get_price(&self, symbol: &str) -> Option<PriceQuote> {
        let aggregator = { self.feeds.read().await.get(symbol).copied() };
        let Some(aggregator) = aggregator else {
            warn!(symbol = %symbol, "No price feed registered for symbol");
            return None;
        };
        match self.read_feed(aggregator).await {
            Ok(quote) => {
                debug!(symbol = %symbol, price = %quote.price, "Fetched oracle price");
                Some(quote)
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Oracle price fetch failed");
                None
            }
        }
    }
}
