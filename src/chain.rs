use async_trait::async_trait;
use ethers::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::errors::RebalanceError;

abigen!(
    IERC20,
    r#"[
        function balanceOf(address owner) external view returns (uint256)
    ]"#
);

/// A live balance read for one asset: raw integer units plus the
/// decimals-scaled representation.
#[derive(Debug, Clone)]
pub struct TokenBalance {
    pub raw: String,
    pub formatted: Decimal,
}

impl TokenBalance {
    pub fn zero() -> Self {
        Self {
            raw: "0".to_string(),
            formatted: Decimal::ZERO,
        }
    }
}

/// Read-only chain access. The native coin is addressed by the zero address.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn get_native_balance(&self, owner: Address) -> Result<TokenBalance, RebalanceError>;

    async fn get_token_balance(
        &self,
        owner: Address,
        asset_address: Address,
        decimals: u8,
    ) -> Result<TokenBalance, RebalanceError>;
}

pub struct EthersChainReader {
    provider: Arc<Provider<Http>>,
}

impl EthersChainReader {
    pub fn new(provider: Arc<Provider<Http>>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ChainReader for EthersChainReader {
    async fn get_native_balance(&self, owner: Address) -> Result<TokenBalance, RebalanceError> {
        let balance = self
            .provider
            .get_balance(owner, None)
            .await
            .map_err(|e| RebalanceError::ChainRead {
                symbol: "NATIVE".to_string(),
                reason: e.to_string(),
            })?;
        let formatted = u256_to_decimal(balance, 18);
        debug!(owner = ?owner, balance = %formatted, "Retrieved native balance");
        Ok(TokenBalance {
            raw: balance.to_string(),
            formatted,
        })
    }

    async fn get_token_balance(
        &self,
        owner: Address,
        asset_address: Address,
        decimals: u8,
    ) -> Result<TokenBalance, RebalanceError> {
        let contract = IERC20::new(asset_address, self.provider.clone());
        let balance =
            contract
                .balance_of(owner)
                .call()
                .await
                .map_err(|e| RebalanceError::ChainRead {
                    symbol: format!("{:?}", asset_address),
                    reason: e.to_string(),
                })?;
        let formatted = u256_to_decimal(balance, decimals);
        debug!(
            owner = ?owner,
            asset_address = ?asset_address,
            balance = %formatted,
            "Retrieved token balance"
        );
        Ok(TokenBalance {
            raw: balance.to_string(),
            formatted,
        })
    }
}

/// U256 to Decimal conversion, scaled by the token's decimals
pub fn u256_to_decimal(value: U256, decimals: u8) -> Decimal {
    let formatted = ethers::utils::format_units(value, decimals as usize).unwrap_or_else(|_| {
        warn!("Failed to format U256 value: {}", value);
        "0".to_string()
    });
    Decimal::from_str(&formatted).unwrap_or(Decimal::ZERO)
}

/// Decimal to U256 conversion, scaled by the token's decimals
pub fn decimal_to_u256(value: Decimal, decimals: u8) -> Result<U256, RebalanceError> {
    let formatted = ethers::utils::parse_units(value.to_string(), decimals as usize).map_err(|e| {
        RebalanceError::ChainRead {
            symbol: String::new(),
            reason: format!("Failed to parse decimal value: {}", e),
        }
    })?;

    match formatted {
        ethers::utils::ParseUnits::U256(u256_val) => Ok(u256_val),
        _ => Err(RebalanceError::ChainRead {
            symbol: String::new(),
            reason: "Unexpected parse result type".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u256_round_trips_through_decimal() {
        let raw = U256::from(1_500_000u64); // 1.5 USDC at 6 decimals
        let formatted = u256_to_decimal(raw, 6);
        assert_eq!(formatted, Decimal::new(15, 1));
        assert_eq!(decimal_to_u256(formatted, 6).unwrap(), raw);
    }

    #[test]
    fn u256_to_decimal_handles_zero() {
        assert_eq!(u256_to_decimal(U256::zero(), 18), Decimal::ZERO);
    }
}
