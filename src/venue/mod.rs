pub mod router;
pub mod types;

use async_trait::async_trait;
use ethers::types::Address;
use rust_decimal::Decimal;

use crate::errors::RebalanceError;
use self::types::{QuoteRequest, SwapQuote, TxStatus};

/// Swap venue operations the executor drives. Approval and swap
/// submission both return the pending transaction hash; confirmation
/// waiting is the executor's job.
#[async_trait]
pub trait SwapVenue: Send + Sync {
    /// Current spending approval for `token` against the venue contract.
    async fn allowance(
        &self,
        owner: Address,
        token: Address,
        decimals: u8,
    ) -> Result<Decimal, RebalanceError>;

    /// Submit an approval transaction for `token` against the venue contract.
    async fn approve(&self, token: Address) -> Result<String, RebalanceError>;

    /// Fetch a price quote for the requested trade.
    async fn quote(&self, request: &QuoteRequest) -> Result<SwapQuote, RebalanceError>;

    /// Precheck and submit the quoted swap transaction.
    async fn swap(&self, quote: &SwapQuote) -> Result<String, RebalanceError>;

    /// On-chain status of a previously submitted transaction.
    async fn transaction_status(&self, tx_hash: &str) -> Result<TxStatus, RebalanceError>;
}
