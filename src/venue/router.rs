use async_trait::async_trait;
use chrono::Utc;
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{TransactionRequest, U64};
use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::chain::{decimal_to_u256, u256_to_decimal};
use crate::config::Config;
use crate::errors::RebalanceError;

use super::SwapVenue;
use super::types::{QuoteRequest, SwapQuote, TxStatus};

// ERC20 ABI for the approval flow
abigen!(
    IERC20Approve,
    r#"[
        function approve(address spender, uint256 amount) external returns (bool)
        function allowance(address owner, address spender) external view returns (uint256)
    ]"#
);

// Minimal V2-style swap router surface: on-chain quote + exact-in swap
abigen!(
    ISwapRouter,
    r#"[
        function getAmountsOut(uint256 amountIn, address[] path) external view returns (uint256[] amounts)
        function swapExactTokensForTokens(uint256 amountIn, uint256 amountOutMin, address[] path, address to, uint256 deadline) external returns (uint256[] amounts)
    ]"#
);

const MAX_FEE_PER_GAS_BUFFER: f64 = 1.1; // 10% above the current gas price
const SWAP_DEADLINE_SECS: i64 = 300;

type RouterSigner = SignerMiddleware<Arc<Provider<Http>>, Wallet<k256::ecdsa::SigningKey>>;

/// Venue client backed by an on-chain swap router, driven through a
/// `SignerMiddleware` built from the process wallet.
pub struct RouterVenue {
    signer: Arc<RouterSigner>,
    address: Address, // executing wallet
    router: Address,
    chain_id: u64,
    max_fee_per_gas_buffer: Decimal,
}

impl RouterVenue {
    pub fn new(config: &Config) -> eyre::Result<Self> {
        let wallet =
            Wallet::from_str(&config.wallet_private_key)?.with_chain_id(config.chain_id);
        let signer = SignerMiddleware::new(config.rpc_provider.clone(), wallet);
        let address = signer.address();
        Ok(Self {
            signer: Arc::new(signer),
            address,
            router: config.swap_router,
            chain_id: config.chain_id,
            max_fee_per_gas_buffer: Decimal::from_f64(MAX_FEE_PER_GAS_BUFFER).unwrap(),
        })
    }

    pub fn wallet_address(&self) -> Address {
        self.address
    }

    /// Estimate gas, apply the fee buffer, and finalize the request.
    async fn prepare_transaction(
        &self,
        tx: TransactionRequest,
    ) -> Result<TransactionRequest, RebalanceError> {
        let gas_estimate = self
            .signer
            .provider()
            .estimate_gas(&tx.clone().into(), None)
            .await
            .map_err(|e| venue_error(e.to_string()))?;
        let gas_price = self
            .signer
            .provider()
            .get_gas_price()
            .await
            .map_err(|e| venue_error(e.to_string()))?;
        let gas_price_dec = u256_to_decimal(gas_price, 0) * self.max_fee_per_gas_buffer;
        let gas_price = decimal_to_u256(gas_price_dec.trunc(), 0)?;
        Ok(tx.gas(gas_estimate).gas_price(gas_price))
    }

    /// Precheck: eth_call the transaction before spending gas on it.
    async fn simulate_transaction(&self, tx: &TransactionRequest) -> Result<(), RebalanceError> {
        let typed_tx: TypedTransaction = tx.clone().into();
        match self.signer.provider().call(&typed_tx, None).await {
            Ok(_) => {
                debug!("Transaction simulation successful");
                Ok(())
            }
            Err(e) => {
                warn!(error = ?e, tx = ?typed_tx, "Transaction simulation failed");
                Err(venue_error(format!("transaction simulation failed: {}", e)))
            }
        }
    }
}

#[async_trait]
impl SwapVenue for RouterVenue {
    #[instrument(skip(self))]
    async fn allowance(
        &self,
        owner: Address,
        token: Address,
        decimals: u8,
    ) -> Result<Decimal, RebalanceError> {
        let contract = IERC20Approve::new(token, self.signer.clone());
        let allowance = contract
            .allowance(owner, self.router)
            .call()
            .await
            .map_err(|e| venue_error(e.to_string()))?;
        Ok(u256_to_decimal(allowance, decimals))
    }

    #[instrument(skip(self))]
    async fn approve(&self, token: Address) -> Result<String, RebalanceError> {
        let contract = IERC20Approve::new(token, self.signer.clone());
        // Approve the maximum amount to avoid repeated approvals
        let call = contract.approve(self.router, U256::MAX);
        let pending_tx = call
            .send()
            .await
            .map_err(|e| venue_error(e.to_string()))?;
        let tx_hash = pending_tx.tx_hash();
        debug!(token = ?token, tx_hash = ?tx_hash, "Approval transaction submitted");
        Ok(format!("{:?}", tx_hash))
    }

    #[instrument(skip(self, request))]
    async fn quote(&self, request: &QuoteRequest) -> Result<SwapQuote, RebalanceError> {
        let contract = ISwapRouter::new(self.router, self.signer.clone());
        let path = vec![request.from_token, request.to_token];
        let amount_in = decimal_to_u256(request.amount_in, request.from_decimals)?;

        let amounts = contract
            .get_amounts_out(amount_in, path.clone())
            .call()
            .await
            .map_err(|e| venue_error(e.to_string()))?;
        let amount_out = amounts
            .last()
            .copied()
            .ok_or_else(|| venue_error("router returned empty amounts".to_string()))?;
        let expected_out = u256_to_decimal(amount_out, request.to_decimals);

        let min_out = decimal_to_u256(
            request
                .min_amount_out
                .round_dp_with_strategy(request.to_decimals as u32, RoundingStrategy::ToZero),
            request.to_decimals,
        )?;
        let deadline = U256::from((Utc::now().timestamp() + SWAP_DEADLINE_SECS) as u64);
        let call =
            contract.swap_exact_tokens_for_tokens(amount_in, min_out, path, self.address, deadline);
        let transaction_data = call
            .calldata()
            .ok_or_else(|| venue_error("failed to encode swap calldata".to_string()))?;

        debug!(
            from_token = ?request.from_token,
            to_token = ?request.to_token,
            amount_in = %request.amount_in,
            expected_out = %expected_out,
            "Quote received"
        );

        Ok(SwapQuote {
            from_token: request.from_token,
            to_token: request.to_token,
            amount_in: request.amount_in,
            expected_out,
            min_amount_out: request.min_amount_out,
            router: self.router,
            transaction_data,
            value: U256::zero(),
        })
    }

    #[instrument(skip(self, quote))]
    async fn swap(&self, quote: &SwapQuote) -> Result<String, RebalanceError> {
        let tx = TransactionRequest::new()
            .to(quote.router)
            .from(self.address)
            .data(quote.transaction_data.clone())
            .value(quote.value)
            .chain_id(self.chain_id);

        let tx = self.prepare_transaction(tx).await?;
        self.simulate_transaction(&tx).await?;

        let pending_tx = self
            .signer
            .send_transaction(tx, None)
            .await
            .map_err(|e| venue_error(e.to_string()))?;
        let tx_hash = pending_tx.tx_hash();
        debug!(tx_hash = ?tx_hash, "Swap transaction submitted");
        Ok(format!("{:?}", tx_hash))
    }

    async fn transaction_status(&self, tx_hash: &str) -> Result<TxStatus, RebalanceError> {
        let hash = TxHash::from_str(tx_hash)
            .map_err(|e| venue_error(format!("invalid tx hash {}: {}", tx_hash, e)))?;
        let receipt = self
            .signer
            .provider()
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| venue_error(e.to_string()))?;
        Ok(match receipt {
            None => TxStatus::Pending,
            Some(receipt) if receipt.status == Some(U64::from(1)) => TxStatus::Confirmed,
            Some(_) => TxStatus::Failed,
        })
    }
}

fn venue_error(reason: String) -> RebalanceError {
    RebalanceError::Venue(reason)
}
