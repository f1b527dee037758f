use ethers::types::{Address, Bytes, U256};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct QuoteRequest {
    pub from_token: Address,
    pub from_decimals: u8,
    pub to_token: Address,
    pub to_decimals: u8,
    pub amount_in: Decimal,      // from-token units
    pub min_amount_out: Decimal, // to-token units, slippage floor
}

#[derive(Debug, Clone)]
pub struct SwapQuote {
    pub from_token: Address,
    pub to_token: Address,
    pub amount_in: Decimal,
    pub expected_out: Decimal, // to-token units the venue quotes
    pub min_amount_out: Decimal,
    pub router: Address,          // contract the swap calldata targets
    pub transaction_data: Bytes,  // calldata to execute the swap
    pub value: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}
