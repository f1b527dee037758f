use ethers::types::Address;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, instrument, warn};

use crate::errors::{RebalanceError, is_fatal_reason};
use crate::venue::SwapVenue;
use crate::venue::types::{QuoteRequest, TxStatus};

use super::types::SwapOperation;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
    pub dust_floor_usd: Decimal,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
            dust_floor_usd: Decimal::new(1, 2), // one cent
        }
    }
}

/// First-failure report: which swap died and why, plus the hashes that
/// confirmed before it. `fatal` marks the unrecoverable resource class.
#[derive(Debug)]
pub struct ExecutionFailure {
    pub index: usize,
    pub reason: String,
    pub fatal: bool,
    pub confirmed: Vec<String>,
}

impl ExecutionFailure {
    /// The taxonomy error for this failure.
    pub fn to_error(&self) -> RebalanceError {
        if self.fatal {
            RebalanceError::FatalResource {
                reason: self.reason.clone(),
            }
        } else {
            RebalanceError::SwapExecution {
                index: self.index,
                reason: self.reason.clone(),
            }
        }
    }
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "swap {} failed: {}", self.index, self.reason)
    }
}

/// Executes a swap plan strictly sequentially: each swap is confirmed
/// before the next is submitted, and the first failure aborts the
/// remaining queue. Later swaps may depend on proceeds of earlier ones,
/// so concurrent submission is never attempted.
pub struct SwapExecutor {
    venue: Arc<dyn SwapVenue>,
    config: ExecutorConfig,
}

impl SwapExecutor {
    pub fn new(venue: Arc<dyn SwapVenue>, config: ExecutorConfig) -> Self {
        Self { venue, config }
    }

    /// Drop invalid swaps (dust amounts, same-asset pairs) before dispatch.
    /// A dropped swap is not a cycle failure.
    pub fn validate(&self, swaps: &[SwapOperation]) -> Vec<SwapOperation> {
        swaps
            .iter()
            .filter(|swap| {
                let rejection = if swap.amount_usd < self.config.dust_floor_usd {
                    Some("amount below dust floor")
                } else if swap.from_address == swap.to_address
                    || swap.from_symbol == swap.to_symbol
                {
                    Some("source and destination are the same asset")
                } else {
                    None
                };
                match rejection {
                    Some(reason) => {
                        let err = RebalanceError::InvalidSwap {
                            from: swap.from_symbol.clone(),
                            to: swap.to_symbol.clone(),
                            reason: reason.to_string(),
                        };
                        warn!(error = %err, "Dropping invalid swap from plan");
                        false
                    }
                    None => true,
                }
            })
            .cloned()
            .collect()
    }

    /// Execute the plan in order. Returns the confirmed transaction
    /// hashes, or the first failure with everything confirmed before it.
    #[instrument(skip(self, swaps), fields(swap_count = swaps.len()))]
    pub async fn execute(
        &self,
        swaps: &[SwapOperation],
        owner: Address,
    ) -> Result<Vec<String>, ExecutionFailure> {
        let swaps = self.validate(swaps);
        let mut confirmed = Vec::with_capacity(swaps.len());

        for (index, swap) in swaps.iter().enumerate() {
            info!(
                index = index,
                from = %swap.from_symbol,
                to = %swap.to_symbol,
                amount_usd = %swap.amount_usd,
                "Executing swap"
            );
            match self.execute_one(swap, owner).await {
                Ok(tx_hash) => {
                    info!(index = index, tx_hash = %tx_hash, "Swap confirmed");
                    confirmed.push(tx_hash);
                }
                Err(e) => {
                    let reason = e.to_string();
                    error!(
                        index = index,
                        reason = %reason,
                        "Swap failed, aborting remaining swaps"
                    );
                    return Err(ExecutionFailure {
                        index,
                        fatal: is_fatal_reason(&reason),
                        reason,
                        confirmed,
                    });
                }
            }
        }

        Ok(confirmed)
    }

    async fn execute_one(
        &self,
        swap: &SwapOperation,
        owner: Address,
    ) -> Result<String, RebalanceError> {
        // Ensure the venue can spend the source asset before quoting
        let allowance = self
            .venue
            .allowance(owner, swap.from_address, swap.from_decimals)
            .await?;
        if allowance < swap.amount_tokens {
            debug!(
                from = %swap.from_symbol,
                allowance = %allowance,
                required = %swap.amount_tokens,
                "Insufficient allowance, submitting approval"
            );
            let approval_hash = self.venue.approve(swap.from_address).await?;
            self.wait_for_confirmation(&approval_hash).await?;
            debug!(tx_hash = %approval_hash, "Approval confirmed");
        }

        let quote = self
            .venue
            .quote(&QuoteRequest {
                from_token: swap.from_address,
                from_decimals: swap.from_decimals,
                to_token: swap.to_address,
                to_decimals: swap.to_decimals,
                amount_in: swap.amount_tokens,
                min_amount_out: swap.min_amount_out,
            })
            .await?;
        if quote.expected_out < swap.min_amount_out {
            return Err(RebalanceError::Venue(format!(
                "quote output {} below slippage floor {}",
                quote.expected_out, swap.min_amount_out
            )));
        }

        let tx_hash = self.venue.swap(&quote).await?;
        // Confirm before the next swap is submitted
        self.wait_for_confirmation(&tx_hash).await?;
        Ok(tx_hash)
    }

    /// Poll the venue for a receipt until confirmation or the bounded
    /// timeout elapses. A timeout is a failure, not a silent retry.
    async fn wait_for_confirmation(&self, tx_hash: &str) -> Result<(), RebalanceError> {
        let started = Instant::now();
        loop {
            match self.venue.transaction_status(tx_hash).await? {
                TxStatus::Confirmed => return Ok(()),
                TxStatus::Failed => {
                    return Err(RebalanceError::Venue(format!(
                        "transaction {} reverted",
                        tx_hash
                    )));
                }
                TxStatus::Pending => {
                    if started.elapsed() >= self.config.confirmation_timeout {
                        return Err(RebalanceError::Venue(format!(
                            "confirmation timed out after {:?} for {}",
                            self.config.confirmation_timeout, tx_hash
                        )));
                    }
                    sleep(self.config.poll_interval).await;
                }
            }
        }
    }
}
