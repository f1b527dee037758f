use chrono::Utc;
use ethers::types::Address;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::db::db_manager::DbManager;
use crate::db::models::rebalance_jobs::NewRebalanceJobModel;
use crate::errors::RebalanceError;

use super::aggregator::BalanceAggregator;
use super::deviation;
use super::executor::SwapExecutor;
use super::planner::build_swap_plan;
use super::types::{PlannerConfig, RebalancePolicy};

/// Terminal state of one monitoring cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Portfolio missing or inactive; nothing observed
    Skipped,
    /// Observed, but no asset required action under the active policy
    NoActionNeeded,
    /// Every swap confirmed
    Completed,
    /// A swap failed; the next scheduled tick retries from scratch
    Failed,
}

/// Drives one portfolio through Observing -> Planning -> Executing and
/// applies the fatal-error policy. Each invocation is a run-to-completion
/// unit of work; no partial state is carried between ticks.
pub struct RebalanceOrchestrator {
    db: Arc<DbManager>,
    aggregator: BalanceAggregator,
    executor: SwapExecutor,
    planner_config: PlannerConfig,
}

impl RebalanceOrchestrator {
    pub fn new(
        db: Arc<DbManager>,
        aggregator: BalanceAggregator,
        executor: SwapExecutor,
        planner_config: PlannerConfig,
    ) -> Self {
        Self {
            db,
            aggregator,
            executor,
            planner_config,
        }
    }

    #[instrument(skip(self))]
    pub async fn run_monitoring_cycle(
        &self,
        portfolio_id: i32,
    ) -> Result<CycleOutcome, RebalanceError> {
        // Guard: the portfolio must exist and be active
        let Some(portfolio) = self.db.get_portfolio(portfolio_id).await? else {
            warn!(portfolio_id = portfolio_id, "Portfolio not found, skipping cycle");
            return Ok(CycleOutcome::Skipped);
        };
        if !portfolio.is_active {
            debug!(portfolio_id = portfolio_id, "Portfolio inactive, skipping cycle");
            return Ok(CycleOutcome::Skipped);
        }

        // Observing
        let snapshot = self.aggregator.refresh_balances(portfolio_id).await?;
        let deviations = deviation::calculate_deviations(&self.db, portfolio_id).await?;

        let policy = RebalancePolicy::from_str(&portfolio.policy).unwrap_or_else(|| {
            warn!(
                portfolio_id = portfolio_id,
                policy = %portfolio.policy,
                "Unknown rebalance policy, falling back to threshold"
            );
            RebalancePolicy::Threshold
        });

        let actionable = deviations.iter().any(|d| match policy {
            RebalancePolicy::Threshold => d.needs_rebalance,
            RebalancePolicy::StrictPeriodic => d.deviation > Decimal::ZERO,
        });
        if !actionable {
            info!(
                portfolio_id = portfolio_id,
                policy = policy.as_str(),
                "No asset requires action"
            );
            return Ok(CycleOutcome::NoActionNeeded);
        }

        // Planning
        let plan = build_swap_plan(
            &deviations,
            snapshot.total_value_usd,
            policy,
            &self.planner_config,
        );
        if plan.swaps.is_empty() {
            info!(
                portfolio_id = portfolio_id,
                "Deviations present but plan is empty, nothing to execute"
            );
            return Ok(CycleOutcome::NoActionNeeded);
        }

        let owner: Address =
            portfolio
                .owner_address
                .parse()
                .map_err(|_| RebalanceError::ChainRead {
                    symbol: portfolio.owner_address.clone(),
                    reason: "invalid owner address".to_string(),
                })?;

        // Executing: the audit record is created before the first dispatch
        // so a failed cycle always leaves a trace
        let swaps_json = serde_json::to_string(&plan.swaps).unwrap_or_else(|_| "[]".to_string());
        let job_id = self
            .db
            .create_job(&NewRebalanceJobModel {
                portfolio_id,
                policy: policy.as_str().to_string(),
                max_deviation: plan.max_deviation,
                swaps: swaps_json,
            })
            .await?;
        self.db.mark_job_executing(job_id).await?;
        info!(
            portfolio_id = portfolio_id,
            job_id = job_id,
            swap_count = plan.swaps.len(),
            max_deviation = %plan.max_deviation,
            "Executing rebalance plan"
        );

        match self.executor.execute(&plan.swaps, owner).await {
            Ok(tx_hashes) => {
                let hashes_json =
                    serde_json::to_string(&tx_hashes).unwrap_or_else(|_| "[]".to_string());
                self.db.mark_job_completed(job_id, &hashes_json).await?;

                // Completed: refresh the post-trade state and stamp the rebalance
                self.aggregator.refresh_balances(portfolio_id).await?;
                self.db.record_rebalance(portfolio_id, Utc::now()).await?;
                info!(
                    portfolio_id = portfolio_id,
                    job_id = job_id,
                    confirmed = tx_hashes.len(),
                    "Rebalance completed"
                );
                Ok(CycleOutcome::Completed)
            }
            Err(failure) => {
                let hashes_json =
                    serde_json::to_string(&failure.confirmed).unwrap_or_else(|_| "[]".to_string());
                self.db
                    .mark_job_failed(job_id, &hashes_json, &failure.to_error().to_string())
                    .await?;

                if failure.fatal {
                    error!(
                        portfolio_id = portfolio_id,
                        job_id = job_id,
                        reason = %failure.reason,
                        "Fatal resource error, disabling monitoring for portfolio"
                    );
                    self.db.set_portfolio_active(portfolio_id, false).await?;
                    return Err(failure.to_error());
                }

                warn!(
                    portfolio_id = portfolio_id,
                    job_id = job_id,
                    failed_index = failure.index,
                    reason = %failure.reason,
                    "Cycle failed, next scheduled tick will retry"
                );
                Ok(CycleOutcome::Failed)
            }
        }
    }
}
