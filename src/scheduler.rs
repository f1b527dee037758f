use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::db::db_manager::DbManager;
use crate::rebalance::orchestrator::{CycleOutcome, RebalanceOrchestrator};

const RESCAN_INTERVAL: Duration = Duration::from_secs(60);

/// One recurring monitoring task per portfolio, keyed by portfolio id.
/// The key set guarantees at most one registered task per portfolio, and
/// each tick awaits its cycle to completion before the next can fire, so
/// a portfolio never has two cycles in flight.
pub struct MonitoringScheduler {
    db: Arc<DbManager>,
    orchestrator: Arc<RebalanceOrchestrator>,
    tasks: Mutex<HashMap<i32, JoinHandle<()>>>,
}

impl MonitoringScheduler {
    pub fn new(db: Arc<DbManager>, orchestrator: Arc<RebalanceOrchestrator>) -> Self {
        Self {
            db,
            orchestrator,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Register the recurring task for one portfolio. No-op when a live
    /// task already holds the key.
    pub async fn register_portfolio(&self, portfolio_id: i32, interval_secs: u64) {
        let mut tasks = self.tasks.lock().await;
        if let Some(handle) = tasks.get(&portfolio_id) {
            if !handle.is_finished() {
                debug!(portfolio_id = portfolio_id, "Monitoring task already registered");
                return;
            }
        }

        let orchestrator = self.orchestrator.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match orchestrator.run_monitoring_cycle(portfolio_id).await {
                    Ok(CycleOutcome::Skipped) => {
                        // Portfolio removed or deactivated; the rescan loop
                        // re-registers it if it comes back
                        info!(portfolio_id = portfolio_id, "Portfolio no longer monitorable");
                        break;
                    }
                    Ok(outcome) => {
                        debug!(portfolio_id = portfolio_id, outcome = ?outcome, "Cycle finished");
                    }
                    Err(e) if e.is_fatal() => {
                        error!(
                            portfolio_id = portfolio_id,
                            error = %e,
                            "Fatal cycle error, descheduling portfolio"
                        );
                        break;
                    }
                    Err(e) => {
                        error!(
                            portfolio_id = portfolio_id,
                            error = %e,
                            "Cycle errored, retrying on next tick"
                        );
                    }
                }
            }
            info!(portfolio_id = portfolio_id, "Monitoring task stopped");
        });
        tasks.insert(portfolio_id, handle);
        info!(
            portfolio_id = portfolio_id,
            interval_secs = interval_secs,
            "Monitoring task registered"
        );
    }

    /// Abort and remove a portfolio's recurring task.
    pub async fn deregister_portfolio(&self, portfolio_id: i32) {
        if let Some(handle) = self.tasks.lock().await.remove(&portfolio_id) {
            handle.abort();
            info!(portfolio_id = portfolio_id, "Monitoring task deregistered");
        }
    }

    /// Keep task registrations in sync with the active portfolio set.
    /// Runs until the process exits.
    pub async fn run(&self) {
        loop {
            match self.db.list_active_portfolios().await {
                Ok(portfolios) => {
                    for portfolio in portfolios {
                        self.register_portfolio(
                            portfolio.id,
                            portfolio.monitoring_interval_secs.max(1) as u64,
                        )
                        .await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to list active portfolios");
                }
            }

            // Drop handles whose tasks have ended so they can re-register
            self.tasks.lock().await.retain(|_, handle| !handle.is_finished());
            tokio::time::sleep(RESCAN_INTERVAL).await;
        }
    }
}
