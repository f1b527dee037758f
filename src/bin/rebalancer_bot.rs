use dotenvy::dotenv;
use std::sync::Arc;
use tracing::info;

use crypto_rebalancer_bot::chain::EthersChainReader;
use crypto_rebalancer_bot::config::Config;
use crypto_rebalancer_bot::db::db_manager::DbManager;
use crypto_rebalancer_bot::logging;
use crypto_rebalancer_bot::oracle::ChainlinkOracle;
use crypto_rebalancer_bot::rebalance::aggregator::BalanceAggregator;
use crypto_rebalancer_bot::rebalance::executor::{ExecutorConfig, SwapExecutor};
use crypto_rebalancer_bot::rebalance::orchestrator::RebalanceOrchestrator;
use crypto_rebalancer_bot::rebalance::types::PlannerConfig;
use crypto_rebalancer_bot::scheduler::MonitoringScheduler;
use crypto_rebalancer_bot::venue::router::RouterVenue;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    // Initialize logging
    logging::init_logging();

    // Load configuration (including provider)
    let config = Config::load();
    info!(network_mode = %config.network_mode, "Configuration loaded and logging initialized");

    // Initialize db manager
    let db = Arc::new(DbManager::init(&config).await?);
    info!("Database manager initialized");

    // Price oracle lifecycle is owned here; the core only sees the trait
    let oracle = Arc::new(ChainlinkOracle::new(config.rpc_provider.clone()));
    oracle.start(&db).await?;

    let chain = Arc::new(EthersChainReader::new(config.rpc_provider.clone()));
    let venue = Arc::new(RouterVenue::new(&config)?);

    let aggregator = BalanceAggregator::new(db.clone(), chain, oracle.clone());
    let executor = SwapExecutor::new(
        venue,
        ExecutorConfig {
            confirmation_timeout: config.confirmation_timeout,
            poll_interval: config.confirmation_poll_interval,
            ..ExecutorConfig::default()
        },
    );
    let planner_config = PlannerConfig {
        slippage_tolerance: config.slippage_tolerance,
        ..PlannerConfig::default()
    };
    let orchestrator = Arc::new(RebalanceOrchestrator::new(
        db.clone(),
        aggregator,
        executor,
        planner_config,
    ));

    let scheduler = MonitoringScheduler::new(db, orchestrator);
    info!("Starting monitoring scheduler");

    tokio::select! {
        _ = scheduler.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    oracle.stop().await;
    Ok(())
}
