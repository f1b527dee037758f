use dotenvy::dotenv;
use std::env;
use std::sync::Arc;
use tracing::info;

use crypto_rebalancer_bot::chain::EthersChainReader;
use crypto_rebalancer_bot::config::Config;
use crypto_rebalancer_bot::db::db_manager::DbManager;
use crypto_rebalancer_bot::logging;
use crypto_rebalancer_bot::oracle::ChainlinkOracle;
use crypto_rebalancer_bot::rebalance::aggregator::BalanceAggregator;

/// One-shot balance refresh for a portfolio; logs the per-asset valuation.
/// Usage: see_balances <portfolio_id>
#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenv().ok();
    logging::init_logging();

    let portfolio_id: i32 = env::args()
        .nth(1)
        .ok_or_else(|| eyre::eyre!("Usage: see_balances <portfolio_id>"))?
        .parse()?;

    let config = Config::load();
    let db = Arc::new(DbManager::init(&config).await?);

    let oracle = Arc::new(ChainlinkOracle::new(config.rpc_provider.clone()));
    oracle.start(&db).await?;
    let chain = Arc::new(EthersChainReader::new(config.rpc_provider.clone()));

    let aggregator = BalanceAggregator::new(db, chain, oracle.clone());
    let snapshot = aggregator.refresh_balances(portfolio_id).await?;

    let output = snapshot
        .per_asset
        .iter()
        .map(|asset| {
            format!(
                "{}: {} ({} USD @ {} USD)",
                asset.symbol, asset.balance_formatted, asset.value_usd, asset.price_usd
            )
        })
        .collect::<Vec<String>>()
        .join("\n");
    info!(
        portfolio_id = portfolio_id,
        total_value_usd = %snapshot.total_value_usd,
        balances = %output,
        "Portfolio balances"
    );

    oracle.stop().await;
    Ok(())
}
