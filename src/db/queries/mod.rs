pub mod allocations;
pub mod asset_prices;
pub mod assets;
pub mod portfolios;
pub mod rebalance_jobs;
